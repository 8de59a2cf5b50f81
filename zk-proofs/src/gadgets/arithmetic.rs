//! Division, summation and simple statistics.

use super::comparators::{bit_decompose, less_than};
use super::logic::{and, enforce_boolean, enforce_true, is_equal, is_zero, not};
use super::fr_to_u128;
use crate::constants::MAX_DIVISION_BITS;
use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Integer division with remainder.
///
/// Asserts `divisor != 0`, `dividend = quotient * divisor + remainder` and
/// `remainder < divisor`, with quotient, remainder and divisor range-checked to `n` bits. A zero
/// divisor or a dividend that does not divide out within `n` bits leaves the system
/// unsatisfiable.
pub fn safe_division(
    cs: ConstraintSystemRef<Fr>,
    dividend: &FpVar<Fr>,
    divisor: &FpVar<Fr>,
    n: usize,
) -> Result<(FpVar<Fr>, FpVar<Fr>), SynthesisError> {
    if n > MAX_DIVISION_BITS {
        return Err(SynthesisError::Unsatisfiable);
    }

    let hint = || -> Result<(u128, u128), SynthesisError> {
        let a = fr_to_u128(dividend.value()?);
        let b = fr_to_u128(divisor.value()?);
        Ok(match (a, b) {
            (Some(a), Some(b)) if b != 0 => (a / b, a % b),
            _ => (0, 0),
        })
    };

    let quotient = FpVar::<Fr>::new_witness(cs.clone(), || hint().map(|(q, _)| Fr::from(q)))?;
    let remainder = FpVar::<Fr>::new_witness(cs.clone(), || hint().map(|(_, r)| Fr::from(r)))?;

    is_zero(cs.clone(), divisor)?.enforce_equal(&FpVar::zero())?;

    bit_decompose(cs.clone(), divisor, n)?;
    bit_decompose(cs.clone(), &quotient, n)?;
    bit_decompose(cs.clone(), &remainder, n)?;
    enforce_true(&less_than(cs, &remainder, divisor, n)?)?;

    (&quotient * divisor + &remainder).enforce_equal(dividend)?;

    Ok((quotient, remainder))
}

pub fn sum(values: &[FpVar<Fr>]) -> FpVar<Fr> {
    values.iter().fold(FpVar::zero(), |acc, v| acc + v)
}

/// `floor(sum(values[i] * weights[i]) / sum(weights))`.
pub fn weighted_average(
    cs: ConstraintSystemRef<Fr>,
    values: &[FpVar<Fr>],
    weights: &[FpVar<Fr>],
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    if values.len() != weights.len() || values.is_empty() {
        return Err(SynthesisError::Unsatisfiable);
    }

    let products: Vec<FpVar<Fr>> = values.iter().zip(weights).map(|(v, w)| v * w).collect();
    let numerator = sum(&products);
    let denominator = sum(weights);

    let (quotient, _) = safe_division(cs, &numerator, &denominator, n)?;
    Ok(quotient)
}

/// Population variance `floor(sum((v - mean)^2) / len)`.
pub fn variance(
    cs: ConstraintSystemRef<Fr>,
    values: &[FpVar<Fr>],
    mean: &FpVar<Fr>,
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    if values.is_empty() {
        return Err(SynthesisError::Unsatisfiable);
    }

    let squares: Vec<FpVar<Fr>> = values
        .iter()
        .map(|v| {
            let dev = v - mean;
            &dev * &dev
        })
        .collect();

    let count = FpVar::constant(Fr::from(values.len() as u64));
    let (quotient, _) = safe_division(cs, &sum(&squares), &count, n)?;
    Ok(quotient)
}

pub fn count_non_zero(
    cs: ConstraintSystemRef<Fr>,
    values: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut flags = Vec::with_capacity(values.len());
    for v in values {
        flags.push(not(&is_zero(cs.clone(), v)?));
    }
    Ok(sum(&flags))
}

/// Count entries whose activity flag is set. Flags are constrained boolean here.
pub fn count_active(flags: &[FpVar<Fr>]) -> Result<FpVar<Fr>, SynthesisError> {
    for f in flags {
        enforce_boolean(f)?;
    }
    Ok(sum(flags))
}

/// Number of distinct values, counting each value at its first occurrence.
///
/// Quadratic in the input length; meant for the handful of slots a claim circuit carries.
pub fn count_unique(
    cs: ConstraintSystemRef<Fr>,
    values: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut firsts = Vec::with_capacity(values.len());
    for (i, v) in values.iter().enumerate() {
        let mut first = FpVar::one();
        for earlier in &values[..i] {
            let seen = is_equal(cs.clone(), v, earlier)?;
            first = and(&first, &not(&seen));
        }
        firsts.push(first);
    }
    Ok(sum(&firsts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;

    fn witnesses(cs: &ConstraintSystemRef<Fr>, vals: &[u64]) -> Vec<FpVar<Fr>> {
        vals.iter()
            .map(|v| FpVar::new_witness(cs.clone(), || Ok(Fr::from(*v))).unwrap())
            .collect()
    }

    #[test]
    fn safe_division_ten_by_three() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let v = witnesses(&cs, &[10, 3]);
        let (q, r) = safe_division(cs.clone(), &v[0], &v[1], 8).unwrap();

        assert_eq!(q.value().unwrap(), Fr::from(3u64));
        assert_eq!(r.value().unwrap(), Fr::from(1u64));
        assert_eq!(q.value().unwrap() * Fr::from(3u64) + r.value().unwrap(), Fr::from(10u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn safe_division_by_zero_is_unsatisfiable() {
        for x in [0u64, 1, 10, 255] {
            let cs = ConstraintSystem::<Fr>::new_ref();
            let v = witnesses(&cs, &[x, 0]);
            safe_division(cs.clone(), &v[0], &v[1], 8).unwrap();
            assert!(!cs.is_satisfied().unwrap(), "division of {x} by zero accepted");
        }
    }

    #[test]
    fn safe_division_rejects_quotient_outside_width() {
        // 1000 / 2 = 500 does not fit in 8 bits.
        let cs = ConstraintSystem::<Fr>::new_ref();
        let v = witnesses(&cs, &[1000, 2]);
        safe_division(cs.clone(), &v[0], &v[1], 8).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn safe_division_refuses_oversized_width() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let v = witnesses(&cs, &[10, 3]);
        assert!(safe_division(cs, &v[0], &v[1], MAX_DIVISION_BITS + 1).is_err());
    }

    #[test]
    fn weighted_average_of_three() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = witnesses(&cs, &[10, 20, 60]);
        let weights = witnesses(&cs, &[1, 2, 1]);
        // (10 + 40 + 60) / 4 = 27 rem 2
        let avg = weighted_average(cs.clone(), &values, &weights, 16).unwrap();
        assert_eq!(avg.value().unwrap(), Fr::from(27u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn weighted_average_with_zero_weights_is_unsatisfiable() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = witnesses(&cs, &[10, 20, 60]);
        let weights = witnesses(&cs, &[0, 0, 0]);
        weighted_average(cs.clone(), &values, &weights, 16).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn variance_matches_population_formula() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = witnesses(&cs, &[2, 4, 4, 4, 5, 5, 7, 9]);
        let mean = witnesses(&cs, &[5]);
        let var = variance(cs.clone(), &values, &mean[0], 16).unwrap();
        assert_eq!(var.value().unwrap(), Fr::from(4u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn variance_handles_values_below_mean() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = witnesses(&cs, &[0, 10]);
        let mean = witnesses(&cs, &[5]);
        let var = variance(cs.clone(), &values, &mean[0], 16).unwrap();
        assert_eq!(var.value().unwrap(), Fr::from(25u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn counting_gadgets() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let values = witnesses(&cs, &[0, 3, 0, 8, 3]);
        let flags = witnesses(&cs, &[1, 0, 1, 1, 0]);

        assert_eq!(sum(&values).value().unwrap(), Fr::from(14u64));
        assert_eq!(count_non_zero(cs.clone(), &values).unwrap().value().unwrap(), Fr::from(3u64));
        assert_eq!(count_active(&flags).unwrap().value().unwrap(), Fr::from(3u64));
        assert_eq!(count_unique(cs.clone(), &values).unwrap().value().unwrap(), Fr::from(3u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn count_active_rejects_non_boolean_flags() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let flags = witnesses(&cs, &[1, 2]);
        count_active(&flags).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }
}
