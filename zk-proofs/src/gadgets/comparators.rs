//! Bit decomposition and range comparisons.
//!
//! All comparators reduce to one `n + 1`-bit decomposition of the shifted difference
//! `a + 2^n - b`: its top bit is set exactly when `a >= b`, provided both operands fit in `n`
//! bits.

use super::logic::{and, enforce_boolean, enforce_true, not};
use super::pow2;
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Decompose `x` into `n` little-endian bits.
///
/// Each bit is constrained boolean and the weighted sum must equal `x`, so a value wider than
/// `n` bits has no satisfying assignment.
pub fn bit_decompose(
    cs: ConstraintSystemRef<Fr>,
    x: &FpVar<Fr>,
    n: usize,
) -> Result<Vec<FpVar<Fr>>, SynthesisError> {
    if n >= Fr::MODULUS_BIT_SIZE as usize {
        return Err(SynthesisError::Unsatisfiable);
    }

    let mut bits = Vec::with_capacity(n);
    for i in 0..n {
        let bit = FpVar::<Fr>::new_witness(cs.clone(), || {
            let v = x.value()?;
            Ok(Fr::from(v.into_bigint().get_bit(i) as u64))
        })?;
        enforce_boolean(&bit)?;
        bits.push(bit);
    }

    bits_to_fp(&bits).enforce_equal(x)?;
    Ok(bits)
}

/// Recompose little-endian bits into a field variable.
pub fn bits_to_fp(bits_le: &[FpVar<Fr>]) -> FpVar<Fr> {
    let mut acc = FpVar::<Fr>::zero();
    let mut coeff = Fr::from(1u64);

    for b in bits_le {
        acc += b * coeff;
        coeff = coeff + coeff;
    }

    acc
}

/// `out = 1` iff `a < b`, for `a, b < 2^n`.
pub fn less_than(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    let shifted = a + pow2(n) - b;
    let bits = bit_decompose(cs, &shifted, n + 1)?;
    Ok(not(&bits[n]))
}

/// `out = 1` iff `a > b`.
pub fn greater_than(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    less_than(cs, b, a, n)
}

/// `out = 1` iff `a <= b`.
pub fn less_or_equal(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    let b_plus_one = b + Fr::from(1u64);
    less_than(cs, a, &b_plus_one, n)
}

/// `out = 1` iff `a >= b`.
pub fn greater_or_equal(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    let a_plus_one = a + Fr::from(1u64);
    less_than(cs, b, &a_plus_one, n)
}

/// Enforce `min <= x <= max` with all three operands range-checked to `n` bits.
pub fn enforce_in_range(
    cs: ConstraintSystemRef<Fr>,
    x: &FpVar<Fr>,
    min: &FpVar<Fr>,
    max: &FpVar<Fr>,
    n: usize,
) -> Result<(), SynthesisError> {
    bit_decompose(cs.clone(), x, n)?;
    bit_decompose(cs.clone(), min, n)?;
    bit_decompose(cs.clone(), max, n)?;

    let above_min = greater_or_equal(cs.clone(), x, min, n)?;
    let below_max = less_or_equal(cs, x, max, n)?;
    enforce_true(&and(&above_min, &below_max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ark_relations::r1cs::ConstraintSystem;
    use proptest::prelude::*;

    fn witness(cs: &ConstraintSystemRef<Fr>, v: u64) -> FpVar<Fr> {
        FpVar::new_witness(cs.clone(), || Ok(Fr::from(v))).unwrap()
    }

    fn bit(v: &FpVar<Fr>) -> u64 {
        if v.value().unwrap() == Fr::from(1u64) { 1 } else { 0 }
    }

    #[test]
    fn bit_decompose_roundtrips_in_width() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let x = witness(&cs, 0b1011);
        let bits = bit_decompose(cs.clone(), &x, 4).unwrap();
        let got: Vec<u64> = bits.iter().map(bit).collect();
        assert_eq!(got, vec![1, 1, 0, 1]);
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn bit_decompose_rejects_overflow() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let x = witness(&cs, 256);
        bit_decompose(cs.clone(), &x, 8).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn comparators_on_known_pairs() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let three = witness(&cs, 3);
        let five = witness(&cs, 5);

        assert_eq!(bit(&less_than(cs.clone(), &three, &five, 8).unwrap()), 1);
        assert_eq!(bit(&less_than(cs.clone(), &five, &three, 8).unwrap()), 0);
        assert_eq!(bit(&less_than(cs.clone(), &five, &five, 8).unwrap()), 0);
        assert_eq!(bit(&greater_than(cs.clone(), &five, &three, 8).unwrap()), 1);
        assert_eq!(bit(&less_or_equal(cs.clone(), &five, &five, 8).unwrap()), 1);
        assert_eq!(bit(&greater_or_equal(cs.clone(), &three, &five, 8).unwrap()), 0);
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn comparators_at_width_edges() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let zero = witness(&cs, 0);
        let max = witness(&cs, 255);

        assert_eq!(bit(&less_than(cs.clone(), &zero, &max, 8).unwrap()), 1);
        assert_eq!(bit(&less_or_equal(cs.clone(), &max, &max, 8).unwrap()), 1);
        assert_eq!(bit(&greater_or_equal(cs.clone(), &zero, &zero, 8).unwrap()), 1);
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn enforce_in_range_accepts_and_rejects() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let (x, lo, hi) = (witness(&cs, 50), witness(&cs, 10), witness(&cs, 100));
        enforce_in_range(cs.clone(), &x, &lo, &hi, 16).unwrap();
        assert!(cs.is_satisfied().unwrap());

        let cs = ConstraintSystem::<Fr>::new_ref();
        let (x, lo, hi) = (witness(&cs, 150), witness(&cs, 10), witness(&cs, 100));
        enforce_in_range(cs.clone(), &x, &lo, &hi, 16).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn less_than_and_greater_or_equal_are_complementary(a in 0u64..(1 << 16), b in 0u64..(1 << 16)) {
            let cs = ConstraintSystem::<Fr>::new_ref();
            let av = witness(&cs, a);
            let bv = witness(&cs, b);

            let lt = bit(&less_than(cs.clone(), &av, &bv, 16).unwrap());
            let ge = bit(&greater_or_equal(cs.clone(), &av, &bv, 16).unwrap());

            prop_assert_eq!(lt + ge, 1);
            prop_assert_eq!(lt == 1, a < b);
            prop_assert!(cs.is_satisfied().unwrap());
        }
    }
}
