//! Composable R1CS constraint templates.
//!
//! Every gadget follows the same discipline: a witness hint (an inverse, a bit, a quotient) is
//! computed natively from the current assignment, allocated as a witness, and then pinned down
//! by constraints. A prover that feeds inconsistent values gets an unsatisfied constraint
//! system, never a silently wrong output.
//!
//! Booleans are plain field variables constrained by `b * (b - 1) = 0`. Gadgets that consume
//! booleans (`and`, `or`, `mux`, ...) assume their inputs were constrained where they were
//! allocated.
//!
//! Comparators and divisions take an explicit bit width `n`. Inputs must fit in `n` bits;
//! anything wider leaves the system unsatisfiable (or, for the comparators, undefined), so
//! callers range-check their operands with [`bit_decompose`] first.

pub mod arithmetic;
pub mod claims;
pub mod comparators;
pub mod logic;

pub use arithmetic::{
    count_active, count_non_zero, count_unique, safe_division, sum, variance, weighted_average,
};
pub use claims::{collaboration_check, consistency_score, consistency_score_value, non_ownership_check};
pub use comparators::{
    bit_decompose, bits_to_fp, enforce_in_range, greater_or_equal, greater_than, less_or_equal,
    less_than,
};
pub use logic::{and, enforce_boolean, enforce_true, is_equal, is_zero, mux, not, or, or_many};

use ark_bn254::Fr;
use ark_ff::PrimeField;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// `2^n` as a field element.
pub(crate) fn pow2(n: usize) -> Fr {
    let mut acc = Fr::from(1u64);
    for _ in 0..n {
        acc = acc + acc;
    }
    acc
}

/// Native value of a field element if it fits in 128 bits.
pub(crate) fn fr_to_u128(v: Fr) -> Option<u128> {
    let limbs = v.into_bigint().0;
    if limbs[2] != 0 || limbs[3] != 0 {
        return None;
    }
    Some(((limbs[1] as u128) << 64) | limbs[0] as u128)
}

/// Allocate a `u64` as a public input.
pub fn input_u64(cs: ConstraintSystemRef<Fr>, v: u64) -> Result<FpVar<Fr>, SynthesisError> {
    FpVar::<Fr>::new_input(cs, || Ok(Fr::from(v)))
}

/// Allocate a `u64` as a private witness.
pub fn witness_u64(cs: ConstraintSystemRef<Fr>, v: u64) -> Result<FpVar<Fr>, SynthesisError> {
    FpVar::<Fr>::new_witness(cs, || Ok(Fr::from(v)))
}

/// Allocate a private boolean and constrain it to `{0, 1}`.
pub fn witness_bool(cs: ConstraintSystemRef<Fr>, v: bool) -> Result<FpVar<Fr>, SynthesisError> {
    let b = FpVar::<Fr>::new_witness(cs, || Ok(Fr::from(v as u64)))?;
    enforce_boolean(&b)?;
    Ok(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pow2_matches_integer_shift() {
        assert_eq!(pow2(0), Fr::from(1u64));
        assert_eq!(pow2(10), Fr::from(1024u64));
        assert_eq!(pow2(64), Fr::from(1u128 << 64));
    }

    #[test]
    fn fr_to_u128_rejects_wide_values() {
        assert_eq!(fr_to_u128(Fr::from(42u64)), Some(42));
        assert_eq!(fr_to_u128(Fr::from(u128::MAX)), Some(u128::MAX));
        assert_eq!(fr_to_u128(-Fr::from(1u64)), None);
    }
}
