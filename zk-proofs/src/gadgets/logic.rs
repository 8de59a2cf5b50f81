//! Zero tests, equality and boolean logic over field variables.

use ark_bn254::Fr;
use ark_ff::Field;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Enforce `b * (b - 1) = 0`.
pub fn enforce_boolean(b: &FpVar<Fr>) -> Result<(), SynthesisError> {
    let b_minus_one = b - Fr::from(1u64);
    (b * &b_minus_one).enforce_equal(&FpVar::zero())
}

/// Enforce that a boolean output is set.
pub fn enforce_true(b: &FpVar<Fr>) -> Result<(), SynthesisError> {
    b.enforce_equal(&FpVar::one())
}

/// `out = 1` iff `x = 0`.
///
/// The prover supplies `inv = x^-1` (or 0 when `x = 0`); the constraints `out = 1 - x * inv` and
/// `x * out = 0` leave no freedom: for nonzero `x` only the true inverse zeroes `x * out`.
pub fn is_zero(cs: ConstraintSystemRef<Fr>, x: &FpVar<Fr>) -> Result<FpVar<Fr>, SynthesisError> {
    let inv = FpVar::<Fr>::new_witness(cs, || {
        let v = x.value()?;
        Ok(v.inverse().unwrap_or(Fr::from(0u64)))
    })?;

    let out = FpVar::one() - x * &inv;
    (x * &out).enforce_equal(&FpVar::zero())?;
    Ok(out)
}

/// `out = 1` iff `a = b`.
pub fn is_equal(
    cs: ConstraintSystemRef<Fr>,
    a: &FpVar<Fr>,
    b: &FpVar<Fr>,
) -> Result<FpVar<Fr>, SynthesisError> {
    let diff = a - b;
    is_zero(cs, &diff)
}

pub fn and(a: &FpVar<Fr>, b: &FpVar<Fr>) -> FpVar<Fr> {
    a * b
}

pub fn or(a: &FpVar<Fr>, b: &FpVar<Fr>) -> FpVar<Fr> {
    let both = a * b;
    a + b - both
}

pub fn not(a: &FpVar<Fr>) -> FpVar<Fr> {
    FpVar::one() - a
}

/// Binary select: `sel = 0 -> when_false`, `sel = 1 -> when_true`.
pub fn mux(sel: &FpVar<Fr>, when_false: &FpVar<Fr>, when_true: &FpVar<Fr>) -> FpVar<Fr> {
    let delta = when_true - when_false;
    when_false + sel * &delta
}

/// Variable-arity OR as a left-to-right chain of binary ORs. Empty input is false.
pub fn or_many(inputs: &[FpVar<Fr>]) -> FpVar<Fr> {
    let mut iter = inputs.iter();
    let Some(first) = iter.next() else {
        return FpVar::zero();
    };
    iter.fold(first.clone(), |acc, x| or(&acc, x))
}
