//! Aggregate-claim gadgets composed from the primitives.

use super::arithmetic::{safe_division, sum, variance};
use super::comparators::greater_or_equal;
use super::logic::{and, is_zero, not, or_many};
use crate::constants::{DIVISION_BITS, MAX_SCORE};
use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSystemRef, SynthesisError};

/// Consistency of a weekly activity histogram: `floor(100 * m^2 / (m^2 + v))`.
///
/// `m` is the integer mean and `v` the integer population variance. A flat histogram scores
/// 100, bursty activity tends to 0. An empty histogram has a zero denominator, which is
/// replaced by 1 so the score is 0 instead of an unsatisfiable division.
///
/// Weekly buckets must already be range-checked (16 bits keeps every intermediate inside
/// `DIVISION_BITS`).
pub fn consistency_score(
    cs: ConstraintSystemRef<Fr>,
    weekly: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    if weekly.is_empty() {
        return Err(SynthesisError::Unsatisfiable);
    }

    let weeks = FpVar::constant(Fr::from(weekly.len() as u64));
    let (mean, _) = safe_division(cs.clone(), &sum(weekly), &weeks, DIVISION_BITS)?;
    let var = variance(cs.clone(), weekly, &mean, DIVISION_BITS)?;

    let mean_sq = &mean * &mean;
    let denominator = &mean_sq + &var;
    let empty = is_zero(cs.clone(), &denominator)?;
    let denominator = denominator + empty;

    let numerator = mean_sq * Fr::from(MAX_SCORE);
    let (score, _) = safe_division(cs, &numerator, &denominator, DIVISION_BITS)?;
    Ok(score)
}

/// Native mirror of [`consistency_score`], used by hosts to predict the circuit's output.
pub fn consistency_score_value(weekly: &[u64]) -> u64 {
    if weekly.is_empty() {
        return 0;
    }
    let n = weekly.len() as u128;
    let mean = weekly.iter().map(|w| *w as u128).sum::<u128>() / n;
    let var = weekly
        .iter()
        .map(|w| {
            let d = (*w as i128) - mean as i128;
            (d * d) as u128
        })
        .sum::<u128>()
        / n;

    let mean_sq = mean * mean;
    let denominator = mean_sq + var;
    if denominator == 0 {
        return 0;
    }
    (mean_sq * MAX_SCORE as u128 / denominator) as u64
}

/// `out = 1` iff some active slot is not owned by the subject.
pub fn non_ownership_check(
    owned: &[FpVar<Fr>],
    active: &[FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    if owned.len() != active.len() {
        return Err(SynthesisError::Unsatisfiable);
    }
    let collaborator_only: Vec<FpVar<Fr>> = owned
        .iter()
        .zip(active)
        .map(|(o, a)| and(a, &not(o)))
        .collect();
    Ok(or_many(&collaborator_only))
}

/// `out = 1` iff at least `min_repositories` active slots have `min_collaborators` or more
/// collaborators.
pub fn collaboration_check(
    cs: ConstraintSystemRef<Fr>,
    collaborators: &[FpVar<Fr>],
    active: &[FpVar<Fr>],
    min_collaborators: &FpVar<Fr>,
    min_repositories: &FpVar<Fr>,
    n: usize,
) -> Result<FpVar<Fr>, SynthesisError> {
    if collaborators.len() != active.len() {
        return Err(SynthesisError::Unsatisfiable);
    }

    let mut qualifying = Vec::with_capacity(collaborators.len());
    for (c, a) in collaborators.iter().zip(active) {
        let enough = greater_or_equal(cs.clone(), c, min_collaborators, n)?;
        qualifying.push(and(a, &enough));
    }

    greater_or_equal(cs, &sum(&qualifying), min_repositories, n)
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
    fn flat_activity_is_fully_consistent() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let weekly = witnesses(&cs, &[5, 5, 5, 5]);
        let score = consistency_score(cs.clone(), &weekly).unwrap();
        assert_eq!(score.value().unwrap(), Fr::from(100u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn bursty_activity_scores_low_and_matches_native() {
        let weekly_vals = [0u64, 0, 0, 40];
        let cs = ConstraintSystem::<Fr>::new_ref();
        let weekly = witnesses(&cs, &weekly_vals);
        let score = consistency_score(cs.clone(), &weekly).unwrap();

        // mean 10, variance 300 -> 100 * 100 / 400 = 25
        assert_eq!(consistency_score_value(&weekly_vals), 25);
        assert_eq!(score.value().unwrap(), Fr::from(25u64));
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn empty_activity_scores_zero() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let weekly = witnesses(&cs, &[0, 0, 0]);
        let score = consistency_score(cs.clone(), &weekly).unwrap();
        assert_eq!(score.value().unwrap(), Fr::from(0u64));
        assert_eq!(consistency_score_value(&[0, 0, 0]), 0);
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn non_ownership_ignores_inactive_slots() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let owned = witnesses(&cs, &[1, 0, 1]);
        let active_all = witnesses(&cs, &[1, 1, 0]);
        let active_owned_only = witnesses(&cs, &[1, 0, 0]);

        let yes = non_ownership_check(&owned, &active_all).unwrap();
        let no = non_ownership_check(&owned, &active_owned_only).unwrap();
        assert_eq!(yes.value().unwrap(), Fr::from(1u64));
        assert_eq!(no.value().unwrap(), Fr::from(0u64));
    }

    #[test]
    fn collaboration_counts_qualifying_active_slots() {
        let cs = ConstraintSystem::<Fr>::new_ref();
        let collaborators = witnesses(&cs, &[1, 4, 6, 9]);
        let active = witnesses(&cs, &[1, 1, 1, 0]);
        let thresholds = witnesses(&cs, &[3, 2, 3]);

        let two_repos = collaboration_check(cs.clone(), &collaborators, &active, &thresholds[0], &thresholds[1], 16).unwrap();
        let three_repos = collaboration_check(cs.clone(), &collaborators, &active, &thresholds[0], &thresholds[2], 16).unwrap();

        assert_eq!(two_repos.value().unwrap(), Fr::from(1u64));
        assert_eq!(three_repos.value().unwrap(), Fr::from(0u64));
        assert!(cs.is_satisfied().unwrap());
    }
}
