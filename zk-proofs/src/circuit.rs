//! R1CS claim circuits assembled from the gadget library.
//!
//! Each circuit binds its private witnesses to a public Poseidon commitment (or, for
//! contributions, to a public key and content hash) and then proves threshold statements over
//! them. Public input allocation order is part of each circuit's interface: it MUST match the
//! vector returned by [`ClaimCircuit::public_inputs`].

use crate::constants::{COUNT_BITS, SMALL_COUNT_BITS, TOTAL_BITS, WIDE_BITS};
use crate::error::ZkError;
use crate::gadgets::{
    bit_decompose, collaboration_check, consistency_score, consistency_score_value,
    count_non_zero, enforce_boolean, enforce_in_range, enforce_true, greater_or_equal,
    input_u64, less_or_equal, non_ownership_check, not, sum, witness_bool, witness_u64,
};
use crate::hash::{poseidon_hash, poseidon_hash_var};
use crate::types::CircuitKind;
use ark_bn254::Fr;
use ark_r1cs_std::fields::fp::FpVar;
use ark_r1cs_std::prelude::*;
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};
use serde::{Deserialize, Serialize};

/// A circuit the host can set up, prove and verify generically.
pub trait ClaimCircuit: ConstraintSynthesizer<Fr> + Clone + Send + 'static {
    const KIND: CircuitKind;

    /// A well-formed instance used only for key generation; its values are never proven.
    fn placeholder() -> Self;

    /// Public inputs in allocation order.
    fn public_inputs(&self) -> Vec<Fr>;
}

// --- Range claim ---------------------------------------------------------------------------

/// Proves `min <= value <= max` for a value hidden behind `Poseidon(value, salt)`.
#[derive(Clone, Debug)]
pub struct RangeClaimCircuit {
    pub value: u64,
    pub salt: Fr,
    pub min: u64,
    pub max: u64,
}

impl RangeClaimCircuit {
    pub fn new(value: u64, salt: Fr, min: u64, max: u64) -> Self {
        Self { value, salt, min, max }
    }

    pub fn commitment(&self) -> Fr {
        poseidon_hash(&[Fr::from(self.value), self.salt])
    }
}

impl ConstraintSynthesizer<Fr> for RangeClaimCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let commitment = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.commitment()))?;
        let min = input_u64(cs.clone(), self.min)?;
        let max = input_u64(cs.clone(), self.max)?;

        let value = witness_u64(cs.clone(), self.value)?;
        let salt = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.salt))?;

        poseidon_hash_var(cs.clone(), &[value.clone(), salt])?.enforce_equal(&commitment)?;

        // One bit short of 64 so `max + 1` in the comparator stays inside the shifted window.
        enforce_in_range(cs, &value, &min, &max, WIDE_BITS - 1)
    }
}

impl ClaimCircuit for RangeClaimCircuit {
    const KIND: CircuitKind = CircuitKind::RangeClaim;

    fn placeholder() -> Self {
        Self::new(0, Fr::from(0u64), 0, 0)
    }

    fn public_inputs(&self) -> Vec<Fr> {
        vec![self.commitment(), Fr::from(self.min), Fr::from(self.max)]
    }
}

// --- Contribution ---------------------------------------------------------------------------

/// Proves a signed contribution respects the declared bounds.
///
/// Statement: the prover knows `sk` with `public_key = Poseidon(sk)` and
/// `signature = Poseidon(sk, content_hash)`, and the hidden LOC, file count and commit time
/// satisfy `min_loc <= loc <= max_loc`, `files <= max_files`,
/// `commit_timestamp <= timestamp` and `timestamp - commit_timestamp <= max_age_secs`.
#[derive(Clone, Debug)]
pub struct ContributionCircuit {
    pub content_hash: Fr,
    pub public_key: Fr,
    pub min_loc: u64,
    pub max_loc: u64,
    pub max_files: u64,
    pub max_age_secs: u64,
    pub timestamp: u64,

    pub lines_of_code: u64,
    pub file_count: u64,
    pub commit_timestamp: u64,
    pub secret_key: Fr,
    pub signature: Fr,
}

impl ConstraintSynthesizer<Fr> for ContributionCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        // Public inputs, in `public_inputs()` order.
        let content_hash = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.content_hash))?;
        let public_key = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.public_key))?;
        let min_loc = input_u64(cs.clone(), self.min_loc)?;
        let max_loc = input_u64(cs.clone(), self.max_loc)?;
        let max_files = input_u64(cs.clone(), self.max_files)?;
        let max_age = input_u64(cs.clone(), self.max_age_secs)?;
        let timestamp = input_u64(cs.clone(), self.timestamp)?;

        // Witnesses.
        let loc = witness_u64(cs.clone(), self.lines_of_code)?;
        let files = witness_u64(cs.clone(), self.file_count)?;
        let committed_at = witness_u64(cs.clone(), self.commit_timestamp)?;
        let secret_key = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.secret_key))?;
        let signature = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.signature))?;

        // Key ownership and signature over this content hash.
        poseidon_hash_var(cs.clone(), &[secret_key.clone()])?.enforce_equal(&public_key)?;
        poseidon_hash_var(cs.clone(), &[secret_key, content_hash])?.enforce_equal(&signature)?;

        enforce_in_range(cs.clone(), &loc, &min_loc, &max_loc, COUNT_BITS)?;

        bit_decompose(cs.clone(), &files, COUNT_BITS)?;
        bit_decompose(cs.clone(), &max_files, COUNT_BITS)?;
        enforce_true(&less_or_equal(cs.clone(), &files, &max_files, COUNT_BITS)?)?;

        let n = WIDE_BITS - 1;
        bit_decompose(cs.clone(), &committed_at, n)?;
        bit_decompose(cs.clone(), &timestamp, n)?;
        bit_decompose(cs.clone(), &max_age, n)?;
        enforce_true(&less_or_equal(cs.clone(), &committed_at, &timestamp, n)?)?;
        let age = &timestamp - &committed_at;
        enforce_true(&less_or_equal(cs, &age, &max_age, n)?)?;

        Ok(())
    }
}

impl ClaimCircuit for ContributionCircuit {
    const KIND: CircuitKind = CircuitKind::Contribution;

    fn placeholder() -> Self {
        let zero = Fr::from(0u64);
        Self {
            content_hash: zero,
            public_key: zero,
            min_loc: 0,
            max_loc: 0,
            max_files: 0,
            max_age_secs: 0,
            timestamp: 0,
            lines_of_code: 0,
            file_count: 0,
            commit_timestamp: 0,
            secret_key: zero,
            signature: zero,
        }
    }

    fn public_inputs(&self) -> Vec<Fr> {
        vec![
            self.content_hash,
            self.public_key,
            Fr::from(self.min_loc),
            Fr::from(self.max_loc),
            Fr::from(self.max_files),
            Fr::from(self.max_age_secs),
            Fr::from(self.timestamp),
        ]
    }
}

// --- Aggregate claim ------------------------------------------------------------------------

/// One repository's private contribution facts inside the aggregate claim.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositorySlot {
    pub active: bool,
    pub commits: u64,
    pub owned: bool,
    pub collaborators: u64,
}

impl RepositorySlot {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Public thresholds the aggregate claim proves the hidden statistics meet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateThresholds {
    pub min_total_commits: u64,
    pub min_repositories: u64,
    pub min_consistency: u64,
    pub min_collaborators: u64,
    pub min_collaborating_repositories: u64,
    pub require_non_owner: bool,
}

/// What the aggregate claim circuit will compute from a given witness.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AggregateSummary {
    pub total_commits: u64,
    pub repositories_with_commits: u64,
    pub consistency: u64,
    pub not_owner_of_all: bool,
}

impl AggregateSummary {
    /// Active slots with at least `min_collaborators` collaborators.
    pub fn collaborating_repositories(slots: &[RepositorySlot], min_collaborators: u64) -> u64 {
        slots
            .iter()
            .filter(|s| s.active && s.collaborators >= min_collaborators)
            .count() as u64
    }
}

impl AggregateThresholds {
    pub fn satisfied_by(&self, summary: &AggregateSummary, slots: &[RepositorySlot]) -> bool {
        summary.total_commits >= self.min_total_commits
            && summary.repositories_with_commits >= self.min_repositories
            && summary.consistency >= self.min_consistency
            && (!self.require_non_owner || summary.not_owner_of_all)
            && AggregateSummary::collaborating_repositories(slots, self.min_collaborators)
                >= self.min_collaborating_repositories
    }
}

/// Proves aggregate thresholds over `R` repository slots and a `W`-week activity histogram.
///
/// Statement:
/// 1) The private slots and histogram hash to the public commitment.
/// 2) Inactive slots carry no commits or collaborators.
/// 3) Total commits, repositories with commits, and the consistency score meet their minimums.
/// 4) At least `min_collaborating_repositories` active slots have `min_collaborators` or more.
/// 5) When `require_non_owner` is set, some active slot is not owned by the subject.
#[derive(Clone, Debug)]
pub struct AggregateClaimCircuit<const R: usize, const W: usize> {
    pub slots: Vec<RepositorySlot>,
    pub weekly_activity: Vec<u64>,
    pub salt: Fr,
    pub thresholds: AggregateThresholds,
}

impl<const R: usize, const W: usize> AggregateClaimCircuit<R, W> {
    pub fn new(
        slots: Vec<RepositorySlot>,
        weekly_activity: Vec<u64>,
        salt: Fr,
        thresholds: AggregateThresholds,
    ) -> Result<Self, ZkError> {
        if slots.len() != R {
            return Err(ZkError::InvalidInputLength { what: "repository slots", expected: R, got: slots.len() });
        }
        if weekly_activity.len() != W {
            return Err(ZkError::InvalidInputLength { what: "weekly activity", expected: W, got: weekly_activity.len() });
        }
        Ok(Self { slots, weekly_activity, salt, thresholds })
    }

    /// Poseidon commitment over `salt || (active, commits, owned, collaborators)* || weekly*`.
    pub fn commitment(&self) -> Fr {
        let mut preimage = Vec::with_capacity(1 + 4 * self.slots.len() + self.weekly_activity.len());
        preimage.push(self.salt);
        for s in &self.slots {
            preimage.push(Fr::from(s.active as u64));
            preimage.push(Fr::from(s.commits));
            preimage.push(Fr::from(s.owned as u64));
            preimage.push(Fr::from(s.collaborators));
        }
        preimage.extend(self.weekly_activity.iter().map(|w| Fr::from(*w)));
        poseidon_hash(&preimage)
    }

    pub fn summary(&self) -> AggregateSummary {
        AggregateSummary {
            total_commits: self.slots.iter().map(|s| s.commits).sum(),
            repositories_with_commits: self.slots.iter().filter(|s| s.commits > 0).count() as u64,
            consistency: consistency_score_value(&self.weekly_activity),
            not_owner_of_all: self.slots.iter().any(|s| s.active && !s.owned),
        }
    }

    /// True when an honest witness for these thresholds exists.
    pub fn is_provable(&self) -> bool {
        self.thresholds.satisfied_by(&self.summary(), &self.slots)
    }
}

impl<const R: usize, const W: usize> ConstraintSynthesizer<Fr> for AggregateClaimCircuit<R, W> {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let t = self.thresholds;

        // --- Public inputs ---
        let commitment = FpVar::<Fr>::new_input(cs.clone(), || Ok(self.commitment()))?;
        let min_total = input_u64(cs.clone(), t.min_total_commits)?;
        let min_repos = input_u64(cs.clone(), t.min_repositories)?;
        let min_consistency = input_u64(cs.clone(), t.min_consistency)?;
        let min_collaborators = input_u64(cs.clone(), t.min_collaborators)?;
        let min_collab_repos = input_u64(cs.clone(), t.min_collaborating_repositories)?;
        let require_non_owner = input_u64(cs.clone(), t.require_non_owner as u64)?;
        enforce_boolean(&require_non_owner)?;

        bit_decompose(cs.clone(), &min_total, TOTAL_BITS)?;
        for threshold in [&min_repos, &min_consistency, &min_collaborators, &min_collab_repos] {
            bit_decompose(cs.clone(), threshold, SMALL_COUNT_BITS)?;
        }

        // --- Witness (private) slots ---
        if self.slots.len() != R || self.weekly_activity.len() != W {
            return Err(SynthesisError::Unsatisfiable);
        }

        let salt = FpVar::<Fr>::new_witness(cs.clone(), || Ok(self.salt))?;
        let mut preimage = vec![salt];
        let mut active = Vec::with_capacity(R);
        let mut commits = Vec::with_capacity(R);
        let mut owned = Vec::with_capacity(R);
        let mut collaborators = Vec::with_capacity(R);

        for slot in &self.slots {
            let a = witness_bool(cs.clone(), slot.active)?;
            let c = witness_u64(cs.clone(), slot.commits)?;
            let o = witness_bool(cs.clone(), slot.owned)?;
            let k = witness_u64(cs.clone(), slot.collaborators)?;

            bit_decompose(cs.clone(), &c, COUNT_BITS)?;
            bit_decompose(cs.clone(), &k, SMALL_COUNT_BITS)?;

            // Padding slots contribute nothing.
            let inactive = not(&a);
            (&c * &inactive).enforce_equal(&FpVar::zero())?;
            (&k * &inactive).enforce_equal(&FpVar::zero())?;

            preimage.extend([a.clone(), c.clone(), o.clone(), k.clone()]);
            active.push(a);
            commits.push(c);
            owned.push(o);
            collaborators.push(k);
        }

        let mut weekly = Vec::with_capacity(W);
        for w in &self.weekly_activity {
            let v = witness_u64(cs.clone(), *w)?;
            bit_decompose(cs.clone(), &v, SMALL_COUNT_BITS)?;
            preimage.push(v.clone());
            weekly.push(v);
        }

        // Commitment binding.
        poseidon_hash_var(cs.clone(), &preimage)?.enforce_equal(&commitment)?;

        // Thresholds.
        let total = sum(&commits);
        enforce_true(&greater_or_equal(cs.clone(), &total, &min_total, TOTAL_BITS)?)?;

        let repos = count_non_zero(cs.clone(), &commits)?;
        enforce_true(&greater_or_equal(cs.clone(), &repos, &min_repos, SMALL_COUNT_BITS)?)?;

        let consistency = consistency_score(cs.clone(), &weekly)?;
        enforce_true(&greater_or_equal(cs.clone(), &consistency, &min_consistency, SMALL_COUNT_BITS)?)?;

        let not_owner = non_ownership_check(&owned, &active)?;
        (&require_non_owner * &not(&not_owner)).enforce_equal(&FpVar::zero())?;

        let collaborating = collaboration_check(
            cs,
            &collaborators,
            &active,
            &min_collaborators,
            &min_collab_repos,
            SMALL_COUNT_BITS,
        )?;
        enforce_true(&collaborating)?;

        Ok(())
    }
}

impl<const R: usize, const W: usize> ClaimCircuit for AggregateClaimCircuit<R, W> {
    const KIND: CircuitKind = CircuitKind::AggregateClaim;

    fn placeholder() -> Self {
        Self {
            slots: vec![RepositorySlot::inactive(); R],
            weekly_activity: vec![0; W],
            salt: Fr::from(0u64),
            thresholds: AggregateThresholds::default(),
        }
    }

    fn public_inputs(&self) -> Vec<Fr> {
        let t = &self.thresholds;
        vec![
            self.commitment(),
            Fr::from(t.min_total_commits),
            Fr::from(t.min_repositories),
            Fr::from(t.min_consistency),
            Fr::from(t.min_collaborators),
            Fr::from(t.min_collaborating_repositories),
            Fr::from(t.require_non_owner as u64),
        ]
    }
}
