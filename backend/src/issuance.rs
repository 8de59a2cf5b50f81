//! Credential issuance and verification.
//!
//! Issuance: stats -> noised aggregate -> claim circuits -> Groth16 proofs (blocking pool,
//! bounded by a timeout) -> credential envelope -> registry. Verification re-checks the
//! registry, recomputes the credential hash from the stored record and the presented public
//! signals, and checks every proof against its circuit's verifying key.

use crate::aggregator::{
    AggregatedCredential, AggregationError, MultiRepoAggregator, RawRepositoryStats, activity_histogram,
};
use crate::credentials::{Credential, CredentialClaim, CredentialType, RangeProof, SkillLevel};
use crate::models::{IssueCredentialRequest, ProofBundle, VerifyCredentialRequest};
use crate::privacy::{LaplaceNoise, PrivacyLevel, PrivacyParameters};
use crate::registry::{CredentialHash, NewCredential, RegistryError};
use crate::state::AppState;
use crate::stats::StatsError;
use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use chrono::Utc;
use devcred_zk::circuit::{AggregateThresholds, ClaimCircuit, RangeClaimCircuit, RepositorySlot};
use devcred_zk::constants::{ACTIVITY_WEEKS, COUNT_BITS, MAX_REPOSITORIES, SMALL_COUNT_BITS, WIDE_BITS};
use devcred_zk::error::ZkError;
use devcred_zk::groth16::{DefaultAggregateCircuit, prove_claim_envelope, verify_envelope};
use devcred_zk::hash::poseidon_hash;
use devcred_zk::inputs::encode_address;
use devcred_zk::types::{CircuitKind, ZkProof, fr_from_decimal};
use rand::RngCore;
use rand::rngs::OsRng;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ProofGenerationError {
    #[error("proof generation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Circuit(#[from] ZkError),

    #[error("key store error: {0}")]
    Keys(String),

    #[error("proving task failed: {0}")]
    TaskFailed(String),
}

#[derive(Debug, Error)]
pub enum IssuanceError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Stats(#[from] StatsError),

    #[error(transparent)]
    Aggregation(#[from] AggregationError),

    #[error("activity does not meet the {0:?} skill level")]
    SkillLevelNotMet(SkillLevel),

    #[error(transparent)]
    Proof(#[from] ProofGenerationError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Public thresholds proven for each skill level.
pub fn skill_thresholds(level: SkillLevel) -> AggregateThresholds {
    match level {
        SkillLevel::Beginner => AggregateThresholds {
            min_total_commits: 1,
            min_repositories: 1,
            min_consistency: 0,
            min_collaborators: 0,
            min_collaborating_repositories: 0,
            require_non_owner: false,
        },
        SkillLevel::Intermediate => AggregateThresholds {
            min_total_commits: 50,
            min_repositories: 2,
            min_consistency: 20,
            min_collaborators: 2,
            min_collaborating_repositories: 1,
            require_non_owner: false,
        },
        SkillLevel::Advanced => AggregateThresholds {
            min_total_commits: 200,
            min_repositories: 4,
            min_consistency: 40,
            min_collaborators: 3,
            min_collaborating_repositories: 2,
            require_non_owner: true,
        },
        SkillLevel::Expert => AggregateThresholds {
            min_total_commits: 1_000,
            min_repositories: 6,
            min_consistency: 60,
            min_collaborators: 5,
            min_collaborating_repositories: 3,
            require_non_owner: true,
        },
    }
}

/// Repository slots for the aggregate circuit: the most active repositories first, clamped
/// to the circuit's bit widths and padded with inactive slots.
pub fn repository_slots(records: &[RawRepositoryStats]) -> Vec<RepositorySlot> {
    let mut sorted: Vec<&RawRepositoryStats> = records.iter().collect();
    sorted.sort_by(|a, b| b.commits.cmp(&a.commits));

    let max_commits = (1u64 << COUNT_BITS) - 1;
    let max_collaborators = (1u64 << SMALL_COUNT_BITS) - 1;
    let mut slots: Vec<RepositorySlot> = sorted
        .into_iter()
        .take(MAX_REPOSITORIES)
        .map(|r| RepositorySlot {
            active: true,
            commits: (r.commits.max(0) as u64).min(max_commits),
            owned: r.is_owner,
            collaborators: (r.collaborators.max(0) as u64).min(max_collaborators),
        })
        .collect();
    slots.resize(MAX_REPOSITORIES, RepositorySlot::inactive());
    slots
}

fn weekly_activity(records: &[RawRepositoryStats]) -> Vec<u64> {
    let max_week = (1u64 << SMALL_COUNT_BITS) - 1;
    activity_histogram(records, ACTIVITY_WEEKS)
        .into_iter()
        .map(|w| w.min(max_week))
        .collect()
}

/// The requested level if it is provable, otherwise the highest provable level.
fn choose_level(
    slots: &[RepositorySlot],
    weekly: &[u64],
    requested: Option<SkillLevel>,
) -> Result<(SkillLevel, DefaultAggregateCircuit), IssuanceError> {
    let candidates: Vec<SkillLevel> = match requested {
        Some(level) => vec![level],
        None => SkillLevel::DESCENDING.to_vec(),
    };

    for level in candidates {
        let thresholds = skill_thresholds(level);
        let circuit = DefaultAggregateCircuit::new(slots.to_vec(), weekly.to_vec(), random_fr(), thresholds)
            .map_err(ProofGenerationError::from)?;
        if circuit.is_provable() {
            return Ok((level, circuit));
        }
    }
    Err(IssuanceError::SkillLevelNotMet(requested.unwrap_or(SkillLevel::Beginner)))
}

fn random_fr() -> Fr {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    Fr::from_le_bytes_mod_order(&bytes)
}

/// Order-of-magnitude bracket `[10^k, 10^(k+1) - 1]` containing `value`.
pub fn magnitude_bracket(value: u64) -> (u64, u64) {
    if value == 0 {
        return (0, 9);
    }
    let mut low = 1u64;
    while let Some(next) = low.checked_mul(10) {
        if next > value {
            return (low, next - 1);
        }
        low = next;
    }
    (low, u64::MAX)
}

/// Largest value the range claim circuit compares.
const RANGE_CEILING: u64 = (1 << (WIDE_BITS - 2)) - 1;

/// Public LOC bracket for an already-noised total.
///
/// The bracket opens one extra decade downwards per privacy step above `standard`, so
/// stricter levels disclose a coarser magnitude. Returns the committed value with the bounds.
pub fn loc_bracket(noised_total: u64, level: PrivacyLevel) -> (u64, u64, u64) {
    let value = noised_total.min(RANGE_CEILING);
    let (mut low, high) = magnitude_bracket(value);
    let extra_decades = match level {
        PrivacyLevel::Minimal | PrivacyLevel::Standard => 0,
        PrivacyLevel::High => 1,
        PrivacyLevel::Maximum => 2,
    };
    for _ in 0..extra_decades {
        low /= 10;
    }
    (value, low, high.min(RANGE_CEILING))
}

/// Prove on the blocking pool, then verify before handing the proof out.
async fn prove<C: ClaimCircuit>(
    state: &AppState,
    circuit: C,
) -> Result<ZkProof, ProofGenerationError> {
    let keys = state.keys.get(C::KIND).await?;
    let timeout = state.config.proof_timeout;
    let started = Instant::now();
    info!(circuit = C::KIND.name(), "proof generation started");

    let task = tokio::task::spawn_blocking(move || {
        let envelope = prove_claim_envelope(&mut OsRng, keys.pk.as_ref(), circuit)?;
        // Fail closed if the proof doesn't verify.
        verify_envelope(keys.vk.as_ref(), &envelope)?;
        Ok::<ZkProof, ProofGenerationError>(envelope)
    });

    let envelope = tokio::time::timeout(timeout, task)
        .await
        .map_err(|_| ProofGenerationError::Timeout(timeout))?
        .map_err(|e| ProofGenerationError::TaskFailed(e.to_string()))??;

    info!(
        circuit = C::KIND.name(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "proof generation finished"
    );
    Ok(envelope)
}

/// `Poseidon(owner, type tag, expiresAt, public signals...)` as 32 big-endian bytes.
///
/// Every input except the signals is stored in the registry record, so a verifier can
/// recompute the hash from the record and the presented proofs.
pub fn credential_hash(
    owner: Fr,
    credential_type: CredentialType,
    expires_at: i64,
    proofs: &[&ZkProof],
) -> Result<CredentialHash, ZkError> {
    let mut preimage = vec![owner, Fr::from(credential_type.tag()), Fr::from(expires_at.max(0) as u64)];
    for proof in proofs {
        for signal in &proof.public_signals {
            preimage.push(fr_from_decimal(signal)?);
        }
    }

    let digest = poseidon_hash(&preimage).into_bigint().to_bytes_be();
    let mut bytes = [0u8; 32];
    bytes[32 - digest.len()..].copy_from_slice(&digest);
    Ok(CredentialHash::from_bytes(bytes))
}

#[derive(Clone, Debug)]
pub struct IssuedCredential {
    pub credential_hash: CredentialHash,
    pub credential: Credential,
    pub aggregate: AggregatedCredential,
    pub proofs: Vec<ProofBundle>,
}

pub async fn issue_credential(
    state: &AppState,
    req: IssueCredentialRequest,
) -> Result<IssuedCredential, IssuanceError> {
    let subject = req.user_address.clone();
    if subject.is_empty() || !subject.is_well_formed() {
        return Err(IssuanceError::InvalidRequest(format!("invalid userAddress: {subject}")));
    }
    if req.github_username.trim().is_empty() {
        return Err(IssuanceError::InvalidRequest("githubUsername must not be empty".to_string()));
    }
    let subject_fr = encode_address(subject.as_str()).map_err(|e| IssuanceError::InvalidRequest(e.to_string()))?;

    let records = state
        .stats
        .repositories(&req.github_username, req.include_private_repos.unwrap_or(false))
        .await?;

    let level = req.privacy_level.unwrap_or(state.config.default_privacy_level);
    let params = PrivacyParameters::for_level(level, state.config.min_repositories)?;
    let mut aggregator = MultiRepoAggregator::new(params, LaplaceNoise::from_entropy());
    for record in records {
        aggregator.add_repository(record)?;
    }
    let aggregate = aggregator.generate_aggregated_credential(&subject)?;

    let slots = repository_slots(aggregator.records());
    let weekly = weekly_activity(aggregator.records());
    let (skill_level, circuit) = choose_level(&slots, &weekly, req.target_skill_level)?;
    let thresholds = circuit.thresholds;

    let aggregate_proof = prove(state, circuit).await?;

    // Only the noised total is committed, and the bracket is derived from it.
    let (loc_value, loc_min, loc_max) = loc_bracket(aggregate.total_loc, level);
    let loc_proof = prove(state, RangeClaimCircuit::new(loc_value, random_fr(), loc_min, loc_max)).await?;

    let issued_at = Utc::now();
    let validity = i64::try_from(state.config.credential_validity.as_secs()).unwrap_or(i64::MAX);
    let expires_at = issued_at.timestamp().saturating_add(validity);

    let claim = CredentialClaim::Aggregate {
        skill_level,
        total_repositories: RangeProof::at_least(thresholds.min_repositories),
        total_commits: RangeProof::at_least(thresholds.min_total_commits),
        consistency_score: RangeProof::at_least(thresholds.min_consistency),
        collaborating_repositories: RangeProof::at_least(thresholds.min_collaborating_repositories),
        is_not_owner_of_all: aggregate.is_not_owner_of_all,
        collaboration_score: aggregate.collaboration_score,
        diversity_score: aggregate.diversity_score,
    };
    let score = claim.score();
    let credential = Credential::new(
        state.config.service_address.clone(),
        subject.clone(),
        issued_at.timestamp(),
        Some(expires_at),
        claim,
        Some(aggregate_proof.clone()),
    );

    let credential_hash = credential_hash(
        subject_fr,
        credential.credential_type,
        expires_at,
        &[&aggregate_proof, &loc_proof],
    )
    .map_err(ProofGenerationError::from)?;

    state
        .registry
        .register_credential(
            &state.config.service_address,
            NewCredential {
                credential_hash,
                owner: subject.clone(),
                credential_type: credential.credential_type,
                expires_at,
                ipfs_hash: String::new(),
                score,
            },
        )
        .await?;

    info!(%credential_hash, subject = %subject, ?skill_level, "credential issued");

    let proofs = vec![
        ProofBundle::new("aggregate", CircuitKind::AggregateClaim, aggregate_proof, issued_at),
        ProofBundle::new("range", CircuitKind::RangeClaim, loc_proof, issued_at),
    ];

    Ok(IssuedCredential { credential_hash, credential, aggregate, proofs })
}

/// Registry validity, hash binding, then Groth16 verification of every supplied proof.
pub async fn verify_credential(state: &AppState, req: &VerifyCredentialRequest) -> Result<bool, IssuanceError> {
    if !state.registry.is_credential_valid(&req.credential_hash).await? {
        return Ok(false);
    }
    if req.zk_proofs.is_empty() {
        return Ok(false);
    }

    let record = state.registry.get_credential(&req.credential_hash).await?;
    let owner = match encode_address(record.owner.as_str()) {
        Ok(owner) => owner,
        Err(e) => {
            warn!(credential = %req.credential_hash, error = %e, "registered owner is not encodable");
            return Ok(false);
        }
    };
    let presented: Vec<&ZkProof> = req.zk_proofs.iter().map(|b| &b.proof).collect();
    match credential_hash(owner, record.credential_type, record.expires_at, &presented) {
        Ok(recomputed) if recomputed == req.credential_hash => {}
        Ok(_) => {
            warn!(credential = %req.credential_hash, "proofs do not belong to this credential");
            return Ok(false);
        }
        Err(e) => {
            warn!(credential = %req.credential_hash, error = %e, "malformed public signals");
            return Ok(false);
        }
    }

    for bundle in &req.zk_proofs {
        let kind: CircuitKind = match bundle.circuit_name.parse() {
            Ok(kind) => kind,
            Err(_) => {
                warn!(circuit = %bundle.circuit_name, "unknown circuit in verification request");
                return Ok(false);
            }
        };
        if bundle.public_signals != bundle.proof.public_signals {
            return Ok(false);
        }

        let keys = state.keys.get(kind).await?;
        if let Err(e) = verify_envelope(keys.vk.as_ref(), &bundle.proof) {
            warn!(credential = %req.credential_hash, circuit = kind.name(), error = %e, "proof rejected");
            return Ok(false);
        }
    }
    Ok(true)
}
