//! Credential claim model: one tagged variant per credential kind, a shared envelope.

use crate::registry::Address;
use devcred_zk::types::ZkProof;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const CREDENTIAL_VERSION: &str = "1.0";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialType {
    Repository,
    Language,
    Collaboration,
    Aggregate,
    Consistency,
    Diversity,
    Leadership,
}

impl CredentialType {
    pub const ALL: [CredentialType; 7] = [
        CredentialType::Repository,
        CredentialType::Language,
        CredentialType::Collaboration,
        CredentialType::Aggregate,
        CredentialType::Consistency,
        CredentialType::Diversity,
        CredentialType::Leadership,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialType::Repository => "repository",
            CredentialType::Language => "language",
            CredentialType::Collaboration => "collaboration",
            CredentialType::Aggregate => "aggregate",
            CredentialType::Consistency => "consistency",
            CredentialType::Diversity => "diversity",
            CredentialType::Leadership => "leadership",
        }
    }

    /// Stable numeric tag bound into credential hashes.
    pub fn tag(&self) -> u64 {
        match self {
            CredentialType::Repository => 1,
            CredentialType::Language => 2,
            CredentialType::Collaboration => 3,
            CredentialType::Aggregate => 4,
            CredentialType::Consistency => 5,
            CredentialType::Diversity => 6,
            CredentialType::Leadership => 7,
        }
    }
}

impl fmt::Display for CredentialType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CredentialType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CredentialType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown credential type: {s}"))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeProofType {
    /// Both bounds are meaningful.
    Range,
    /// Only the lower bound is asserted.
    Threshold,
}

/// Assertion that a hidden value lies in `[min, max]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeProof {
    pub min: u64,
    pub max: u64,
    pub proof_type: RangeProofType,
}

impl RangeProof {
    pub fn between(min: u64, max: u64) -> Self {
        Self { min, max, proof_type: RangeProofType::Range }
    }

    pub fn at_least(min: u64) -> Self {
        Self { min, max: u64::MAX, proof_type: RangeProofType::Threshold }
    }

    pub fn contains(&self, value: u64) -> bool {
        self.min <= value && value <= self.max
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillLevel {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl SkillLevel {
    /// Highest first.
    pub const DESCENDING: [SkillLevel; 4] = [
        SkillLevel::Expert,
        SkillLevel::Advanced,
        SkillLevel::Intermediate,
        SkillLevel::Beginner,
    ];
}

/// Per-kind claim payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum CredentialClaim {
    Repository {
        repository_count: RangeProof,
        commit_count: RangeProof,
        is_not_owner: bool,
    },
    Language {
        language: String,
        proficiency: RangeProof,
        lines_of_code: RangeProof,
    },
    Collaboration {
        collaboration_score: RangeProof,
        collaborating_repositories: RangeProof,
        min_collaborators: u64,
    },
    Aggregate {
        skill_level: SkillLevel,
        total_repositories: RangeProof,
        total_commits: RangeProof,
        consistency_score: RangeProof,
        collaborating_repositories: RangeProof,
        is_not_owner_of_all: bool,
        /// Noised summary scores, disclosed for display only.
        collaboration_score: u64,
        diversity_score: u64,
    },
    Consistency {
        consistency_score: RangeProof,
        active_weeks: RangeProof,
    },
    Diversity {
        diversity_score: RangeProof,
        language_count: RangeProof,
    },
    Leadership {
        owned_repositories: RangeProof,
        total_collaborators: RangeProof,
    },
}

impl CredentialClaim {
    pub fn credential_type(&self) -> CredentialType {
        match self {
            CredentialClaim::Repository { .. } => CredentialType::Repository,
            CredentialClaim::Language { .. } => CredentialType::Language,
            CredentialClaim::Collaboration { .. } => CredentialType::Collaboration,
            CredentialClaim::Aggregate { .. } => CredentialType::Aggregate,
            CredentialClaim::Consistency { .. } => CredentialType::Consistency,
            CredentialClaim::Diversity { .. } => CredentialType::Diversity,
            CredentialClaim::Leadership { .. } => CredentialType::Leadership,
        }
    }

    /// Headline score recorded in the registry.
    pub fn score(&self) -> u64 {
        match self {
            CredentialClaim::Repository { commit_count, .. } => commit_count.min,
            CredentialClaim::Language { proficiency, .. } => proficiency.min,
            CredentialClaim::Collaboration { collaboration_score, .. } => collaboration_score.min,
            CredentialClaim::Aggregate { consistency_score, collaboration_score, diversity_score, .. } => {
                (consistency_score.min + collaboration_score + diversity_score) / 3
            }
            CredentialClaim::Consistency { consistency_score, .. } => consistency_score.min,
            CredentialClaim::Diversity { diversity_score, .. } => diversity_score.min,
            CredentialClaim::Leadership { owned_repositories, .. } => owned_repositories.min,
        }
    }
}

/// Shared envelope around every claim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[serde(rename = "type")]
    pub credential_type: CredentialType,
    pub version: String,
    pub issuer: Address,
    pub subject: Address,
    pub issued_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    pub claim: CredentialClaim,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<ZkProof>,
}

impl Credential {
    pub fn new(
        issuer: Address,
        subject: Address,
        issued_at: i64,
        expires_at: Option<i64>,
        claim: CredentialClaim,
        proof: Option<ZkProof>,
    ) -> Self {
        Self {
            credential_type: claim.credential_type(),
            version: CREDENTIAL_VERSION.to_string(),
            issuer,
            subject,
            issued_at,
            expires_at,
            claim,
            proof,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_names_parse() {
        for t in CredentialType::ALL {
            assert_eq!(t.as_str().parse::<CredentialType>().unwrap(), t);
        }
        assert!("badge".parse::<CredentialType>().is_err());
    }

    #[test]
    fn claim_tag_drives_envelope_type() {
        let claim = CredentialClaim::Language {
            language: "Rust".into(),
            proficiency: RangeProof::at_least(40),
            lines_of_code: RangeProof::between(1_000, 10_000),
        };
        let credential = Credential::new(Address::new("0x1"), Address::new("0x2"), 10, None, claim, None);
        assert_eq!(credential.credential_type, CredentialType::Language);

        let value = serde_json::to_value(&credential).unwrap();
        assert_eq!(value["type"], "language");
        assert_eq!(value["claim"]["type"], "language");
        assert_eq!(value["claim"]["linesOfCode"], json!({"min": 1000, "max": 10000, "proofType": "range"}));
        assert!(value.get("expiresAt").is_none());
    }

    #[test]
    fn claims_deserialize_by_tag() {
        let claim: CredentialClaim = serde_json::from_value(json!({
            "type": "leadership",
            "ownedRepositories": {"min": 3, "max": 10, "proofType": "range"},
            "totalCollaborators": {"min": 5, "max": 18446744073709551615u64, "proofType": "threshold"}
        }))
        .unwrap();
        assert_eq!(claim.credential_type(), CredentialType::Leadership);
        assert_eq!(claim.score(), 3);
    }

    #[test]
    fn range_proof_bounds() {
        assert!(RangeProof::between(5, 10).contains(5));
        assert!(RangeProof::between(5, 10).contains(10));
        assert!(!RangeProof::between(5, 10).contains(11));
        assert!(RangeProof::at_least(5).contains(u64::MAX));
    }
}
