use crate::aggregator::AggregatedCredential;
use crate::credentials::{Credential, SkillLevel};
use crate::issuance::IssuedCredential;
use crate::privacy::PrivacyLevel;
use crate::registry::{Address, CredentialHash};
use chrono::{DateTime, Utc};
use devcred_zk::types::{CircuitKind, ZkProof};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialRequest {
    pub user_address: Address,
    pub github_username: String,
    #[serde(default)]
    pub target_skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub include_private_repos: Option<bool>,

    /// Defaults to the service's configured level.
    #[serde(default)]
    pub privacy_level: Option<PrivacyLevel>,
}

/// One proof as transported alongside a credential.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofBundle {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub circuit_name: String,
    pub proof: ZkProof,
    pub public_signals: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl ProofBundle {
    pub fn new(proof_type: &str, circuit: CircuitKind, proof: ZkProof, generated_at: DateTime<Utc>) -> Self {
        Self {
            proof_type: proof_type.to_string(),
            circuit_name: circuit.name().to_string(),
            public_signals: proof.public_signals.clone(),
            proof,
            generated_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueCredentialResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential_hash: Option<CredentialHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
    /// The noised aggregate the credential was derived from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<AggregatedCredential>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zk_proofs: Option<Vec<ProofBundle>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub processing_time_ms: u64,
}

impl IssueCredentialResponse {
    pub fn issued(issued: IssuedCredential, processing_time_ms: u64) -> Self {
        Self {
            success: true,
            credential_hash: Some(issued.credential_hash),
            credential: Some(issued.credential),
            aggregate: Some(issued.aggregate),
            zk_proofs: Some(issued.proofs),
            error: None,
            processing_time_ms,
        }
    }

    pub fn failed(error: String, processing_time_ms: u64) -> Self {
        Self {
            success: false,
            credential_hash: None,
            credential: None,
            aggregate: None,
            zk_proofs: None,
            error: Some(error),
            processing_time_ms,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCredentialRequest {
    pub credential_hash: CredentialHash,
    #[serde(default)]
    pub zk_proofs: Vec<ProofBundle>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCredentialResponse {
    pub success: bool,
    pub is_valid: bool,
    pub verified_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkVkResponse {
    pub circuit: String,
    pub curve: String,
    pub proof_system: String,
    pub vk_b64: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn issue_request_accepts_minimal_body() {
        let req: IssueCredentialRequest = serde_json::from_value(json!({
            "userAddress": "0x00000000000000000000000000000000000000AB",
            "githubUsername": "octocat"
        }))
        .unwrap();
        assert_eq!(req.user_address.as_str(), "0x00000000000000000000000000000000000000ab");
        assert!(req.privacy_level.is_none());
        assert!(req.target_skill_level.is_none());

        let req: IssueCredentialRequest = serde_json::from_value(json!({
            "userAddress": "0x1",
            "githubUsername": "octocat",
            "targetSkillLevel": "advanced",
            "privacyLevel": "maximum",
            "includePrivateRepos": true
        }))
        .unwrap();
        assert_eq!(req.target_skill_level, Some(SkillLevel::Advanced));
        assert_eq!(req.privacy_level, Some(PrivacyLevel::Maximum));
    }

    #[test]
    fn failed_response_omits_absent_fields() {
        let value = serde_json::to_value(IssueCredentialResponse::failed("nope".into(), 12)).unwrap();
        assert_eq!(value, json!({"success": false, "error": "nope", "processingTimeMs": 12}));
    }

    #[test]
    fn verify_request_rejects_malformed_hash() {
        let bad = serde_json::from_value::<VerifyCredentialRequest>(json!({"credentialHash": "0x12"}));
        assert!(bad.is_err());
    }
}
