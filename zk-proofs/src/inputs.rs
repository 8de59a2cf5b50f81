//! Canonical input generation for the contribution circuit.
//!
//! Domain data (hex hashes, keys, addresses, plain counts) is validated against declared
//! bounds and mapped into field elements, then split into the public bundle a verifier sees
//! and the private witness only the prover holds.

use crate::circuit::ContributionCircuit;
use crate::constants::{COUNT_BITS, WIDE_BITS};
use crate::hash::poseidon_hash;
use crate::types::FrHex;
use ark_bn254::Fr;
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("{field} = {value} is out of range (must be {bound})")]
    OutOfRange {
        field: &'static str,
        value: u64,
        bound: String,
    },

    #[error("invalid ranges: {0}")]
    InvalidRanges(String),

    #[error("invalid encoding for {field}: {reason}")]
    InvalidEncoding { field: &'static str, reason: String },

    #[error("signature does not match content hash")]
    InvalidSignature,

    #[error("unknown sample scenario: {0}")]
    UnknownScenario(String),
}

/// Interpret bytes as a big-endian integer reduced into the scalar field.
pub fn encode_bytes(bytes: &[u8]) -> Fr {
    Fr::from_be_bytes_mod_order(bytes)
}

/// Decode a (optionally `0x`-prefixed) hex string into a field element.
pub fn encode_hex(field: &'static str, value: &str) -> Result<Fr, InputError> {
    let trimmed = value.trim_start_matches("0x");
    if trimmed.is_empty() {
        return Err(InputError::InvalidEncoding { field, reason: "empty".to_string() });
    }
    let bytes = hex::decode(trimmed)
        .map_err(|e| InputError::InvalidEncoding { field, reason: e.to_string() })?;
    Ok(encode_bytes(&bytes))
}

/// Account addresses are hex strings and encode exactly like hashes.
pub fn encode_address(address: &str) -> Result<Fr, InputError> {
    encode_hex("address", address)
}

/// A field-element signing key. `public_key = Poseidon(sk)`, `sig = Poseidon(sk, content)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigningKey {
    secret: Fr,
}

impl SigningKey {
    pub fn from_fr(secret: Fr) -> Self {
        Self { secret }
    }

    pub fn from_hex(value: &str) -> Result<Self, InputError> {
        Ok(Self { secret: encode_hex("signing_key", value)? })
    }

    pub fn public_key(&self) -> Fr {
        poseidon_hash(&[self.secret])
    }

    pub fn sign(&self, content_hash: Fr) -> Fr {
        poseidon_hash(&[self.secret, content_hash])
    }
}

/// Largest timestamp or age the circuit's time comparisons accept.
pub const MAX_TIME_VALUE: u64 = (1 << (WIDE_BITS - 1)) - 1;

fn within_time_width(field: &'static str, value: u64) -> Result<(), InputError> {
    if value > MAX_TIME_VALUE {
        return Err(InputError::OutOfRange { field, value, bound: format!("<= {MAX_TIME_VALUE}") });
    }
    Ok(())
}

/// Raw facts about one contribution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionData {
    pub content_hash: String,
    pub lines_of_code: u64,
    pub file_count: u64,
    pub commit_timestamp: u64,
    #[serde(default)]
    pub signature: Option<String>,
}

/// Declared bounds the contribution must satisfy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRanges {
    pub min_loc: u64,
    pub max_loc: u64,
    pub max_files: u64,
    pub max_age_secs: u64,
}

impl ContributionRanges {
    fn validate(&self) -> Result<(), InputError> {
        let limit = (1u64 << COUNT_BITS) - 1;
        if self.min_loc > self.max_loc {
            return Err(InputError::InvalidRanges(format!(
                "min_loc {} exceeds max_loc {}",
                self.min_loc, self.max_loc
            )));
        }
        if self.max_loc > limit || self.max_files > limit {
            return Err(InputError::InvalidRanges(format!("bounds must fit in {COUNT_BITS} bits")));
        }
        within_time_width("max_age_secs", self.max_age_secs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionPublicInputs {
    pub content_hash: FrHex,
    pub public_key: FrHex,
    pub min_loc: u64,
    pub max_loc: u64,
    pub max_files: u64,
    pub max_age_secs: u64,
    pub timestamp: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionWitness {
    pub lines_of_code: u64,
    pub file_count: u64,
    pub commit_timestamp: u64,
    pub secret_key: FrHex,
    pub signature: FrHex,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionInputs {
    pub public: ContributionPublicInputs,
    pub witness: ContributionWitness,
}

impl ContributionInputs {
    pub fn into_circuit(self) -> Result<ContributionCircuit, InputError> {
        let fr = |field: &'static str, v: &FrHex| {
            v.to_fr().map_err(|reason| InputError::InvalidEncoding { field, reason })
        };

        Ok(ContributionCircuit {
            content_hash: fr("content_hash", &self.public.content_hash)?,
            public_key: fr("public_key", &self.public.public_key)?,
            min_loc: self.public.min_loc,
            max_loc: self.public.max_loc,
            max_files: self.public.max_files,
            max_age_secs: self.public.max_age_secs,
            timestamp: self.public.timestamp,
            lines_of_code: self.witness.lines_of_code,
            file_count: self.witness.file_count,
            commit_timestamp: self.witness.commit_timestamp,
            secret_key: fr("secret_key", &self.witness.secret_key)?,
            signature: fr("signature", &self.witness.signature)?,
        })
    }
}

/// Validate a contribution against `ranges` at time `now` and build the circuit inputs.
///
/// A supplied signature must be the key's signature over this content hash; when none is
/// supplied one is derived, so a signature is never carried over to different content.
pub fn generate_inputs(
    raw: &ContributionData,
    key: &SigningKey,
    ranges: &ContributionRanges,
    now: u64,
) -> Result<ContributionInputs, InputError> {
    ranges.validate()?;
    within_time_width("timestamp", now)?;

    if raw.lines_of_code < ranges.min_loc {
        return Err(InputError::OutOfRange {
            field: "lines_of_code",
            value: raw.lines_of_code,
            bound: format!(">= {}", ranges.min_loc),
        });
    }
    if raw.lines_of_code > ranges.max_loc {
        return Err(InputError::OutOfRange {
            field: "lines_of_code",
            value: raw.lines_of_code,
            bound: format!("<= {}", ranges.max_loc),
        });
    }
    if raw.file_count > ranges.max_files {
        return Err(InputError::OutOfRange {
            field: "file_count",
            value: raw.file_count,
            bound: format!("<= {}", ranges.max_files),
        });
    }
    if raw.commit_timestamp > now {
        return Err(InputError::OutOfRange {
            field: "commit_timestamp",
            value: raw.commit_timestamp,
            bound: format!("<= {now}"),
        });
    }
    let age = now - raw.commit_timestamp;
    if age > ranges.max_age_secs {
        return Err(InputError::OutOfRange {
            field: "age_secs",
            value: age,
            bound: format!("<= {}", ranges.max_age_secs),
        });
    }

    let content_hash = encode_hex("content_hash", &raw.content_hash)?;
    let expected = key.sign(content_hash);
    let signature = match &raw.signature {
        Some(sig) => {
            let supplied = encode_hex("signature", sig)?;
            if supplied != expected {
                return Err(InputError::InvalidSignature);
            }
            supplied
        }
        None => expected,
    };

    Ok(ContributionInputs {
        public: ContributionPublicInputs {
            content_hash: FrHex::from_fr(&content_hash),
            public_key: FrHex::from_fr(&key.public_key()),
            min_loc: ranges.min_loc,
            max_loc: ranges.max_loc,
            max_files: ranges.max_files,
            max_age_secs: ranges.max_age_secs,
            timestamp: now,
        },
        witness: ContributionWitness {
            lines_of_code: raw.lines_of_code,
            file_count: raw.file_count,
            commit_timestamp: raw.commit_timestamp,
            secret_key: FrHex::from_fr(&key.secret),
            signature: FrHex::from_fr(&signature),
        },
    })
}

// --- Fixtures -------------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleScenario {
    Valid,
    InvalidRange,
    InvalidSignature,
}

impl FromStr for SampleScenario {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(SampleScenario::Valid),
            "invalid_range" => Ok(SampleScenario::InvalidRange),
            "invalid_signature" => Ok(SampleScenario::InvalidSignature),
            other => Err(InputError::UnknownScenario(other.to_string())),
        }
    }
}

/// Everything `generate_inputs` needs, for one deterministic scenario.
#[derive(Clone, Debug)]
pub struct SampleInputs {
    pub data: ContributionData,
    pub key: SigningKey,
    pub ranges: ContributionRanges,
    pub now: u64,
}

const SAMPLE_NOW: u64 = 1_700_000_000;
const SAMPLE_CONTENT_HASH: &str = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08";
const SAMPLE_OTHER_CONTENT_HASH: &str = "60303ae22b998861bce3b28f33eec1be758a213c86c93c076dbe9f558c11c752";

/// Deterministic fixtures for test seeding.
pub fn generate_sample_inputs(scenario: SampleScenario) -> SampleInputs {
    let key = SigningKey::from_fr(Fr::from(0x5eed_c0de_u64));
    let ranges = ContributionRanges {
        min_loc: 10,
        max_loc: 10_000,
        max_files: 50,
        max_age_secs: 30 * 24 * 60 * 60,
    };

    let mut data = ContributionData {
        content_hash: SAMPLE_CONTENT_HASH.to_string(),
        lines_of_code: 420,
        file_count: 7,
        commit_timestamp: SAMPLE_NOW - 3_600,
        signature: None,
    };

    match scenario {
        SampleScenario::Valid => {}
        SampleScenario::InvalidRange => data.lines_of_code = 50_000,
        SampleScenario::InvalidSignature => {
            // A genuine signature by the same key, but over different content.
            let other = encode_bytes(&hex::decode(SAMPLE_OTHER_CONTENT_HASH).unwrap_or_default());
            data.signature = Some(FrHex::from_fr(&key.sign(other)).hex);
        }
    }

    SampleInputs { data, key, ranges, now: SAMPLE_NOW }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groth16::check_satisfied;

    fn run(scenario: SampleScenario) -> Result<ContributionInputs, InputError> {
        run_sample(&generate_sample_inputs(scenario))
    }

    fn run_sample(s: &SampleInputs) -> Result<ContributionInputs, InputError> {
        generate_inputs(&s.data, &s.key, &s.ranges, s.now)
    }

    #[test]
    fn valid_sample_produces_satisfiable_circuit() {
        let inputs = run(SampleScenario::Valid).unwrap();
        assert_eq!(inputs.public.timestamp, SAMPLE_NOW);
        assert_eq!(inputs.witness.lines_of_code, 420);

        let circuit = inputs.into_circuit().unwrap();
        check_satisfied(circuit).unwrap();
    }

    #[test]
    fn invalid_range_sample_cites_field_and_bound() {
        let err = run(SampleScenario::InvalidRange).unwrap_err();
        assert_eq!(
            err,
            InputError::OutOfRange { field: "lines_of_code", value: 50_000, bound: "<= 10000".to_string() }
        );
    }

    #[test]
    fn invalid_signature_sample_is_rejected() {
        assert_eq!(run(SampleScenario::InvalidSignature).unwrap_err(), InputError::InvalidSignature);
    }

    #[test]
    fn supplied_matching_signature_is_accepted() {
        let mut s = generate_sample_inputs(SampleScenario::Valid);
        let content = encode_hex("content_hash", &s.data.content_hash).unwrap();
        s.data.signature = Some(format!("0x{}", FrHex::from_fr(&s.key.sign(content)).hex));
        assert!(generate_inputs(&s.data, &s.key, &s.ranges, s.now).is_ok());
    }

    #[test]
    fn derived_signatures_differ_per_content() {
        let key = SigningKey::from_fr(Fr::from(1u64));
        assert_ne!(key.sign(Fr::from(10u64)), key.sign(Fr::from(11u64)));
    }

    #[test]
    fn stale_and_future_commits_are_out_of_range() {
        let mut s = generate_sample_inputs(SampleScenario::Valid);
        s.data.commit_timestamp = s.now - s.ranges.max_age_secs - 1;
        assert!(matches!(
            generate_inputs(&s.data, &s.key, &s.ranges, s.now),
            Err(InputError::OutOfRange { field: "age_secs", .. })
        ));

        s.data.commit_timestamp = s.now + 1;
        assert!(matches!(
            generate_inputs(&s.data, &s.key, &s.ranges, s.now),
            Err(InputError::OutOfRange { field: "commit_timestamp", .. })
        ));
    }

    #[test]
    fn file_count_and_range_sanity() {
        let mut s = generate_sample_inputs(SampleScenario::Valid);
        s.data.file_count = 51;
        assert!(matches!(
            generate_inputs(&s.data, &s.key, &s.ranges, s.now),
            Err(InputError::OutOfRange { field: "file_count", .. })
        ));

        let s = generate_sample_inputs(SampleScenario::Valid);
        let inverted = ContributionRanges { min_loc: 100, max_loc: 10, ..s.ranges };
        assert!(matches!(
            generate_inputs(&s.data, &s.key, &inverted, s.now),
            Err(InputError::InvalidRanges(_))
        ));
    }

    #[test]
    fn times_beyond_comparator_width_are_out_of_range() {
        let mut s = generate_sample_inputs(SampleScenario::Valid);
        s.ranges.max_age_secs = u64::MAX;
        assert_eq!(
            run_sample(&s).unwrap_err(),
            InputError::OutOfRange {
                field: "max_age_secs",
                value: u64::MAX,
                bound: format!("<= {MAX_TIME_VALUE}"),
            }
        );

        let mut s = generate_sample_inputs(SampleScenario::Valid);
        s.now = MAX_TIME_VALUE + 1;
        assert!(matches!(run_sample(&s), Err(InputError::OutOfRange { field: "timestamp", .. })));

        // The widest accepted values still give a satisfiable circuit.
        let mut s = generate_sample_inputs(SampleScenario::Valid);
        s.ranges.max_age_secs = MAX_TIME_VALUE;
        s.now = MAX_TIME_VALUE;
        s.data.commit_timestamp = 1;
        let circuit = run_sample(&s).unwrap().into_circuit().unwrap();
        check_satisfied(circuit).unwrap();
    }

    #[test]
    fn hex_encoding_is_big_endian() {
        assert_eq!(encode_hex("h", "0x0100").unwrap(), Fr::from(256u64));
        assert_eq!(encode_address("0x00000000000000000000000000000000000000ff").unwrap(), Fr::from(255u64));
        assert!(matches!(encode_hex("h", "zz"), Err(InputError::InvalidEncoding { field: "h", .. })));
        assert!(matches!(encode_hex("h", "0x"), Err(InputError::InvalidEncoding { .. })));
    }

    #[test]
    fn scenario_names_parse() {
        assert_eq!("invalid_range".parse::<SampleScenario>().unwrap(), SampleScenario::InvalidRange);
        assert!("bogus".parse::<SampleScenario>().is_err());
    }
}
