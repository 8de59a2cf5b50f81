//! Types shared between the circuits and the host-side prover/verifier.

use crate::error::ZkError;
use ark_bn254::{Bn254, Fq, Fq2, Fr, G1Affine, G2Affine};
use ark_ff::{BigInteger, PrimeField};
use ark_groth16::Proof;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// JSON-friendly representation of a field element as big-endian hex.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrHex {
    pub hex: String,
}

impl FrHex {
    pub fn from_fr(x: &Fr) -> Self {
        Self {
            hex: hex::encode(x.into_bigint().to_bytes_be()),
        }
    }

    pub fn to_fr(&self) -> Result<Fr, String> {
        let bytes = hex::decode(self.hex.trim_start_matches("0x"))
            .map_err(|e| format!("invalid hex: {e}"))?;
        Ok(Fr::from_be_bytes_mod_order(&bytes))
    }
}

/// Decimal string form used for public signals and proof coordinates.
pub fn fr_to_decimal(x: &Fr) -> String {
    x.into_bigint().to_string()
}

pub fn fr_from_decimal(s: &str) -> Result<Fr, ZkError> {
    Fr::from_str(s).map_err(|_| ZkError::InvalidEnvelope(format!("not a field element: {s}")))
}

fn fq_from_decimal(s: &str) -> Result<Fq, ZkError> {
    Fq::from_str(s).map_err(|_| ZkError::InvalidEnvelope(format!("not a base field element: {s}")))
}

/// The claim circuits this crate can prove.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitKind {
    Contribution,
    RangeClaim,
    AggregateClaim,
}

impl CircuitKind {
    pub const ALL: [CircuitKind; 3] = [
        CircuitKind::Contribution,
        CircuitKind::RangeClaim,
        CircuitKind::AggregateClaim,
    ];

    /// Versioned circuit name; also the file stem for cached keys.
    pub fn name(&self) -> &'static str {
        match self {
            CircuitKind::Contribution => "contribution_v1",
            CircuitKind::RangeClaim => "range_claim_v1",
            CircuitKind::AggregateClaim => "aggregate_claim_v1",
        }
    }
}

impl fmt::Display for CircuitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CircuitKind {
    type Err = ZkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CircuitKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| ZkError::UnknownCircuit(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofProtocol {
    Groth16,
    Plonk,
    Stark,
}

/// Proof envelope in the familiar `pi_a / pi_b / pi_c` layout.
///
/// Points are projective triplets of decimal strings with `z = 1`; G2 coordinates are
/// `[c0, c1]` pairs. Only Groth16 over BN254 is produced here; other protocols can be carried
/// but not decoded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZkProof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    pub protocol: ProofProtocol,
    pub curve: String,
    pub public_signals: Vec<String>,
}

pub const BN254_CURVE: &str = "bn128";

impl ZkProof {
    pub fn from_groth16(proof: &Proof<Bn254>, public_inputs: &[Fr]) -> Self {
        let g1 = |p: &G1Affine| vec![p.x.into_bigint().to_string(), p.y.into_bigint().to_string(), "1".to_string()];
        let fq2 = |c: &Fq2| vec![c.c0.into_bigint().to_string(), c.c1.into_bigint().to_string()];

        Self {
            pi_a: g1(&proof.a),
            pi_b: vec![fq2(&proof.b.x), fq2(&proof.b.y), vec!["1".to_string(), "0".to_string()]],
            pi_c: g1(&proof.c),
            protocol: ProofProtocol::Groth16,
            curve: BN254_CURVE.to_string(),
            public_signals: public_inputs.iter().map(fr_to_decimal).collect(),
        }
    }

    pub fn public_inputs(&self) -> Result<Vec<Fr>, ZkError> {
        self.public_signals.iter().map(|s| fr_from_decimal(s)).collect()
    }

    pub fn to_groth16(&self) -> Result<Proof<Bn254>, ZkError> {
        if self.protocol != ProofProtocol::Groth16 || self.curve != BN254_CURVE {
            return Err(ZkError::InvalidEnvelope(format!(
                "unsupported protocol/curve: {:?}/{}",
                self.protocol, self.curve
            )));
        }

        Ok(Proof {
            a: g1_from_strings(&self.pi_a)?,
            b: g2_from_strings(&self.pi_b)?,
            c: g1_from_strings(&self.pi_c)?,
        })
    }
}

fn g1_from_strings(coords: &[String]) -> Result<G1Affine, ZkError> {
    if coords.len() != 3 || coords[2] != "1" {
        return Err(ZkError::InvalidEnvelope("G1 point must be [x, y, 1]".to_string()));
    }
    let p = G1Affine::new_unchecked(fq_from_decimal(&coords[0])?, fq_from_decimal(&coords[1])?);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ZkError::InvalidEnvelope("G1 point not on curve".to_string()));
    }
    Ok(p)
}

fn g2_from_strings(coords: &[Vec<String>]) -> Result<G2Affine, ZkError> {
    let pair = |c: &Vec<String>| -> Result<Fq2, ZkError> {
        if c.len() != 2 {
            return Err(ZkError::InvalidEnvelope("Fq2 element must be [c0, c1]".to_string()));
        }
        Ok(Fq2::new(fq_from_decimal(&c[0])?, fq_from_decimal(&c[1])?))
    };

    if coords.len() != 3 || coords[2] != ["1", "0"] {
        return Err(ZkError::InvalidEnvelope("G2 point must be [x, y, [1, 0]]".to_string()));
    }
    let p = G2Affine::new_unchecked(pair(&coords[0])?, pair(&coords[1])?);
    if !p.is_on_curve() || !p.is_in_correct_subgroup_assuming_on_curve() {
        return Err(ZkError::InvalidEnvelope("G2 point not on curve".to_string()));
    }
    Ok(p)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fr_hex_is_big_endian() {
        let h = FrHex::from_fr(&Fr::from(0x0102u64));
        assert_eq!(h.hex.len(), 64);
        assert!(h.hex.ends_with("0102"));
        assert_eq!(h.to_fr().unwrap(), Fr::from(0x0102u64));
    }

    #[test]
    fn decimal_signals_roundtrip() {
        let x = Fr::from(123_456_789u64);
        assert_eq!(fr_to_decimal(&x), "123456789");
        assert_eq!(fr_from_decimal("123456789").unwrap(), x);
        assert!(fr_from_decimal("not-a-number").is_err());
    }

    #[test]
    fn circuit_kind_names_parse() {
        for kind in CircuitKind::ALL {
            assert_eq!(kind.name().parse::<CircuitKind>().unwrap(), kind);
        }
        assert!("ledger_v9".parse::<CircuitKind>().is_err());
    }

    #[test]
    fn envelope_rejects_points_off_curve() {
        let envelope = ZkProof {
            pi_a: vec!["1".into(), "3".into(), "1".into()],
            pi_b: vec![vec!["1".into(), "0".into()], vec!["1".into(), "0".into()], vec!["1".into(), "0".into()]],
            pi_c: vec!["1".into(), "2".into(), "1".into()],
            protocol: ProofProtocol::Groth16,
            curve: BN254_CURVE.to_string(),
            public_signals: vec![],
        };
        assert!(matches!(envelope.to_groth16(), Err(ZkError::InvalidEnvelope(_))));
    }
}
