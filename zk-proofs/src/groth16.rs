//! Groth16 prover/verifier orchestration for the claim circuits.
//!
//! SECURITY NOTE: Groth16 needs a trusted setup per circuit. Keys generated here with local
//! randomness are fine for development; production keys should come from an MPC ceremony.

use crate::circuit::{AggregateClaimCircuit, ClaimCircuit};
use crate::constants::{ACTIVITY_WEEKS, MAX_REPOSITORIES};
use crate::error::ZkError;
use crate::types::ZkProof;
use ark_bn254::{Bn254, Fr};
use ark_groth16::{prepare_verifying_key, Groth16, Proof, ProvingKey, VerifyingKey};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystem};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;

/// Aggregate claim circuit at the production slot counts.
pub type DefaultAggregateCircuit = AggregateClaimCircuit<MAX_REPOSITORIES, ACTIVITY_WEEKS>;

/// Synthesize `circuit` into a fresh constraint system and require every constraint to hold.
///
/// Groth16 proof creation does not check satisfiability itself, so this gate runs before
/// every proof: an inconsistent witness must fail here rather than yield a proof that only
/// fails at verification.
pub fn check_satisfied<C: ConstraintSynthesizer<Fr>>(circuit: C) -> Result<(), ZkError> {
    let cs = ConstraintSystem::<Fr>::new_ref();
    circuit
        .generate_constraints(cs.clone())
        .map_err(|e| ZkError::Unsatisfiable(format!("{e}")))?;

    let ok = cs.is_satisfied().map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        let which = cs
            .which_is_unsatisfied()
            .map_err(|e| ZkError::Ark(format!("{e}")))?
            .unwrap_or_else(|| "unknown constraint".to_string());
        return Err(ZkError::Unsatisfiable(which));
    }
    Ok(())
}

/// Generate a Groth16 keypair for a claim circuit.
pub fn setup_keys<C: ClaimCircuit>(
    rng: &mut impl RngCore,
) -> Result<(ProvingKey<Bn254>, VerifyingKey<Bn254>), ZkError> {
    let pk = Groth16::<Bn254>::generate_random_parameters_with_reduction(C::placeholder(), rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    let vk = pk.vk.clone();
    Ok((pk, vk))
}

/// Prove a claim, returning the proof and its public inputs.
pub fn prove_claim<C: ClaimCircuit>(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    circuit: C,
) -> Result<(Proof<Bn254>, Vec<Fr>), ZkError> {
    check_satisfied(circuit.clone())?;
    let public_inputs = circuit.public_inputs();

    let proof = Groth16::<Bn254>::create_random_proof_with_reduction(circuit, pk, rng)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;

    Ok((proof, public_inputs))
}

/// Prove a claim and wrap it in the JSON proof envelope.
pub fn prove_claim_envelope<C: ClaimCircuit>(
    rng: &mut impl RngCore,
    pk: &ProvingKey<Bn254>,
    circuit: C,
) -> Result<ZkProof, ZkError> {
    let (proof, public_inputs) = prove_claim(rng, pk, circuit)?;
    Ok(ZkProof::from_groth16(&proof, &public_inputs))
}

pub fn verify_proof(
    vk: &VerifyingKey<Bn254>,
    proof: &Proof<Bn254>,
    public_inputs: &[Fr],
) -> Result<(), ZkError> {
    if public_inputs.len() + 1 != vk.gamma_abc_g1.len() {
        return Err(ZkError::InvalidInputLength {
            what: "public inputs",
            expected: vk.gamma_abc_g1.len().saturating_sub(1),
            got: public_inputs.len(),
        });
    }

    let pvk = prepare_verifying_key(vk);
    let ok = Groth16::<Bn254>::verify_proof(&pvk, proof, public_inputs)
        .map_err(|e| ZkError::Ark(format!("{e}")))?;
    if !ok {
        return Err(ZkError::VerificationFailed);
    }
    Ok(())
}

/// Verify a proof envelope against its own public signals.
pub fn verify_envelope(vk: &VerifyingKey<Bn254>, envelope: &ZkProof) -> Result<(), ZkError> {
    let proof = envelope.to_groth16()?;
    let public_inputs = envelope.public_inputs()?;
    verify_proof(vk, &proof, &public_inputs)
}

pub fn serialize_pk(pk: &ProvingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    pk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_pk(bytes: &[u8]) -> Result<ProvingKey<Bn254>, ZkError> {
    ProvingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_vk(vk: &VerifyingKey<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    vk.serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_vk(bytes: &[u8]) -> Result<VerifyingKey<Bn254>, ZkError> {
    VerifyingKey::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}

pub fn serialize_proof(proof: &Proof<Bn254>) -> Result<Vec<u8>, ZkError> {
    let mut out = Vec::new();
    proof
        .serialize_compressed(&mut out)
        .map_err(|e| ZkError::Serialization(format!("{e}")))?;
    Ok(out)
}

pub fn deserialize_proof(bytes: &[u8]) -> Result<Proof<Bn254>, ZkError> {
    Proof::<Bn254>::deserialize_compressed(bytes)
        .map_err(|e| ZkError::Serialization(format!("{e}")))
}
