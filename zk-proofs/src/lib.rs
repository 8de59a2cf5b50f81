//! ZK layer for privacy-preserving developer credentials.
//!
//! This crate contains:
//! - Composable constraint gadgets (comparisons, boolean logic, safe division, statistics).
//! - Claim circuits built from them: range claims, signed contributions, aggregate activity.
//! - Canonical input generation for the contribution circuit.
//! - Groth16 prover + verifier orchestration and the JSON proof envelope.

pub mod circuit;
pub mod constants;
pub mod error;
pub mod gadgets;
pub mod groth16;
pub mod hash;
pub mod inputs;
pub mod types;
