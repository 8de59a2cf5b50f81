//! Issuance service for privacy-preserving developer credentials.
//!
//! Repository statistics are aggregated under differential privacy, proven
//! against claim thresholds with Groth16, and recorded in a credential registry.

pub mod aggregator;
pub mod api;
pub mod config;
pub mod credentials;
pub mod errors;
pub mod issuance;
pub mod models;
pub mod privacy;
pub mod registry;
pub mod state;
pub mod stats;
