//! Crate-wide constants used by the gadgets, claim circuits and host-side orchestration.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::poseidon::{find_poseidon_ark_and_mds, PoseidonConfig};
use ark_ff::PrimeField;

/// Maximum number of repository slots in the aggregate claim circuit.
///
/// Subjects with fewer repositories are padded with inactive slots; subjects with more are
/// truncated to their most active repositories by the issuer.
pub const MAX_REPOSITORIES: usize = 8;

/// Number of trailing weeks in the activity histogram used for consistency scoring.
pub const ACTIVITY_WEEKS: usize = 12;

/// Seconds per histogram bucket.
pub const SECONDS_PER_WEEK: u64 = 7 * 24 * 60 * 60;

/// Bit width for per-repository commit counts and lines-of-code values.
pub const COUNT_BITS: usize = 32;

/// Bit width for collaborator counts and weekly activity buckets.
pub const SMALL_COUNT_BITS: usize = 16;

/// Bit width for totals (sums of up to `MAX_REPOSITORIES` 32-bit counts).
pub const TOTAL_BITS: usize = 40;

/// Bit width used for values that live in unix-seconds or generic 64-bit ranges.
pub const WIDE_BITS: usize = 64;

/// Bit width for divisions inside the consistency score (`100 * mean^2` fits easily).
pub const DIVISION_BITS: usize = 48;

/// Largest bit width `SafeDivision` accepts; its witness hint is computed in `u128`.
pub const MAX_DIVISION_BITS: usize = 64;

/// Scores are integers in `[0, MAX_SCORE]`.
pub const MAX_SCORE: u64 = 100;

// Poseidon sponge configuration.
//
// Width-3 sponge (rate=2, capacity=1); the same instantiation backs native commitments and the
// in-circuit gadget so both sides agree on every constant.
pub const POSEIDON_RATE: usize = 2;
pub const POSEIDON_CAPACITY: usize = 1;

pub const POSEIDON_FULL_ROUNDS: usize = 8;
pub const POSEIDON_PARTIAL_ROUNDS: usize = 57;

/// Poseidon S-box exponent (alpha).
pub const POSEIDON_ALPHA: u64 = 5;

/// Deterministically derive Poseidon parameters for BN254::Fr.
pub fn poseidon_config() -> PoseidonConfig<Fr> {
    let prime_bits = Fr::MODULUS_BIT_SIZE as u64;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        POSEIDON_RATE,
        POSEIDON_FULL_ROUNDS as u64,
        POSEIDON_PARTIAL_ROUNDS as u64,
        0,
    );

    PoseidonConfig::new(
        POSEIDON_FULL_ROUNDS,
        POSEIDON_PARTIAL_ROUNDS,
        POSEIDON_ALPHA,
        mds,
        ark,
        POSEIDON_RATE,
        POSEIDON_CAPACITY,
    )
}
