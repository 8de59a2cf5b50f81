//! Differential-privacy parameters and Laplace noise.

use crate::aggregator::AggregationError;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Requested privacy level. Larger epsilon means less noise.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyLevel {
    Minimal,
    #[default]
    Standard,
    High,
    Maximum,
}

impl PrivacyLevel {
    pub fn epsilon(&self) -> f64 {
        match self {
            PrivacyLevel::Minimal => 10.0,
            PrivacyLevel::Standard => 1.0,
            PrivacyLevel::High => 0.1,
            PrivacyLevel::Maximum => 0.01,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyLevel::Minimal => "minimal",
            PrivacyLevel::Standard => "standard",
            PrivacyLevel::High => "high",
            PrivacyLevel::Maximum => "maximum",
        }
    }
}

impl fmt::Display for PrivacyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(PrivacyLevel::Minimal),
            "standard" => Ok(PrivacyLevel::Standard),
            "high" => Ok(PrivacyLevel::High),
            "maximum" => Ok(PrivacyLevel::Maximum),
            other => Err(format!("unknown privacy level: {other}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacyParameters {
    epsilon: f64,
    min_repositories: usize,
}

impl PrivacyParameters {
    pub fn new(epsilon: f64, min_repositories: usize) -> Result<Self, AggregationError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(AggregationError::InvalidPrivacyParameters(format!(
                "epsilon must be a positive finite number, got {epsilon}"
            )));
        }
        if min_repositories == 0 {
            return Err(AggregationError::InvalidPrivacyParameters(
                "minRepositories must be at least 1".to_string(),
            ));
        }
        Ok(Self { epsilon, min_repositories })
    }

    pub fn for_level(level: PrivacyLevel, min_repositories: usize) -> Result<Self, AggregationError> {
        Self::new(level.epsilon(), min_repositories)
    }

    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    pub fn min_repositories(&self) -> usize {
        self.min_repositories
    }

    /// Laplace scale applied to every disclosed aggregate.
    pub fn noise_scale(&self) -> f64 {
        1.0 / self.epsilon
    }
}

/// Source of randomness for privacy noise.
///
/// Implementations only supply uniform draws; the Laplace transform is shared so any seeded
/// or scripted source reproduces identical noise.
pub trait NoiseSource: Send {
    /// A uniform draw from the open interval (0, 1).
    fn uniform(&mut self) -> f64;

    /// Zero-mean Laplace draw with the given scale, via the inverse CDF.
    fn laplace(&mut self, scale: f64) -> f64 {
        let u = self.uniform() - 0.5;
        -scale * u.signum() * (1.0 - 2.0 * u.abs()).ln()
    }
}

/// ChaCha20-backed noise. Seed it for reproducible aggregation.
pub struct LaplaceNoise {
    rng: ChaCha20Rng,
}

impl LaplaceNoise {
    pub fn seeded(seed: u64) -> Self {
        Self { rng: ChaCha20Rng::seed_from_u64(seed) }
    }

    pub fn from_entropy() -> Self {
        Self { rng: ChaCha20Rng::from_entropy() }
    }
}

impl NoiseSource for LaplaceNoise {
    fn uniform(&mut self) -> f64 {
        loop {
            // 53 random mantissa bits; zero is redrawn so the interval stays open.
            let u = (self.rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
            if u > 0.0 {
                return u;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(f64);

    impl NoiseSource for Fixed {
        fn uniform(&mut self) -> f64 {
            self.0
        }
    }

    #[test]
    fn level_epsilons_follow_the_documented_mapping() {
        assert_eq!(PrivacyLevel::Minimal.epsilon(), 10.0);
        assert_eq!(PrivacyLevel::Standard.epsilon(), 1.0);
        assert_eq!(PrivacyLevel::High.epsilon(), 0.1);
        assert_eq!(PrivacyLevel::Maximum.epsilon(), 0.01);
        assert_eq!("maximum".parse::<PrivacyLevel>().unwrap(), PrivacyLevel::Maximum);
        assert!("extreme".parse::<PrivacyLevel>().is_err());
    }

    #[test]
    fn parameters_reject_bad_values() {
        assert!(PrivacyParameters::new(0.0, 1).is_err());
        assert!(PrivacyParameters::new(-1.0, 1).is_err());
        assert!(PrivacyParameters::new(f64::NAN, 1).is_err());
        assert!(PrivacyParameters::new(f64::INFINITY, 1).is_err());
        assert!(PrivacyParameters::new(1.0, 0).is_err());
        assert_eq!(PrivacyParameters::new(4.0, 2).unwrap().noise_scale(), 0.25);
    }

    #[test]
    fn laplace_inverse_cdf_is_symmetric() {
        let ln2 = std::f64::consts::LN_2;
        assert!((Fixed(0.25).laplace(2.0) + 2.0 * ln2).abs() < 1e-12);
        assert!((Fixed(0.75).laplace(2.0) - 2.0 * ln2).abs() < 1e-12);
        assert_eq!(Fixed(0.5).laplace(2.0), 0.0);
    }

    #[test]
    fn seeded_noise_is_reproducible() {
        let mut a = LaplaceNoise::seeded(42);
        let mut b = LaplaceNoise::seeded(42);
        for _ in 0..16 {
            let u = a.uniform();
            assert!(u > 0.0 && u < 1.0);
            assert_eq!(u, b.uniform());
        }
    }

    #[test]
    fn empirical_scale_tracks_epsilon() {
        let mut noise = LaplaceNoise::seeded(7);
        let draws = 20_000;
        let mean_abs = |noise: &mut LaplaceNoise, scale: f64| {
            (0..draws).map(|_| noise.laplace(scale).abs()).sum::<f64>() / draws as f64
        };

        // E|X| = scale for a Laplace distribution.
        let wide = mean_abs(&mut noise, 100.0);
        let narrow = mean_abs(&mut noise, 0.1);
        assert!((wide - 100.0).abs() < 5.0, "wide = {wide}");
        assert!((narrow - 0.1).abs() < 0.005, "narrow = {narrow}");
    }
}
