//! Multi-repository aggregation with differential-privacy noise.
//!
//! Raw per-repository facts are accumulated, summed and scored exactly, then every disclosed
//! number receives independent Laplace noise before it leaves this module. Nothing here
//! touches the network or storage.

use crate::privacy::{NoiseSource, PrivacyParameters};
use crate::registry::Address;
use devcred_zk::constants::{ACTIVITY_WEEKS, SECONDS_PER_WEEK};
use devcred_zk::gadgets::consistency_score_value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::info;

/// Share of a repository's LOC credited to its primary language when it has secondaries.
const PRIMARY_LANGUAGE_SHARE: f64 = 0.7;

/// Languages at equal share that score a full 100 on diversity.
const DIVERSITY_REFERENCE_LANGUAGES: f64 = 8.0;

/// Average collaborator count that saturates the collaboration blend.
const COLLABORATOR_SATURATION: f64 = 10.0;

#[derive(Debug, Error, PartialEq)]
pub enum AggregationError {
    #[error("insufficient data in repository '{repository}': {reason}")]
    InsufficientData { repository: String, reason: String },

    #[error("insufficient repositories: need at least {required}, got {actual}")]
    InsufficientRepositories { required: usize, actual: usize },

    #[error("invalid privacy parameters: {0}")]
    InvalidPrivacyParameters(String),

    #[error("total {field} overflows across repositories")]
    TotalOverflow { field: &'static str },
}

/// Per-repository facts as supplied by the stats provider.
///
/// Counts are signed so malformed upstream data can be rejected instead of wrapping.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRepositoryStats {
    pub repository: String,
    pub commits: i64,
    pub lines_changed: i64,
    #[serde(default)]
    pub files_changed: Vec<String>,
    pub collaborators: i64,
    pub is_owner: bool,
    pub primary_language: String,
    #[serde(default)]
    pub secondary_languages: Vec<String>,
    /// Unix seconds of individual commits.
    #[serde(default)]
    pub activity_timestamps: Vec<i64>,
}

impl RawRepositoryStats {
    fn validate(&self) -> Result<(), AggregationError> {
        let fail = |reason: &str| {
            Err(AggregationError::InsufficientData {
                repository: self.repository.clone(),
                reason: reason.to_string(),
            })
        };

        if self.repository.trim().is_empty() {
            return fail("empty repository identity");
        }
        if self.commits < 0 {
            return fail("negative commit count");
        }
        if self.lines_changed < 0 {
            return fail("negative line count");
        }
        if self.collaborators < 0 {
            return fail("negative collaborator count");
        }
        if self.activity_timestamps.iter().any(|t| *t < 0) {
            return fail("negative activity timestamp");
        }
        Ok(())
    }

    /// Sole owner: owns the repository and nobody else contributes.
    fn is_sole_owner(&self) -> bool {
        self.is_owner && self.collaborators <= 1
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedCredential {
    pub subject_address: Address,
    pub total_repositories: u64,
    pub total_commits: u64,
    #[serde(rename = "totalLOC")]
    pub total_loc: u64,
    pub language_proficiency: BTreeMap<String, u64>,
    pub collaboration_score: u64,
    pub diversity_score: u64,
    pub consistency_score: u64,
    pub is_not_owner_of_all: bool,
    pub epsilon: f64,
}

/// Exact (un-noised) aggregate. Never disclosed directly.
#[derive(Clone, Debug, PartialEq)]
pub struct ExactAggregate {
    pub total_repositories: u64,
    pub total_commits: u64,
    pub total_loc: u64,
    pub language_proficiency: BTreeMap<String, f64>,
    pub collaboration_score: f64,
    pub diversity_score: f64,
    pub consistency_score: u64,
    pub is_not_owner_of_all: bool,
}

pub struct MultiRepoAggregator {
    params: PrivacyParameters,
    noise: Box<dyn NoiseSource>,
    records: Vec<RawRepositoryStats>,
}

impl MultiRepoAggregator {
    pub fn new(params: PrivacyParameters, noise: impl NoiseSource + 'static) -> Self {
        Self { params, noise: Box::new(noise), records: Vec::new() }
    }

    pub fn params(&self) -> &PrivacyParameters {
        &self.params
    }

    pub fn records(&self) -> &[RawRepositoryStats] {
        &self.records
    }

    pub fn add_repository(&mut self, record: RawRepositoryStats) -> Result<(), AggregationError> {
        record.validate()?;
        self.records.push(record);
        Ok(())
    }

    fn ensure_enough(&self) -> Result<(), AggregationError> {
        if self.records.len() < self.params.min_repositories() {
            return Err(AggregationError::InsufficientRepositories {
                required: self.params.min_repositories(),
                actual: self.records.len(),
            });
        }
        Ok(())
    }

    pub fn exact_aggregate(&self) -> Result<ExactAggregate, AggregationError> {
        self.ensure_enough()?;
        exact_aggregate(&self.records)
    }

    /// Aggregate the working set and disclose noised, rounded and clamped values.
    pub fn generate_aggregated_credential(
        &mut self,
        subject: &Address,
    ) -> Result<AggregatedCredential, AggregationError> {
        let exact = self.exact_aggregate()?;
        let scale = self.params.noise_scale();

        // Draw order is fixed so a seeded source reproduces the same output.
        let total_repositories = self.disclose(exact.total_repositories as f64, scale, None);
        let total_commits = self.disclose(exact.total_commits as f64, scale, None);
        let total_loc = self.disclose(exact.total_loc as f64, scale, None);
        let mut language_proficiency = BTreeMap::new();
        for (language, share) in &exact.language_proficiency {
            language_proficiency.insert(language.clone(), self.disclose(*share, scale, Some(100)));
        }
        let collaboration_score = self.disclose(exact.collaboration_score, scale, Some(100));
        let diversity_score = self.disclose(exact.diversity_score, scale, Some(100));
        let consistency_score = self.disclose(exact.consistency_score as f64, scale, Some(100));

        info!(
            repositories = self.records.len(),
            languages = language_proficiency.len(),
            epsilon = self.params.epsilon(),
            "aggregated credential"
        );

        Ok(AggregatedCredential {
            subject_address: subject.clone(),
            total_repositories,
            total_commits,
            total_loc,
            language_proficiency,
            collaboration_score,
            diversity_score,
            consistency_score,
            is_not_owner_of_all: exact.is_not_owner_of_all,
            epsilon: self.params.epsilon(),
        })
    }

    fn disclose(&mut self, value: f64, scale: f64, max: Option<u64>) -> u64 {
        let noisy = (value + self.noise.laplace(scale)).round().max(0.0);
        let noisy = if noisy >= u64::MAX as f64 { u64::MAX } else { noisy as u64 };
        match max {
            Some(max) => noisy.min(max),
            None => noisy,
        }
    }
}

fn checked_total(
    records: &[RawRepositoryStats],
    field: &'static str,
    count: impl Fn(&RawRepositoryStats) -> i64,
) -> Result<u64, AggregationError> {
    records.iter().try_fold(0u64, |acc, r| {
        acc.checked_add(count(r).max(0) as u64)
            .ok_or(AggregationError::TotalOverflow { field })
    })
}

pub fn exact_aggregate(records: &[RawRepositoryStats]) -> Result<ExactAggregate, AggregationError> {
    let total_commits = checked_total(records, "commits", |r| r.commits)?;
    let total_loc = checked_total(records, "lines_changed", |r| r.lines_changed)?;

    let language_loc = language_distribution(records);
    let attributed: f64 = language_loc.values().sum();
    let language_proficiency = language_loc
        .iter()
        .map(|(lang, loc)| {
            let share = if attributed > 0.0 { 100.0 * loc / attributed } else { 0.0 };
            (lang.clone(), share)
        })
        .collect();

    Ok(ExactAggregate {
        total_repositories: records.len() as u64,
        total_commits,
        total_loc,
        language_proficiency,
        collaboration_score: collaboration_score(records),
        diversity_score: diversity_score(&language_loc),
        consistency_score: consistency_score_value(&activity_histogram(records, ACTIVITY_WEEKS)),
        is_not_owner_of_all: records.iter().any(|r| !r.is_owner),
    })
}

/// LOC attributed per language: 70% primary, 30% split across secondaries.
fn language_distribution(records: &[RawRepositoryStats]) -> BTreeMap<String, f64> {
    let mut out: BTreeMap<String, f64> = BTreeMap::new();
    for r in records {
        let loc = r.lines_changed as f64;
        let primary = r.primary_language.trim();
        let secondaries: Vec<&str> = r
            .secondary_languages
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && *l != primary)
            .collect();

        if primary.is_empty() {
            continue;
        }
        if secondaries.is_empty() {
            *out.entry(primary.to_string()).or_default() += loc;
            continue;
        }

        *out.entry(primary.to_string()).or_default() += loc * PRIMARY_LANGUAGE_SHARE;
        let each = loc * (1.0 - PRIMARY_LANGUAGE_SHARE) / secondaries.len() as f64;
        for lang in secondaries {
            *out.entry(lang.to_string()).or_default() += each;
        }
    }
    out
}

/// Shannon entropy of the language mix, scaled so eight equal languages score 100.
fn diversity_score(language_loc: &BTreeMap<String, f64>) -> f64 {
    let total: f64 = language_loc.values().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let entropy: f64 = language_loc
        .values()
        .filter(|loc| **loc > 0.0)
        .map(|loc| {
            let p = loc / total;
            -p * p.log2()
        })
        .sum();
    (100.0 * entropy / DIVERSITY_REFERENCE_LANGUAGES.log2()).clamp(0.0, 100.0)
}

/// `100 * (0.6 * f + 0.4 * min(avg_collaborators / 10, 1))`, `f` = share not solely owned.
fn collaboration_score(records: &[RawRepositoryStats]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    let n = records.len() as f64;
    let shared = records.iter().filter(|r| !r.is_sole_owner()).count() as f64 / n;
    let avg = records.iter().map(|r| r.collaborators as f64).sum::<f64>() / n;
    (100.0 * (0.6 * shared + 0.4 * (avg / COLLABORATOR_SATURATION).min(1.0))).clamp(0.0, 100.0)
}

/// Commits per week over the `weeks` weeks ending at the latest activity, oldest first.
pub fn activity_histogram(records: &[RawRepositoryStats], weeks: usize) -> Vec<u64> {
    let mut histogram = vec![0u64; weeks];
    let Some(latest) = records.iter().flat_map(|r| r.activity_timestamps.iter()).max().copied() else {
        return histogram;
    };

    for ts in records.iter().flat_map(|r| r.activity_timestamps.iter()) {
        let age_weeks = ((latest - ts) as u64 / SECONDS_PER_WEEK) as usize;
        if age_weeks < weeks {
            histogram[weeks - 1 - age_weeks] += 1;
        }
    }
    histogram
}
