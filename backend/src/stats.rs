//! Boundary to the repository-data fetch layer.

use crate::aggregator::RawRepositoryStats;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("no repository statistics for '{0}'")]
    UnknownUser(String),

    #[error("failed to load statistics: {0}")]
    Load(String),
}

/// Supplies raw per-repository facts for a source-hosting identity.
#[async_trait]
pub trait StatsProvider: Send + Sync {
    async fn repositories(
        &self,
        username: &str,
        include_private: bool,
    ) -> Result<Vec<RawRepositoryStats>, StatsError>;
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FixtureRepository {
    #[serde(default)]
    private: bool,
    #[serde(flatten)]
    stats: RawRepositoryStats,
}

/// Static statistics keyed by username, loaded from JSON:
/// `{ "<username>": [ { "repository": ..., "private": false, ... }, ... ] }`.
#[derive(Clone, Debug, Default)]
pub struct FixtureStatsProvider {
    users: HashMap<String, Vec<FixtureRepository>>,
}

impl FixtureStatsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, username: &str, repositories: Vec<RawRepositoryStats>) -> Self {
        self.users.insert(
            username.to_ascii_lowercase(),
            repositories.into_iter().map(|stats| FixtureRepository { private: false, stats }).collect(),
        );
        self
    }

    pub fn from_json(json: &str) -> Result<Self, StatsError> {
        let users: HashMap<String, Vec<FixtureRepository>> =
            serde_json::from_str(json).map_err(|e| StatsError::Load(e.to_string()))?;
        Ok(Self {
            users: users.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, StatsError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StatsError::Load(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

#[async_trait]
impl StatsProvider for FixtureStatsProvider {
    async fn repositories(
        &self,
        username: &str,
        include_private: bool,
    ) -> Result<Vec<RawRepositoryStats>, StatsError> {
        let repos = self
            .users
            .get(&username.to_ascii_lowercase())
            .ok_or_else(|| StatsError::UnknownUser(username.to_string()))?;

        Ok(repos
            .iter()
            .filter(|r| include_private || !r.private)
            .map(|r| r.stats.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"{
        "Octocat": [
            {"repository": "octocat/hello", "commits": 12, "linesChanged": 900, "collaborators": 1,
             "isOwner": true, "primaryLanguage": "Rust"},
            {"repository": "octocat/secret", "private": true, "commits": 3, "linesChanged": 40,
             "collaborators": 2, "isOwner": true, "primaryLanguage": "Go",
             "secondaryLanguages": ["Shell"], "activityTimestamps": [1700000000]}
        ]
    }"#;

    #[tokio::test]
    async fn private_repositories_are_opt_in() {
        let provider = FixtureStatsProvider::from_json(FIXTURE).unwrap();
        assert_eq!(provider.repositories("octocat", false).await.unwrap().len(), 1);

        let all = provider.repositories("OCTOCAT", true).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].secondary_languages, vec!["Shell".to_string()]);
        assert_eq!(all[1].activity_timestamps, vec![1_700_000_000]);
    }

    #[tokio::test]
    async fn unknown_users_and_bad_json_fail() {
        let provider = FixtureStatsProvider::from_json(FIXTURE).unwrap();
        assert!(matches!(provider.repositories("nobody", true).await, Err(StatsError::UnknownUser(_))));
        assert!(matches!(FixtureStatsProvider::from_json("[1,2"), Err(StatsError::Load(_))));
    }
}
