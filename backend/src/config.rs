//! Environment-driven service configuration.

use crate::privacy::PrivacyLevel;
use crate::registry::Address;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub backend_addr: String,
    pub data_dir: PathBuf,
    pub database_url: String,
    pub api_key: String,
    /// Verifier identity the service registers credentials as.
    pub service_address: Address,
    pub min_repositories: usize,
    pub default_privacy_level: PrivacyLevel,
    pub proof_timeout: Duration,
    pub credential_validity: Duration,
    pub stats_fixture_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        fn parsed<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value.trim().parse().map_err(|_| ConfigError::Invalid { key, value })
        }

        let data_dir = PathBuf::from(get("DATA_DIR", "data"));
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| {
            format!("sqlite:{}", data_dir.join("registry.sqlite").to_string_lossy())
        });

        let service_address = Address::new(get("SERVICE_ADDRESS", "0x0000000000000000000000000000000000000001"));
        if !service_address.is_well_formed() || service_address.is_empty() {
            return Err(ConfigError::Invalid { key: "SERVICE_ADDRESS", value: service_address.to_string() });
        }

        let min_repositories: usize = parsed("MIN_REPOSITORIES", get("MIN_REPOSITORIES", "1"))?;
        if min_repositories == 0 {
            return Err(ConfigError::Invalid { key: "MIN_REPOSITORIES", value: "0".to_string() });
        }

        let level = get("DEFAULT_PRIVACY_LEVEL", "standard");
        let default_privacy_level = level
            .parse::<PrivacyLevel>()
            .map_err(|_| ConfigError::Invalid { key: "DEFAULT_PRIVACY_LEVEL", value: level.clone() })?;

        let timeout_secs: u64 = parsed("PROOF_TIMEOUT_SECS", get("PROOF_TIMEOUT_SECS", "120"))?;
        let validity_secs: u64 = parsed("CREDENTIAL_VALIDITY_SECS", get("CREDENTIAL_VALIDITY_SECS", "31536000"))?;

        Ok(Self {
            backend_addr: get("BACKEND_ADDR", "127.0.0.1:8080"),
            data_dir,
            database_url,
            api_key: get("API_KEY", "dev-secret-key"),
            service_address,
            min_repositories,
            default_privacy_level,
            proof_timeout: Duration::from_secs(timeout_secs),
            credential_validity: Duration::from_secs(validity_secs),
            stats_fixture_path: lookup("STATS_FIXTURE_PATH").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let c = config(&[]).unwrap();
        assert_eq!(c.backend_addr, "127.0.0.1:8080");
        assert_eq!(c.database_url, format!("sqlite:{}", PathBuf::from("data").join("registry.sqlite").to_string_lossy()));
        assert_eq!(c.min_repositories, 1);
        assert_eq!(c.default_privacy_level, PrivacyLevel::Standard);
        assert_eq!(c.proof_timeout, Duration::from_secs(120));
        assert_eq!(c.credential_validity, Duration::from_secs(31_536_000));
        assert!(c.stats_fixture_path.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let c = config(&[
            ("DATA_DIR", "/tmp/devcred"),
            ("MIN_REPOSITORIES", "3"),
            ("DEFAULT_PRIVACY_LEVEL", "high"),
            ("SERVICE_ADDRESS", "0x00000000000000000000000000000000000000AA"),
            ("STATS_FIXTURE_PATH", "fixtures/stats.json"),
        ])
        .unwrap();
        assert!(c.database_url.ends_with("registry.sqlite"));
        assert!(c.database_url.starts_with("sqlite:/tmp/devcred"));
        assert_eq!(c.min_repositories, 3);
        assert_eq!(c.default_privacy_level, PrivacyLevel::High);
        assert_eq!(c.service_address.as_str(), "0x00000000000000000000000000000000000000aa");
        assert_eq!(c.stats_fixture_path, Some(PathBuf::from("fixtures/stats.json")));
    }

    #[test]
    fn malformed_values_name_their_key() {
        assert_eq!(
            config(&[("PROOF_TIMEOUT_SECS", "soon")]).unwrap_err(),
            ConfigError::Invalid { key: "PROOF_TIMEOUT_SECS", value: "soon".to_string() }
        );
        assert!(matches!(config(&[("MIN_REPOSITORIES", "0")]), Err(ConfigError::Invalid { key: "MIN_REPOSITORIES", .. })));
        assert!(matches!(config(&[("DEFAULT_PRIVACY_LEVEL", "paranoid")]), Err(ConfigError::Invalid { .. })));
        assert!(matches!(config(&[("SERVICE_ADDRESS", "0x0")]), Err(ConfigError::Invalid { .. })));
    }
}
