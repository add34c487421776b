//! Gate configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. optional config file (TOML, YAML or JSON, by extension)
//! 3. environment, `QUOTAGATE_<SECTION>__<KEY>` (e.g. `QUOTAGATE_QUOTA__FREE_DAILY_LIMIT=10`)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::keys::{KeyPolicy, DEFAULT_ALPHABET, DEFAULT_LENGTH};
use crate::verifier::PlayStoreConfig;

/// Shortest key length accepted by validation
pub const MIN_KEY_LENGTH: usize = 6;

/// Smallest key alphabet accepted by validation
pub const MIN_ALPHABET_SIZE: usize = 16;

/// Longest unverified grant accepted by validation
pub const MAX_GRANT_DAYS: u32 = 3660;

/// Complete gate configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub quota: QuotaConfig,
    pub recovery: RecoveryConfig,
    pub billing: BillingConfig,
    pub storage: StorageConfig,
    pub server: ServerConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaConfig {
    /// Requests per calendar day for free identities
    pub free_daily_limit: u32,
    /// Requests per calendar day for premium identities; `None` bypasses the counter
    pub premium_daily_limit: Option<u32>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            free_daily_limit: 5,
            premium_daily_limit: None,
        }
    }
}

/// What happens to the previously bound identity when a key moves
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Previous identity loses premium; one premium identity per purchase
    #[default]
    Transfer,
    /// Previous identity keeps premium until its own expiration
    Share,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub key_length: usize,
    pub key_alphabet: String,
    /// Fresh draws tried when a key collides
    pub max_key_attempts: u32,
    pub policy: RecoveryPolicy,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            key_length: DEFAULT_LENGTH,
            key_alphabet: DEFAULT_ALPHABET.to_string(),
            max_key_attempts: 5,
            policy: RecoveryPolicy::Transfer,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingProvider {
    #[default]
    PlayStore,
    /// Grant `fallback_grant_days` without asking anyone; opt-in only
    FixedTerm,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    pub provider: BillingProvider,
    pub fallback_grant_days: u32,
    pub play_store: PlayStoreConfig,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            provider: BillingProvider::PlayStore,
            fallback_grant_days: 30,
            play_store: PlayStoreConfig::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub sqlite_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite_path: PathBuf::from("quotagate.db"),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl GateConfig {
    /// Load from an optional file plus `QUOTAGATE_*` environment variables
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("QUOTAGATE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: GateConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would break quota or key invariants
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.quota.free_daily_limit == 0 {
            return Err(ConfigError::Invalid("quota.free_daily_limit must be at least 1".into()));
        }
        if self.quota.premium_daily_limit == Some(0) {
            return Err(ConfigError::Invalid("quota.premium_daily_limit must be at least 1".into()));
        }
        if self.recovery.key_length < MIN_KEY_LENGTH {
            return Err(ConfigError::Invalid(format!(
                "recovery.key_length must be at least {MIN_KEY_LENGTH}"
            )));
        }
        let policy = self.key_policy()?;
        if policy.alphabet_size() < MIN_ALPHABET_SIZE {
            return Err(ConfigError::Invalid(format!(
                "recovery.key_alphabet needs at least {MIN_ALPHABET_SIZE} distinct characters"
            )));
        }
        if self.recovery.max_key_attempts == 0 {
            return Err(ConfigError::Invalid("recovery.max_key_attempts must be at least 1".into()));
        }
        if self.billing.provider == BillingProvider::FixedTerm
            && !(1..=MAX_GRANT_DAYS).contains(&self.billing.fallback_grant_days)
        {
            return Err(ConfigError::Invalid(format!(
                "billing.fallback_grant_days must be between 1 and {MAX_GRANT_DAYS}"
            )));
        }
        Ok(())
    }

    /// Key policy described by the `recovery` section
    pub fn key_policy(&self) -> Result<KeyPolicy, ConfigError> {
        KeyPolicy::new(self.recovery.key_length, &self.recovery.key_alphabet)
            .ok_or_else(|| ConfigError::Invalid("recovery key length and alphabet must be non-empty".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GateConfig::default();
        config.validate().unwrap();

        assert_eq!(config.quota.free_daily_limit, 5);
        assert_eq!(config.quota.premium_daily_limit, None);
        assert_eq!(config.recovery.key_length, 8);
        assert_eq!(config.recovery.policy, RecoveryPolicy::Transfer);
        assert_eq!(config.billing.provider, BillingProvider::PlayStore);
        assert_eq!(config.billing.fallback_grant_days, 30);
    }

    #[test]
    fn test_fixed_term_grant_is_bounded() {
        let mut config = GateConfig::default();
        config.billing.provider = BillingProvider::FixedTerm;
        config.billing.fallback_grant_days = MAX_GRANT_DAYS;
        config.validate().unwrap();

        config.billing.fallback_grant_days = MAX_GRANT_DAYS + 1;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.billing.fallback_grant_days = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_weak_keys() {
        let mut config = GateConfig::default();
        config.recovery.key_length = 4;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = GateConfig::default();
        config.recovery.key_alphabet = "0123456789".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_zero_limits() {
        let mut config = GateConfig::default();
        config.quota.free_daily_limit = 0;
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.quota.premium_daily_limit = Some(0);
        assert!(config.validate().is_err());

        let mut config = GateConfig::default();
        config.recovery.max_key_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("quotagate-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("gate.toml");
        std::fs::write(
            &path,
            r#"
[quota]
free_daily_limit = 10

[recovery]
policy = "share"

[storage]
backend = "memory"
"#,
        )
        .unwrap();

        let config = GateConfig::load(path.to_str()).unwrap();
        assert_eq!(config.quota.free_daily_limit, 10);
        assert_eq!(config.recovery.policy, RecoveryPolicy::Share);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        // untouched sections keep defaults
        assert_eq!(config.recovery.key_length, 8);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = GateConfig::load(Some("/nonexistent/quotagate")).unwrap();
        assert_eq!(config.quota.free_daily_limit, 5);
    }
}
