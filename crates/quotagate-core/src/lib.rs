//! QuotaGate
//!
//! Daily usage quotas, purchase-backed premium entitlements and
//! recovery keys that carry an entitlement to a new device.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           QUOTAGATE                             │
//! │                                                                 │
//! │   usage request ──► QuotaEngine ───────────┐                    │
//! │                                             │                   │
//! │   purchase ───────► EntitlementService ─────┤                   │
//! │                       │                     ▼                   │
//! │                       ▼              ┌──────────────┐           │
//! │               BillingVerifier        │    Ledger    │           │
//! │               (Play / fixed term)    │  identities  │           │
//! │                                      │  recovery    │           │
//! │   recovery key ──► RecoveryService ─►└──────────────┘           │
//! │                                       memory | sqlite           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod binding;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod quota;
pub mod records;
pub mod recovery;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;
use tracing::{info, warn};

pub use config::{GateConfig, RecoveryPolicy};
pub use entitlement::{Activation, EntitlementService};
pub use error::{ConfigError, EntitlementError, QuotaError, RecoveryError, StoreError, VerifierError};
pub use keys::{KeyPolicy, RecoveryKey};
pub use ledger::{InMemoryLedger, Ledger, SqliteLedger};
pub use quota::{Admission, DenyReason, QuotaEngine, QuotaLimits, Tier, UsageReport};
pub use records::{IdentityRecord, RecoveryRecord};
pub use recovery::{RecoveryService, RestoredEntitlement};
pub use verifier::{BillingVerifier, FixedTermVerifier, PlayStoreVerifier, Verification};

use config::{BillingConfig, BillingProvider, StorageBackend, StorageConfig};

/// All services over one shared ledger
#[derive(Clone)]
pub struct Gate {
    pub quota: Arc<QuotaEngine>,
    pub entitlements: Arc<EntitlementService>,
    pub recovery: Arc<RecoveryService>,
}

impl Gate {
    /// Wire the services over an existing ledger and verifier
    pub fn new(
        config: &GateConfig,
        ledger: Arc<dyn Ledger>,
        verifier: Arc<dyn BillingVerifier>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let keys = config.key_policy()?;
        let limits = QuotaLimits {
            free_daily: config.quota.free_daily_limit,
            premium_daily: config.quota.premium_daily_limit,
        };

        Ok(Self {
            quota: Arc::new(QuotaEngine::new(ledger.clone(), limits)),
            entitlements: Arc::new(EntitlementService::new(
                ledger.clone(),
                verifier,
                keys.clone(),
                config.recovery.max_key_attempts,
                config.recovery.policy,
            )),
            recovery: Arc::new(RecoveryService::new(ledger, keys, config.recovery.policy)),
        })
    }

    /// Build ledger and verifier from configuration, then wire the services
    pub fn from_config(config: &GateConfig) -> Result<Self, ConfigError> {
        let ledger = build_ledger(&config.storage)?;
        let verifier = build_verifier(&config.billing)?;
        Self::new(config, ledger, verifier)
    }
}

/// Open the configured ledger backend
pub fn build_ledger(config: &StorageConfig) -> Result<Arc<dyn Ledger>, ConfigError> {
    match config.backend {
        StorageBackend::Memory => {
            warn!("using in-memory ledger, state is lost on restart");
            Ok(Arc::new(InMemoryLedger::new()))
        }
        StorageBackend::Sqlite => {
            info!(path = %config.sqlite_path.display(), "opening sqlite ledger");
            Ok(Arc::new(SqliteLedger::open(&config.sqlite_path)?))
        }
    }
}

/// Create the configured billing verifier
pub fn build_verifier(config: &BillingConfig) -> Result<Arc<dyn BillingVerifier>, ConfigError> {
    match config.provider {
        BillingProvider::FixedTerm => {
            warn!(
                days = config.fallback_grant_days,
                "fixed-term billing verifier active, purchases are NOT checked with a billing backend"
            );
            Ok(Arc::new(FixedTermVerifier::new(config.fallback_grant_days)))
        }
        BillingProvider::PlayStore => {
            info!(package = %config.play_store.package_name, "using Play Store billing verifier");
            Ok(Arc::new(PlayStoreVerifier::new(&config.play_store)?))
        }
    }
}
