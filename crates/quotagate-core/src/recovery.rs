//! Recovery Service
//!
//! Moves a premium entitlement onto a new identity given its recovery key.
//! The key stays bound to the purchase and keeps working until the
//! purchase expires; each restore re-binds it to the newest identity.
//! Only that purchase moves: other purchases bound to the previous holder
//! keep it premium.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::binding;
use crate::config::RecoveryPolicy;
use crate::error::{RecoveryError, StoreError};
use crate::keys::KeyPolicy;
use crate::ledger::{self, Ledger};

/// Outcome of a successful restore
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredEntitlement {
    /// Identity now holding premium
    pub identity: String,
    /// Identity the key was bound to before this restore
    pub previous_identity: String,
    pub expires_on: NaiveDate,
}

pub struct RecoveryService {
    ledger: Arc<dyn Ledger>,
    keys: KeyPolicy,
    policy: RecoveryPolicy,
}

impl RecoveryService {
    pub fn new(ledger: Arc<dyn Ledger>, keys: KeyPolicy, policy: RecoveryPolicy) -> Self {
        Self { ledger, keys, policy }
    }

    /// Restore premium onto `new_identity`.
    ///
    /// Unknown keys, missing holders and expired entitlements leave the
    /// ledger untouched.
    pub async fn restore(
        &self,
        new_identity: &str,
        recovery_key: &str,
        now: DateTime<Utc>,
    ) -> Result<RestoredEntitlement, RecoveryError> {
        let new_identity = new_identity.trim();
        if new_identity.is_empty() {
            return Err(RecoveryError::Validation("new user id is required".into()));
        }
        if recovery_key.trim().is_empty() {
            return Err(RecoveryError::Validation("recovery key is required".into()));
        }
        let Some(key) = self.keys.parse(recovery_key) else {
            debug!(identity = new_identity, "malformed recovery key");
            return Err(RecoveryError::Validation("recovery key is malformed".into()));
        };

        let today = now.date_naive();
        let identity = new_identity.to_string();
        let policy = self.policy;

        let restored = ledger::transact(self.ledger.clone(), move |tx| -> Result<_, RecoveryError> {
            let mut record = tx.recovery_by_key(&key)?.ok_or(RecoveryError::NotFound)?;
            if tx.identity(&record.bound_identity)?.is_none() {
                return Err(RecoveryError::NotFound);
            }

            let expires_on = record.expires_on;
            if expires_on < today {
                return Err(RecoveryError::Expired { expired_on: expires_on });
            }

            let new_expires_on = carry_over(expires_on, now)?;
            record.expires_on = new_expires_on;
            let previous_identity = std::mem::replace(&mut record.bound_identity, identity.clone());
            tx.put_recovery(&record)?;

            if policy == RecoveryPolicy::Transfer && previous_identity != identity {
                binding::release(tx, &previous_identity)?;
            }
            binding::entitle(tx, &identity, today, policy)?;

            Ok(RestoredEntitlement {
                identity,
                previous_identity,
                expires_on: new_expires_on,
            })
        })
        .await?;

        info!(
            identity = %restored.identity,
            previous = %restored.previous_identity,
            expires_on = %restored.expires_on,
            "entitlement restored"
        );
        Ok(restored)
    }
}

/// Remaining time runs to the start of the expiration day in UTC and is
/// re-applied from `now`, so the new holder gets the same last day.
fn carry_over(expires_on: NaiveDate, now: DateTime<Utc>) -> Result<NaiveDate, RecoveryError> {
    let start = expires_on
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("expiration {expires_on} has no midnight")))?;
    let remaining: Duration = Utc.from_utc_datetime(&start) - now;
    Ok((now + remaining).date_naive())
}
