//! Entitlement Service
//!
//! Turns a verified purchase into a premium grant plus a recovery key.
//!
//! Activation order:
//! 1. validate input
//! 2. ask the [`BillingVerifier`] (nothing is written if it refuses)
//! 3. one ledger transaction: recovery record upsert with fresh key draws
//!    until one is unique, release of the identity previously holding the
//!    token, then the identity upsert settled from its bound purchases

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use crate::binding;
use crate::config::RecoveryPolicy;
use crate::error::{EntitlementError, StoreError};
use crate::keys::{KeyPolicy, RecoveryKey};
use crate::ledger::{self, Ledger};
use crate::records::RecoveryRecord;
use crate::verifier::BillingVerifier;

/// Result of a successful activation.
///
/// The recovery key is shown to the caller exactly once and cannot be
/// retrieved later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub recovery_key: RecoveryKey,
    pub expires_on: NaiveDate,
}

/// Entitlement service
pub struct EntitlementService {
    ledger: Arc<dyn Ledger>,
    verifier: Arc<dyn BillingVerifier>,
    keys: KeyPolicy,
    max_key_attempts: u32,
    policy: RecoveryPolicy,
}

impl EntitlementService {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        verifier: Arc<dyn BillingVerifier>,
        keys: KeyPolicy,
        max_key_attempts: u32,
        policy: RecoveryPolicy,
    ) -> Self {
        Self {
            ledger,
            verifier,
            keys,
            max_key_attempts: max_key_attempts.max(1),
            policy,
        }
    }

    /// Activate premium for `identity` from a purchase.
    pub async fn activate(
        &self,
        identity: &str,
        purchase_token: &str,
        product_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Activation, EntitlementError> {
        let identity = identity.trim();
        let purchase_token = purchase_token.trim();
        let product_id = product_id.trim();
        for (field, value) in [
            ("user id", identity),
            ("purchase token", purchase_token),
            ("product id", product_id),
        ] {
            if value.is_empty() {
                return Err(EntitlementError::Validation(format!("{field} is required")));
            }
        }

        let today = now.date_naive();
        let verification = self
            .verifier
            .verify(purchase_token, product_id)
            .await
            .map_err(|err| {
                warn!(identity, product_id, verifier = self.verifier.name(), error = %err, "purchase not verified");
                EntitlementError::from(err)
            })?;

        if verification.expires_on < today {
            warn!(identity, product_id, expires_on = %verification.expires_on, "verified purchase already expired");
            return Err(EntitlementError::Verification("purchase already expired".into()));
        }

        let identity = identity.to_string();
        let purchase_token = purchase_token.to_string();
        let product_id = product_id.to_string();
        let expires_on = verification.expires_on;
        let keys = self.keys.clone();
        let max_attempts = self.max_key_attempts;
        let policy = self.policy;

        let (recovery_key, revoked) = ledger::transact(self.ledger.clone(), move |tx| -> Result<_, EntitlementError> {
            let previous = tx.recovery_by_token(&purchase_token)?;

            let mut attempts = 0;
            let recovery_key = loop {
                attempts += 1;
                let record = RecoveryRecord {
                    purchase_token: purchase_token.clone(),
                    product_id: product_id.clone(),
                    recovery_key: keys.generate(),
                    bound_identity: identity.clone(),
                    expires_on,
                };
                match tx.put_recovery(&record) {
                    Ok(()) => break record.recovery_key,
                    Err(StoreError::KeyCollision) if attempts < max_attempts => {
                        warn!(attempts, "recovery key collision, drawing again");
                    }
                    Err(StoreError::KeyCollision) => {
                        return Err(StoreError::KeySpaceExhausted { attempts }.into());
                    }
                    Err(err) => return Err(err.into()),
                }
            };

            // the token is bound to `identity` now; its former holder keeps
            // only what its other purchases entitle
            let mut revoked = None;
            if let Some(previous) = previous {
                if policy == RecoveryPolicy::Transfer
                    && previous.bound_identity != identity
                    && binding::release(tx, &previous.bound_identity)?
                {
                    revoked = Some(previous.bound_identity);
                }
            }

            binding::entitle(tx, &identity, today, policy)?;

            Ok((recovery_key, revoked))
        })
        .await?;

        if let Some(previous) = revoked {
            info!(previous = %previous, "purchase re-activated on another identity, previous holder revoked");
        }
        info!(expires_on = %expires_on, "entitlement activated");

        Ok(Activation {
            recovery_key,
            expires_on,
        })
    }

    /// Whether an activation for this purchase token was already recorded.
    ///
    /// Callers retrying a failed activation should check this first.
    pub async fn is_recorded(&self, purchase_token: &str) -> Result<bool, EntitlementError> {
        let token = purchase_token.trim().to_string();
        if token.is_empty() {
            return Err(EntitlementError::Validation("purchase token is required".into()));
        }
        ledger::transact(self.ledger.clone(), move |tx| {
            Ok::<_, EntitlementError>(tx.recovery_by_token(&token)?.is_some())
        })
        .await
    }
}
