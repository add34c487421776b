//! Quota Engine
//!
//! Daily request counter with a premium bypass.
//!
//! ```text
//!   premium active (expires_on >= today) ──► admit, counter untouched
//!   no record                            ──► count = 1, admit
//!   last_request_date != today           ──► count = 1, date = today, admit
//!   count < limit                        ──► count += 1, admit
//!   count >= limit                       ──► deny, nothing written
//! ```
//!
//! The whole decision runs inside one ledger transaction. A ledger failure
//! denies the request.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{QuotaError, StoreError};
use crate::ledger::{self, Ledger};
use crate::records::IdentityRecord;

/// Daily limits per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaLimits {
    pub free_daily: u32,
    /// `None` means premium identities bypass the counter
    pub premium_daily: Option<u32>,
}

impl Default for QuotaLimits {
    fn default() -> Self {
        Self {
            free_daily: 5,
            premium_daily: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Free,
    Premium,
}

/// Why a request was denied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Daily limit reached; an expected outcome
    QuotaExceeded { limit: u32 },
    /// Empty identity
    InvalidIdentity,
    /// Ledger failed; denied so storage trouble never bypasses the quota
    Unavailable,
}

/// Outcome of a quota check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted {
        tier: Tier,
        /// Requests left today; `None` when unbounded
        remaining: Option<u32>,
    },
    Denied { reason: DenyReason },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Read-only view of an identity's quota
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageReport {
    pub tier: Tier,
    /// Requests counted today
    pub used: u32,
    /// Applicable daily limit; `None` when unbounded
    pub limit: Option<u32>,
    pub premium_expires_on: Option<NaiveDate>,
}

/// Quota engine
pub struct QuotaEngine {
    ledger: Arc<dyn Ledger>,
    limits: QuotaLimits,
}

impl QuotaEngine {
    pub fn new(ledger: Arc<dyn Ledger>, limits: QuotaLimits) -> Self {
        Self { ledger, limits }
    }

    /// Admit or deny one usage request.
    ///
    /// Never returns an error: ledger failures are logged and denied.
    pub async fn admit(&self, identity: &str, now: DateTime<Utc>) -> Admission {
        let identity = identity.trim();
        if identity.is_empty() {
            return Admission::Denied {
                reason: DenyReason::InvalidIdentity,
            };
        }

        let today = now.date_naive();
        let limits = self.limits;
        let key = identity.to_string();

        let result = ledger::transact(self.ledger.clone(), move |tx| {
            let current = tx.identity(&key)?;
            let (admission, updated) = decide(current, &key, today, limits);
            if let Some(record) = updated {
                tx.put_identity(&record)?;
            }
            Ok::<_, StoreError>(admission)
        })
        .await;

        match result {
            Ok(admission) => {
                match admission {
                    Admission::Denied {
                        reason: DenyReason::QuotaExceeded { limit },
                    } => info!(identity, limit, "daily quota exceeded"),
                    _ => debug!(identity, ?admission, "quota check"),
                }
                admission
            }
            Err(err) => {
                error!(identity, error = %err, "quota check failed, denying request");
                Admission::Denied {
                    reason: DenyReason::Unavailable,
                }
            }
        }
    }

    /// Current usage without counting anything
    pub async fn usage(&self, identity: &str, now: DateTime<Utc>) -> Result<UsageReport, QuotaError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(QuotaError::Validation("identity is required".into()));
        }

        let today = now.date_naive();
        let limits = self.limits;
        let key = identity.to_string();

        ledger::transact(self.ledger.clone(), move |tx| {
            let report = match tx.identity(&key)? {
                None => UsageReport {
                    tier: Tier::Free,
                    used: 0,
                    limit: Some(limits.free_daily),
                    premium_expires_on: None,
                },
                Some(record) if record.premium_active(today) => UsageReport {
                    tier: Tier::Premium,
                    used: record.used_on(today),
                    limit: limits.premium_daily,
                    premium_expires_on: record.premium_expires_on,
                },
                Some(record) => UsageReport {
                    tier: Tier::Free,
                    used: record.used_on(today),
                    limit: Some(limits.free_daily),
                    premium_expires_on: record.premium_expires_on,
                },
            };
            Ok::<_, QuotaError>(report)
        })
        .await
    }
}

/// Pure admission decision: the outcome plus the record to write, if any
fn decide(
    current: Option<IdentityRecord>,
    identity: &str,
    today: NaiveDate,
    limits: QuotaLimits,
) -> (Admission, Option<IdentityRecord>) {
    let (tier, limit) = match &current {
        Some(record) if record.premium_active(today) => match limits.premium_daily {
            None => {
                return (
                    Admission::Admitted {
                        tier: Tier::Premium,
                        remaining: None,
                    },
                    None,
                )
            }
            Some(limit) => (Tier::Premium, limit),
        },
        _ => (Tier::Free, limits.free_daily),
    };

    let denied = (
        Admission::Denied {
            reason: DenyReason::QuotaExceeded { limit },
        },
        None,
    );
    if limit == 0 {
        return denied;
    }

    let mut record = current.unwrap_or_else(|| IdentityRecord::new(identity, today));
    if record.last_request_date != today {
        record.request_count = 0;
        record.last_request_date = today;
    }
    if record.request_count >= limit {
        return denied;
    }

    record.request_count += 1;
    let admission = Admission::Admitted {
        tier,
        remaining: Some(limit - record.request_count),
    };
    (admission, Some(record))
}
