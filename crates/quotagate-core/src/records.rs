//! Ledger records
//!
//! Two relations back the whole system:
//! - [`IdentityRecord`]: quota counter and premium expiration per identity
//! - [`RecoveryRecord`]: purchase token to recovery key to bound identity

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::keys::RecoveryKey;

/// Quota and entitlement state for one identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    /// Opaque client-generated identifier
    pub identity: String,
    /// Requests counted in the quota window of `last_request_date`
    pub request_count: u32,
    /// Calendar date of the last counted request
    pub last_request_date: NaiveDate,
    /// Last calendar date on which premium is honored; `None` if never purchased
    pub premium_expires_on: Option<NaiveDate>,
}

impl IdentityRecord {
    /// Fresh free-tier record with nothing counted yet
    pub fn new(identity: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            identity: identity.into(),
            request_count: 0,
            last_request_date: today,
            premium_expires_on: None,
        }
    }

    /// Record that starts a premium grant: counter cleared, expiration set
    pub fn entitled(identity: impl Into<String>, today: NaiveDate, expires_on: NaiveDate) -> Self {
        Self {
            premium_expires_on: Some(expires_on),
            ..Self::new(identity, today)
        }
    }

    /// Premium is honored through the whole expiration day, never by time of day
    pub fn premium_active(&self, today: NaiveDate) -> bool {
        matches!(self.premium_expires_on, Some(expires_on) if expires_on >= today)
    }

    /// Requests counted on `today` (zero once the window rolled over)
    pub fn used_on(&self, today: NaiveDate) -> u32 {
        if self.last_request_date == today {
            self.request_count
        } else {
            0
        }
    }
}

/// Binding between a purchase, its recovery key and the identity holding it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryRecord {
    /// External billing transaction id; idempotency key of activation
    pub purchase_token: String,
    /// Billing product the token was bought for
    pub product_id: String,
    /// Globally unique, human-enterable key
    pub recovery_key: RecoveryKey,
    /// Identity currently entitled through this key
    pub bound_identity: String,
    /// Verified last day of this purchase
    pub expires_on: NaiveDate,
}

/// Premium expiration an identity holds through its bound purchases.
///
/// The latest expiration wins; `None` when nothing is bound.
pub fn held_expiration<'a>(bound: impl IntoIterator<Item = &'a RecoveryRecord>) -> Option<NaiveDate> {
    bound.into_iter().map(|record| record.expires_on).max()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_premium_active_by_date_only() {
        let today = date(2024, 1, 2);

        let never = IdentityRecord::new("u1", today);
        assert!(!never.premium_active(today));

        let expires_today = IdentityRecord::entitled("u1", today, today);
        assert!(expires_today.premium_active(today));

        let expired = IdentityRecord::entitled("u1", today, date(2024, 1, 1));
        assert!(!expired.premium_active(today));
    }

    #[test]
    fn test_held_expiration_takes_latest() {
        let record = |token: &str, expires_on| RecoveryRecord {
            purchase_token: token.into(),
            product_id: "prod-x".into(),
            recovery_key: RecoveryKey::from_stored(format!("KEY-{token}")),
            bound_identity: "u1".into(),
            expires_on,
        };
        let bound = [record("tok-1", date(2024, 1, 31)), record("tok-2", date(2024, 3, 31))];

        assert_eq!(held_expiration(&bound), Some(date(2024, 3, 31)));
        assert_eq!(held_expiration(&bound[..1]), Some(date(2024, 1, 31)));
        assert_eq!(held_expiration(&bound[..0]), None);
    }

    #[test]
    fn test_used_on_rolls_over() {
        let mut record = IdentityRecord::new("u1", date(2024, 1, 1));
        record.request_count = 4;

        assert_eq!(record.used_on(date(2024, 1, 1)), 4);
        assert_eq!(record.used_on(date(2024, 1, 2)), 0);
    }
}
