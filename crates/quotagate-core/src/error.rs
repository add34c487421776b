//! Error types for QuotaGate

use chrono::NaiveDate;
use thiserror::Error;

/// Ledger (storage) errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Recovery key already bound to another purchase
    #[error("recovery key already in use")]
    KeyCollision,

    /// Every key draw collided with an existing key
    #[error("no free recovery key after {attempts} attempts")]
    KeySpaceExhausted { attempts: u32 },

    /// Stored row could not be decoded
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// Backend reported a failure
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Backend could not be reached at all
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Billing verifier errors
#[derive(Debug, Clone, Error)]
pub enum VerifierError {
    /// The billing backend refused the purchase
    #[error("purchase rejected: {0}")]
    Rejected(String),

    /// The billing backend could not give an answer
    #[error("billing backend unavailable: {0}")]
    Unavailable(String),
}

/// Quota errors (read-only queries; admission itself never fails)
#[derive(Debug, Error)]
pub enum QuotaError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Entitlement activation errors
#[derive(Debug, Error)]
pub enum EntitlementError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("verification failed: {0}")]
    Verification(String),

    #[error("verifier unavailable: {0}")]
    VerifierUnavailable(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<VerifierError> for EntitlementError {
    fn from(err: VerifierError) -> Self {
        match err {
            VerifierError::Rejected(reason) => Self::Verification(reason),
            VerifierError::Unavailable(reason) => Self::VerifierUnavailable(reason),
        }
    }
}

/// Recovery (restore) errors
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("invalid input: {0}")]
    Validation(String),

    /// Unknown key, or the key points at an identity the ledger does not hold
    #[error("recovery key not found")]
    NotFound,

    #[error("entitlement expired on {expired_on}")]
    Expired { expired_on: NaiveDate },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verifier_error_mapping() {
        let rejected: EntitlementError = VerifierError::Rejected("refunded".into()).into();
        assert!(matches!(rejected, EntitlementError::Verification(ref r) if r == "refunded"));

        let down: EntitlementError = VerifierError::Unavailable("503".into()).into();
        assert!(matches!(down, EntitlementError::VerifierUnavailable(_)));
    }
}
