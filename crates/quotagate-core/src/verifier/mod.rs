//! Billing verification
//!
//! The verifier is the trust boundary of activation: no entitlement is
//! granted unless [`BillingVerifier::verify`] returns an expiration.

pub mod fixed_term;
pub mod play_store;

pub use fixed_term::FixedTermVerifier;
pub use play_store::{PlayStoreConfig, PlayStoreVerifier};

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::VerifierError;

/// Verified purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// Last calendar day the purchase entitles
    pub expires_on: NaiveDate,
}

/// External billing backend
#[async_trait]
pub trait BillingVerifier: Send + Sync {
    /// Check a purchase token and return its authoritative expiration
    async fn verify(&self, purchase_token: &str, product_id: &str) -> Result<Verification, VerifierError>;

    /// Short name for logs
    fn name(&self) -> &'static str;
}
