//! Fixed-term verifier
//!
//! Accepts every purchase token and grants a fixed number of days. Only for
//! bootstrapping and local testing, when no billing backend is wired in.

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{BillingVerifier, Verification};
use crate::error::VerifierError;

/// Grants `term` from the moment of verification
pub struct FixedTermVerifier {
    term: Duration,
}

impl FixedTermVerifier {
    pub fn new(term_days: u32) -> Self {
        Self {
            term: Duration::days(i64::from(term_days)),
        }
    }
}

#[async_trait]
impl BillingVerifier for FixedTermVerifier {
    async fn verify(&self, purchase_token: &str, _product_id: &str) -> Result<Verification, VerifierError> {
        if purchase_token.trim().is_empty() {
            return Err(VerifierError::Rejected("empty purchase token".into()));
        }
        let expires_at = Utc::now()
            .checked_add_signed(self.term)
            .ok_or_else(|| VerifierError::Unavailable("grant term out of calendar range".into()))?;
        Ok(Verification {
            expires_on: expires_at.date_naive(),
        })
    }

    fn name(&self) -> &'static str {
        "fixed-term"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grants_term_from_today() {
        let verifier = FixedTermVerifier::new(30);
        let before = (Utc::now() + Duration::days(30)).date_naive();

        let verification = verifier.verify("tok-1", "prod-x").await.unwrap();
        let after = (Utc::now() + Duration::days(30)).date_naive();

        assert!(verification.expires_on >= before && verification.expires_on <= after);
    }

    #[tokio::test]
    async fn test_oversized_term_is_unavailable() {
        let verifier = FixedTermVerifier::new(u32::MAX);
        assert!(matches!(
            verifier.verify("tok-1", "prod-x").await,
            Err(VerifierError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_empty_token() {
        let verifier = FixedTermVerifier::new(30);
        assert!(matches!(
            verifier.verify(" ", "prod-x").await,
            Err(VerifierError::Rejected(_))
        ));
    }
}
