//! Google Play subscription verifier
//!
//! Queries the Play Developer API subscription purchase resource and takes
//! `expiryTimeMillis` as the authoritative expiration.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::{BillingVerifier, Verification};
use crate::error::{ConfigError, VerifierError};

/// Play Developer API settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayStoreConfig {
    /// API base URL
    pub base_url: String,
    /// Android application package name
    pub package_name: String,
    /// OAuth2 bearer token with the androidpublisher scope
    pub access_token: String,
    /// Request timeout
    pub timeout_secs: u64,
}

impl Default for PlayStoreConfig {
    fn default() -> Self {
        Self {
            base_url: "https://androidpublisher.googleapis.com".to_string(),
            package_name: String::new(),
            access_token: String::new(),
            timeout_secs: 10,
        }
    }
}

/// Subscription purchase resource (fields we read)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionPurchase {
    expiry_time_millis: String,
    /// 0 pending, 1 received, 2 free trial, 3 deferred
    payment_state: Option<i32>,
}

/// Play Developer API client
pub struct PlayStoreVerifier {
    client: reqwest::Client,
    base_url: Url,
    package_name: String,
}

impl PlayStoreVerifier {
    /// Create new verifier
    pub fn new(config: &PlayStoreConfig) -> Result<Self, ConfigError> {
        if config.package_name.is_empty() {
            return Err(ConfigError::Invalid("billing.play_store.package_name is empty".into()));
        }
        if config.access_token.is_empty() {
            return Err(ConfigError::Invalid("billing.play_store.access_token is empty".into()));
        }

        let base_url = Url::parse(&config.base_url)
            .map_err(|e| ConfigError::Invalid(format!("billing.play_store.base_url: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid("billing.play_store.base_url is not a base URL".into()));
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.access_token))
            .map_err(|e| ConfigError::Invalid(format!("billing.play_store.access_token: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::Invalid(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            package_name: config.package_name.clone(),
        })
    }

    fn purchase_url(&self, purchase_token: &str, product_id: &str) -> Result<Url, VerifierError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| VerifierError::Unavailable("base url cannot take a path".into()))?
            .pop_if_empty()
            .extend([
                "androidpublisher",
                "v3",
                "applications",
                self.package_name.as_str(),
                "purchases",
                "subscriptions",
                product_id,
                "tokens",
                purchase_token,
            ]);
        Ok(url)
    }
}

#[async_trait]
impl BillingVerifier for PlayStoreVerifier {
    async fn verify(&self, purchase_token: &str, product_id: &str) -> Result<Verification, VerifierError> {
        let url = self.purchase_url(purchase_token, product_id)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VerifierError::Unavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status));
        }

        let purchase: SubscriptionPurchase = response
            .json()
            .await
            .map_err(|e| VerifierError::Unavailable(format!("unreadable purchase resource: {e}")))?;

        if purchase.payment_state == Some(0) {
            return Err(VerifierError::Rejected("payment pending".into()));
        }

        let millis: i64 = purchase
            .expiry_time_millis
            .parse()
            .map_err(|_| VerifierError::Unavailable(format!("bad expiryTimeMillis {:?}", purchase.expiry_time_millis)))?;
        let expires_at = Utc
            .timestamp_millis_opt(millis)
            .single()
            .ok_or_else(|| VerifierError::Unavailable(format!("expiryTimeMillis out of range: {millis}")))?;

        Ok(Verification {
            expires_on: expires_at.date_naive(),
        })
    }

    fn name(&self) -> &'static str {
        "play-store"
    }
}

/// 401/403 mean our credentials are wrong, not the buyer's token
fn classify_status(status: StatusCode) -> VerifierError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            VerifierError::Unavailable(format!("billing API refused credentials ({status})"))
        }
        s if s.is_client_error() => VerifierError::Rejected(format!("billing API answered {s}")),
        s => VerifierError::Unavailable(format!("billing API answered {s}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PURCHASE_PATH: &str =
        "/androidpublisher/v3/applications/com.example.app/purchases/subscriptions/prod-x/tokens/tok-1";

    fn verifier(server: &MockServer) -> PlayStoreVerifier {
        PlayStoreVerifier::new(&PlayStoreConfig {
            base_url: server.uri(),
            package_name: "com.example.app".into(),
            access_token: "secret".into(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_verified_expiration() {
        let server = MockServer::start().await;
        // 2024-02-01T12:00:00Z
        Mock::given(method("GET"))
            .and(path(PURCHASE_PATH))
            .and(header("authorization", "Bearer secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "expiryTimeMillis": "1706788800000",
                "paymentState": 1,
                "autoRenewing": true
            })))
            .mount(&server)
            .await;

        let verification = verifier(&server).verify("tok-1", "prod-x").await.unwrap();
        assert_eq!(verification.expires_on, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap());
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = verifier(&server).verify("tok-1", "prod-x").await;
        assert!(matches!(result, Err(VerifierError::Rejected(_))));
    }

    #[tokio::test]
    async fn test_pending_payment_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(PURCHASE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "expiryTimeMillis": "1706788800000",
                "paymentState": 0
            })))
            .mount(&server)
            .await;

        let result = verifier(&server).verify("tok-1", "prod-x").await;
        assert!(matches!(result, Err(VerifierError::Rejected(ref r)) if r == "payment pending"));
    }

    #[tokio::test]
    async fn test_backend_failure_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = verifier(&server).verify("tok-1", "prod-x").await;
        assert!(matches!(result, Err(VerifierError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_bad_credentials_are_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let result = verifier(&server).verify("tok-1", "prod-x").await;
        assert!(matches!(result, Err(VerifierError::Unavailable(_))));
    }

    #[test]
    fn test_token_is_path_escaped() {
        let verifier = PlayStoreVerifier::new(&PlayStoreConfig {
            base_url: "https://billing.example.com/".into(),
            package_name: "com.example.app".into(),
            access_token: "secret".into(),
            timeout_secs: 5,
        })
        .unwrap();

        let url = verifier.purchase_url("a/b?c", "prod-x").unwrap();
        assert_eq!(
            url.as_str(),
            "https://billing.example.com/androidpublisher/v3/applications/com.example.app/purchases/subscriptions/prod-x/tokens/a%2Fb%3Fc"
        );
    }

    #[test]
    fn test_requires_package_and_token() {
        let missing = PlayStoreVerifier::new(&PlayStoreConfig::default());
        assert!(matches!(missing, Err(ConfigError::Invalid(_))));
    }
}
