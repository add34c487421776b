//! HTTP error mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quotagate_core::{EntitlementError, QuotaError, RecoveryError};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

/// Error body: `{"status": "error", "message": ...}`
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: &'static str,
    pub message: String,
}

/// Every failure a handler can answer with
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("You have exceeded your daily limit of {limit} requests. Please try again tomorrow.")]
    QuotaExceeded { limit: u32 },

    #[error("Subscription verification failed")]
    VerificationFailed,

    #[error("{0}")]
    NotFound(String),

    #[error("Subscription Expired. Please resubscribe.")]
    Expired,

    #[error("Service temporarily unavailable. Please try again later.")]
    Unavailable(String),

    /// Detail is logged, never sent
    #[error("Internal server error")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::VerificationFailed => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Expired => StatusCode::FORBIDDEN,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(detail) => error!(detail = %detail, "request failed"),
            ApiError::Unavailable(detail) => warn!(detail = %detail, "dependency unavailable"),
            _ => {}
        }

        let body = ErrorBody {
            status: "error",
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<EntitlementError> for ApiError {
    fn from(err: EntitlementError) -> Self {
        match err {
            EntitlementError::Validation(reason) => ApiError::BadRequest(reason),
            EntitlementError::Verification(_) => ApiError::VerificationFailed,
            EntitlementError::VerifierUnavailable(detail) => ApiError::Unavailable(detail),
            EntitlementError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RecoveryError> for ApiError {
    fn from(err: RecoveryError) -> Self {
        match err {
            RecoveryError::Validation(reason) => ApiError::BadRequest(reason),
            RecoveryError::NotFound => ApiError::NotFound("Invalid recovery key.".into()),
            RecoveryError::Expired { .. } => ApiError::Expired,
            RecoveryError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<QuotaError> for ApiError {
    fn from(err: QuotaError) -> Self {
        match err {
            QuotaError::Validation(reason) => ApiError::BadRequest(reason),
            QuotaError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use quotagate_core::StoreError;

    #[test]
    fn test_status_mapping() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (RecoveryError::NotFound.into(), StatusCode::NOT_FOUND),
            (
                RecoveryError::Expired {
                    expired_on: NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
                }
                .into(),
                StatusCode::FORBIDDEN,
            ),
            (EntitlementError::Verification("refunded".into()).into(), StatusCode::UNAUTHORIZED),
            (EntitlementError::VerifierUnavailable("503".into()).into(), StatusCode::SERVICE_UNAVAILABLE),
            (
                EntitlementError::Store(StoreError::KeySpaceExhausted { attempts: 5 }).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (QuotaError::Validation("empty".into()).into(), StatusCode::BAD_REQUEST),
            (ApiError::QuotaExceeded { limit: 5 }, StatusCode::TOO_MANY_REQUESTS),
        ];

        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err:?}");
        }
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err: ApiError = RecoveryError::Store(StoreError::Backend("disk I/O error at /var/db".into())).into();
        assert_eq!(err.to_string(), "Internal server error");
    }

    #[test]
    fn test_quota_message() {
        assert_eq!(
            ApiError::QuotaExceeded { limit: 5 }.to_string(),
            "You have exceeded your daily limit of 5 requests. Please try again tomorrow."
        );
    }
}
