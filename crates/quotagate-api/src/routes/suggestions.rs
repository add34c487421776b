//! Quota-gated suggestion endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use quotagate_core::{Admission, DenyReason};
use std::sync::Arc;

use super::body;
use crate::error::ApiError;
use crate::models::{present, SuggestionBody, SuggestionRequest, Success};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/get_suggestions", post(get_suggestions))
}

/// Count one request against the caller's quota, then produce suggestions
pub async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SuggestionRequest>, JsonRejection>,
) -> Result<Json<Success<SuggestionBody>>, ApiError> {
    let request = body(payload)?;
    let (Some(app_name), Some(user_id)) = (present(&request.app_name), present(&request.user_id)) else {
        return Err(ApiError::BadRequest("IDs are required".into()));
    };

    let remaining = match state.gate.quota.admit(user_id, Utc::now()).await {
        Admission::Admitted { remaining, .. } => remaining,
        Admission::Denied {
            reason: DenyReason::QuotaExceeded { limit },
        } => return Err(ApiError::QuotaExceeded { limit }),
        Admission::Denied {
            reason: DenyReason::InvalidIdentity,
        } => return Err(ApiError::BadRequest("IDs are required".into())),
        Admission::Denied {
            reason: DenyReason::Unavailable,
        } => return Err(ApiError::Unavailable("quota ledger".into())),
    };

    let suggestions = state
        .suggestions
        .suggest(app_name)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if suggestions.is_empty() {
        return Err(ApiError::NotFound("No suggestions found".into()));
    }

    Ok(Json(Success::new(SuggestionBody { suggestions, remaining })))
}
