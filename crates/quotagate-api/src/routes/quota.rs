//! Quota status endpoint

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;

use super::body;
use crate::error::ApiError;
use crate::models::{present, QuotaStatusBody, QuotaStatusRequest, Success};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/quota_status", post(quota_status))
}

/// Today's usage for an identity; counts nothing
pub async fn quota_status(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<QuotaStatusRequest>, JsonRejection>,
) -> Result<Json<Success<QuotaStatusBody>>, ApiError> {
    let request = body(payload)?;
    let user_id = present(&request.user_id).ok_or_else(|| ApiError::BadRequest("User ID is required".into()))?;

    let report = state.gate.quota.usage(user_id, Utc::now()).await?;

    Ok(Json(Success::new(QuotaStatusBody {
        tier: report.tier,
        used: report.used,
        limit: report.limit,
        premium_expires_on: report.premium_expires_on,
    })))
}
