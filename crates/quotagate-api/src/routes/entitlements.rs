//! Purchase activation and access restore endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use std::sync::Arc;

use super::body;
use crate::error::ApiError;
use crate::models::{
    present, RestoreAccessBody, RestoreAccessRequest, Success, VerifyPurchaseBody, VerifyPurchaseRequest,
};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/verify_purchase", post(verify_purchase))
        .route("/restore_access", post(restore_access))
}

/// Verify a purchase and activate premium; the recovery key is returned once
pub async fn verify_purchase(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<VerifyPurchaseRequest>, JsonRejection>,
) -> Result<Json<Success<VerifyPurchaseBody>>, ApiError> {
    let request = body(payload)?;
    let (Some(user_id), Some(purchase_token), Some(product_id)) = (
        present(&request.user_id),
        present(&request.purchase_token),
        present(&request.product_id),
    ) else {
        return Err(ApiError::BadRequest("Missing data".into()));
    };

    let activation = state
        .gate
        .entitlements
        .activate(user_id, purchase_token, product_id, Utc::now())
        .await?;

    Ok(Json(Success::new(VerifyPurchaseBody {
        message: "Subscription verified and activated.",
        recovery_key: activation.recovery_key.into_string(),
        expires_on: activation.expires_on,
    })))
}

/// Move a premium entitlement onto a new identity
pub async fn restore_access(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<RestoreAccessRequest>, JsonRejection>,
) -> Result<Json<Success<RestoreAccessBody>>, ApiError> {
    let request = body(payload)?;
    let (Some(new_user_id), Some(recovery_key)) =
        (present(&request.new_user_id), present(&request.recovery_key))
    else {
        return Err(ApiError::BadRequest("Missing data".into()));
    };

    let restored = state
        .gate
        .recovery
        .restore(new_user_id, recovery_key, Utc::now())
        .await?;

    Ok(Json(Success::new(RestoreAccessBody {
        message: "Access restored.",
        expires_on: restored.expires_on,
    })))
}
