//! API Routes

pub mod entitlements;
pub mod health;
pub mod quota;
pub mod suggestions;

use axum::extract::rejection::JsonRejection;
use axum::Json;

use crate::error::ApiError;

/// Unwrap a JSON body, answering 400 for anything unparseable
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
