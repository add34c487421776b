//! API Models

use chrono::NaiveDate;
use quotagate_core::Tier;
use serde::{Deserialize, Serialize};

/// Success envelope: `{"status": "success", ...body}`
#[derive(Debug, Serialize)]
pub struct Success<T> {
    pub status: &'static str,
    #[serde(flatten)]
    pub body: T,
}

impl<T> Success<T> {
    pub fn new(body: T) -> Self {
        Self { status: "success", body }
    }
}

/// Trimmed, non-empty value of an optional request field
pub fn present(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

// ============ Suggestions ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SuggestionRequest {
    pub app_name: Option<String>,
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuggestionBody {
    pub suggestions: Vec<String>,
    /// Requests left today; absent for unbounded premium
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<u32>,
}

// ============ Purchases ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct VerifyPurchaseRequest {
    pub user_id: Option<String>,
    pub purchase_token: Option<String>,
    pub product_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct VerifyPurchaseBody {
    pub message: &'static str,
    pub recovery_key: String,
    pub expires_on: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RestoreAccessRequest {
    pub new_user_id: Option<String>,
    pub recovery_key: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RestoreAccessBody {
    pub message: &'static str,
    pub expires_on: NaiveDate,
}

// ============ Quota ============

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct QuotaStatusRequest {
    pub user_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QuotaStatusBody {
    pub tier: Tier,
    pub used: u32,
    pub limit: Option<u32>,
    pub premium_expires_on: Option<NaiveDate>,
}
