//! QuotaGate HTTP API
//!
//! JSON endpoints in front of the gate, with route names compatible with
//! the existing mobile clients:
//!
//! ```text
//! GET  /health            liveness
//! POST /get_suggestions   quota-gated suggestions
//! POST /verify_purchase   purchase -> premium + recovery key
//! POST /restore_access    recovery key -> premium on a new identity
//! POST /quota_status      usage for today, nothing counted
//! ```

pub mod error;
pub mod models;
pub mod routes;
pub mod suggestions;

use axum::routing::get;
use axum::Router;
use quotagate_core::Gate;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use suggestions::{PlaceholderSuggestions, SuggestionSource};

/// Shared handler state
pub struct AppState {
    pub gate: Gate,
    pub suggestions: Arc<dyn SuggestionSource>,
}

impl AppState {
    pub fn new(gate: Gate, suggestions: Arc<dyn SuggestionSource>) -> Self {
        Self { gate, suggestions }
    }
}

/// Build the API router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(routes::suggestions::router())
        .merge(routes::entitlements::router())
        .merge(routes::quota::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
