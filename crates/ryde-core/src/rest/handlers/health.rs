//! Health handler.

use axum::extract::State;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use crate::state::CoreState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub service: String,
    pub status: String,
    pub store: String,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<CoreState>>) -> Json<HealthResponse> {
    let store = match state.store.health_check_db().await {
        Ok(true) => "ok",
        _ => "unavailable",
    };
    Json(HealthResponse {
        service: "ryde-core".to_string(),
        status: "ok".to_string(),
        store: store.to_string(),
    })
}
