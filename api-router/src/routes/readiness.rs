use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 once the provider credential is present,
/// else 503. Object storage is reported but does not gate readiness.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let storage = if state.storage.is_some() {
        "ok"
    } else {
        "unavailable"
    };

    if state.provider.is_configured() {
        (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "provider": "ok", "storage": storage }
            })),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "checks": { "provider": "fail", "storage": storage },
                "reason": "FAL_KEY environment variable is not set"
            })),
        )
    }
}
