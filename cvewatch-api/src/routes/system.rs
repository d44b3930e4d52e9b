// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Health check endpoint — intentionally minimal: no version, no uptime, no
/// inventory counts.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
    })
}
