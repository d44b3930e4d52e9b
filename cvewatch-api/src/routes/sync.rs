// ---------------------------------------------------------------------------
// On-demand sync trigger
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;
use tracing::info;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: String,
}

/// Hands the request to the background scheduler and returns immediately.
/// A request arriving while one is already pending coalesces with it, so the
/// answer is 202 either way.
pub async fn schedule_sync(State(state): State<Arc<AppState>>) -> (StatusCode, Json<SyncResponse>) {
    let accepted = state.sync.trigger();
    info!(coalesced = !accepted, "sync requested over the API");

    (
        StatusCode::ACCEPTED,
        Json(SyncResponse {
            status: "scheduled".into(),
        }),
    )
}
