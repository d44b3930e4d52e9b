// ---------------------------------------------------------------------------
// Per-CPE CVE query
// ---------------------------------------------------------------------------
//
// Answers from the local store first. When the store holds nothing for the
// CPE, performs exactly one live feed fetch, ingests the result, and
// re-reads; a feed failure is logged and the empty local answer stands.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use tracing::{info, warn};

use cvewatch_db::CveRecord;
use cvewatch_feed::ingest_vulnerabilities;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct CveListResponse {
    pub cves: Vec<CveRecord>,
}

// The route uses a wildcard capture: CPE strings contain `:` and arrive as
// the whole path tail, percent-decoded by the extractor.
pub async fn cves_for_cpe(
    State(state): State<Arc<AppState>>,
    Path(cpe): Path<String>,
) -> Result<Json<CveListResponse>, ApiError> {
    let cves = {
        let store = state.store.lock().await;
        store.open_cves_for_cpe(&cpe).map_err(|e| {
            warn!(error = %e, cpe = %cpe, "failed to query stored CVEs");
            ApiError::Internal("failed to query stored CVEs".into())
        })?
    };
    if !cves.is_empty() {
        return Ok(Json(CveListResponse { cves }));
    }

    // Local miss: one live lookup, then answer from whatever is now stored.
    // The lock is not held across the fetch.
    match state.feed.fetch_for_cpe(&cpe).await {
        Ok(raw) => {
            let store = state.store.lock().await;
            ingest_vulnerabilities(&store, &raw, &cpe).map_err(|e| {
                warn!(error = %e, cpe = %cpe, "failed to store fetched CVEs");
                ApiError::Internal("failed to store fetched CVEs".into())
            })?;

            let cves = store.open_cves_for_cpe(&cpe).map_err(|e| {
                warn!(error = %e, cpe = %cpe, "failed to re-read stored CVEs");
                ApiError::Internal("failed to query stored CVEs".into())
            })?;
            info!(cpe = %cpe, fetched = raw.len(), stored = cves.len(), "live feed lookup");
            Ok(Json(CveListResponse { cves }))
        }
        Err(e) => {
            warn!(
                error = %e,
                cpe = %cpe,
                transient = e.is_transient(),
                "live feed lookup failed, answering from local store"
            );
            Ok(Json(CveListResponse { cves }))
        }
    }
}
