// ---------------------------------------------------------------------------
// Dashboard aggregate
// ---------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{Datelike, Duration, Utc};
use serde::Serialize;
use tracing::warn;

use cvewatch_db::{RecentCve, TopCve};

use crate::error::ApiError;
use crate::state::AppState;

/// Publication window for the recent panel.
const RECENT_WINDOW_DAYS: i64 = 7;

/// Entries in the top-critical panel; also the recency fallback size.
const TOP_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub total_cves: u64,
    pub severity_distribution: BTreeMap<String, u64>,
    pub top_10_critical: Vec<TopCve>,
    pub recent_cves: Vec<RecentCve>,
}

pub async fn dashboard(
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardResponse>, ApiError> {
    // The store compares `published` lexically, so the cutoff uses the same
    // ISO-8601 shape the feed delivers.
    let now = Utc::now();
    let year = now.year();
    let cutoff = (now - Duration::days(RECENT_WINDOW_DAYS))
        .format("%Y-%m-%dT%H:%M:%S%.3f")
        .to_string();

    let store = state.store.lock().await;

    let total_cves = store.count_open_inventory_cves().map_err(|e| {
        warn!(error = %e, "failed to count open CVEs");
        ApiError::Internal("failed to build dashboard".into())
    })?;
    let severity_distribution = store.severity_distribution().map_err(|e| {
        warn!(error = %e, "failed to aggregate severities");
        ApiError::Internal("failed to build dashboard".into())
    })?;
    let top_10_critical = store.top_critical(year, TOP_LIMIT).map_err(|e| {
        warn!(error = %e, year, "failed to query top critical CVEs");
        ApiError::Internal("failed to build dashboard".into())
    })?;
    let recent_cves = store.recent_cves(&cutoff, TOP_LIMIT).map_err(|e| {
        warn!(error = %e, cutoff = %cutoff, "failed to query recent CVEs");
        ApiError::Internal("failed to build dashboard".into())
    })?;

    Ok(Json(DashboardResponse {
        total_cves,
        severity_distribution,
        top_10_critical,
        recent_cves,
    }))
}
