// ---------------------------------------------------------------------------
// Equipment inventory routes
// ---------------------------------------------------------------------------

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use tracing::{info, warn};

use cvewatch_db::{DbError, Equipment, NewEquipment};

use crate::error::ApiError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// GET /api/equipments — list the inventory
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct EquipmentListResponse {
    pub equipments: Vec<Equipment>,
}

pub async fn list_equipment(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EquipmentListResponse>, ApiError> {
    let store = state.store.lock().await;
    let equipments = store.list_equipment().map_err(|e| {
        warn!(error = %e, "failed to list equipment");
        ApiError::Internal("failed to query inventory".into())
    })?;

    Ok(Json(EquipmentListResponse { equipments }))
}

// ---------------------------------------------------------------------------
// POST /api/equipments — add one equipment
// ---------------------------------------------------------------------------

pub async fn create_equipment(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewEquipment>,
) -> Result<(StatusCode, Json<Equipment>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("name must not be empty".into()));
    }
    if req.cpe.trim().is_empty() {
        return Err(ApiError::BadRequest("cpe must not be empty".into()));
    }
    if let Some(quantity) = req.quantity
        && quantity < 1
    {
        return Err(ApiError::BadRequest("quantity must be at least 1".into()));
    }

    let store = state.store.lock().await;
    let created = store.add_equipment(&req).map_err(|e| match e {
        DbError::Duplicate(msg) => ApiError::Conflict(msg),
        other => {
            warn!(error = %other, "failed to create equipment");
            ApiError::Internal("failed to create equipment".into())
        }
    })?;

    info!(id = created.id, name = %created.name, cpe = %created.cpe, "equipment added");
    Ok((StatusCode::CREATED, Json(created)))
}

// ---------------------------------------------------------------------------
// DELETE /api/equipments/{id} — remove one equipment
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

/// CVE rows recorded for the deleted CPE are kept (no cascade); they simply
/// stop counting toward the inventory-linked dashboard aggregates.
pub async fn delete_equipment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let store = state.store.lock().await;
    let deleted = store.delete_equipment(id).map_err(|e| {
        warn!(error = %e, id, "failed to delete equipment");
        ApiError::Internal("failed to delete equipment".into())
    })?;

    if !deleted {
        return Err(ApiError::NotFound(format!("no equipment with id {id}")));
    }

    info!(id, "equipment deleted");
    Ok(Json(DeleteResponse { deleted: true }))
}
