// ---------------------------------------------------------------------------
// Route registration
// ---------------------------------------------------------------------------

mod cves;
mod dashboard;
mod equipment;
mod sync;
mod system;

use std::path::Path;
use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::ServeDir;

use crate::state::AppState;

pub fn build_router(state: Arc<AppState>, static_dir: Option<&Path>) -> Router {
    let api_routes = Router::new()
        .route("/api/health", get(system::health_check))
        .route(
            "/api/equipments",
            get(equipment::list_equipment).post(equipment::create_equipment),
        )
        .route("/api/equipments/{id}", delete(equipment::delete_equipment))
        .route("/api/cves/{*cpe}", get(cves::cves_for_cpe))
        .route("/api/dashboard", get(dashboard::dashboard))
        .route("/api/sync", post(sync::schedule_sync));

    // The API carries no credentials, so permissive CORS keeps dashboard dev
    // servers and ad-hoc tooling working against a locally bound instance.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE]);

    // Static dashboard assets live behind the API routes when configured.
    let router = match static_dir {
        Some(dir) => api_routes.fallback_service(ServeDir::new(dir)),
        None => api_routes,
    };

    router
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(1024 * 1024)) // 1 MB (equipment payloads are small)
        .with_state(state)
}
