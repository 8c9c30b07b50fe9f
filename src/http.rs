//! HTTP service boundary: one batch-scrape route plus health.

use crate::batch_scrape;
use crate::types::{BatchResult, ErrorResponse};
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/scrape", post(scrape_batch_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "scrape-gate",
        "version": env!("CARGO_PKG_VERSION"),
        "browser_available": state.browser_pool.executable().is_some(),
        "browser_started": state.browser_pool.is_started(),
        "open_contexts": state.browser_pool.open_contexts(),
    }))
}

fn bad_request(error: String) -> (StatusCode, Json<ErrorResponse>) {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error }))
}

async fn scrape_batch_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchResult>, (StatusCode, Json<ErrorResponse>)> {
    let Json(body) = payload.map_err(|e| {
        warn!("Rejected batch: {}", e.body_text());
        bad_request(format!("invalid JSON body: {}", e.body_text()))
    })?;

    let request =
        batch_scrape::parse_batch_request(&body, state.config.max_batch_urls).map_err(|e| {
            warn!("Rejected batch: {}", e);
            bad_request(e.to_string())
        })?;

    Ok(Json(batch_scrape::scrape_batch(&state, request).await))
}
