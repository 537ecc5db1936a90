use crate::AppState;
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    database: &'static str,
    cache: &'static str,
}

pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let database = match state.db.ping().await {
        Ok(_) => "up",
        Err(_) => "down",
    };
    let cache = match state.cache.ping().await {
        Ok(_) => "up",
        Err(_) => "down",
    };

    let status = if database == "up" && cache == "up" {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status.0,
        Json(HealthResponse {
            status: status.1,
            database,
            cache,
        }),
    )
}
