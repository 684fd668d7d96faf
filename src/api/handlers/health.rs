use crate::AppState;
use axum::{Json, extract::State, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub ok: bool,
    pub database: String,
    pub storage: String,
    pub bucket: String,
    pub version: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "System health status", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.records.ping().await.is_ok();

    // A missing health-check object still proves the bucket answered.
    let storage_ok = state.storage.head_object("health-check").await.is_ok();

    Json(HealthResponse {
        ok: db_ok && storage_ok,
        database: if db_ok { "connected" } else { "disconnected" }.to_string(),
        storage: if storage_ok { "connected" } else { "disconnected" }.to_string(),
        bucket: state.storage.bucket().to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
