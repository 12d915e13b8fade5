use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

use ports::MetricsSnapshot;

use crate::error::ApiResult;
use crate::AppState;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub async fn get(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.scheduler.engine().get_metrics())
}

/// Text exposition of the registry for Prometheus scrapes.
pub async fn export(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let body = ports::export_text(&state.registry)?;
    Ok(([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], body))
}

pub async fn reset(State(state): State<AppState>) -> StatusCode {
    state.scheduler.engine().reset_metrics();
    StatusCode::NO_CONTENT
}
