use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use engine::{ReminderReceipt, ScanSummary};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReminderDto {
    #[serde(default = "default_reminder_type")]
    pub reminder_type: String,
}

fn default_reminder_type() -> String {
    "manual_reminder".to_owned()
}

/// Run one scan now, independent of the scheduler interval.
pub async fn run(State(state): State<AppState>) -> ApiResult<Json<ScanSummary>> {
    let summary = state.scheduler.run_once().await?;
    Ok(Json(summary))
}

pub async fn remind(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ReminderDto>,
) -> ApiResult<Json<ReminderReceipt>> {
    let reminder_type = payload.reminder_type.trim();
    if reminder_type.is_empty() {
        return Err(ApiError::BadRequest("reminder_type must not be empty".into()));
    }
    let receipt = state.scheduler.send_reminder(id, reminder_type).await?;
    Ok(Json(receipt))
}
