use axum::{body::Bytes, extract::Extension, Json};
use chrono::Utc;

use crate::domains::schedules::{TriggerReport, TriggerRequest};
use crate::server::app::AppState;
use crate::server::error::ApiError;

/// POST /api/trigger
///
/// Body is optional; `{"force_config_id": "..."}` runs one configuration now.
/// A body that is present but does not parse is a 400, never an unforced sweep.
pub async fn trigger_handler(
    Extension(state): Extension<AppState>,
    body: Bytes,
) -> Result<Json<TriggerReport>, ApiError> {
    let request = parse_trigger_body(&body)?;
    let report = state
        .trigger
        .run(request, Utc::now())
        .await
        .map_err(ApiError::from_domain)?;
    Ok(Json(report))
}

fn parse_trigger_body(body: &[u8]) -> Result<TriggerRequest, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(TriggerRequest::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid trigger request: {}", e)))
}
