use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::common::CollectionProgress;
use crate::domains::collection::activities::{RefreshReport, RefreshRequest, SessionReport};
use crate::domains::collection::models::{SessionStatus, NOT_STARTED_LABEL};
use crate::server::app::AppState;
use crate::server::error::ApiError;

#[derive(Serialize)]
pub struct EntityStatusView {
    pub entity_id: Uuid,
    pub status: Option<SessionStatus>,
    pub label: String,
    pub progress: Option<CollectionProgress>,
}

/// POST /api/entities/:id/collection
///
/// Runs (or resumes) the onboarding session until it finishes.
pub async fn run_session_handler(
    Extension(state): Extension<AppState>,
    Path(entity_id): Path<Uuid>,
) -> Result<Json<SessionReport>, ApiError> {
    Ok(Json(state.session.run(entity_id).await?))
}

/// GET /api/entities/:id/collection
pub async fn entity_status_handler(
    Extension(state): Extension<AppState>,
    Path(entity_id): Path<Uuid>,
) -> Result<Json<EntityStatusView>, ApiError> {
    let view = match state.session.status(entity_id).await? {
        Some(status) => EntityStatusView {
            entity_id,
            status: Some(status.status),
            label: status.label(),
            progress: status.progress().cloned(),
        },
        None => EntityStatusView {
            entity_id,
            status: None,
            label: NOT_STARTED_LABEL.to_string(),
            progress: None,
        },
    };
    Ok(Json(view))
}

/// POST /api/entities/:id/refresh
pub async fn refresh_handler(
    Extension(state): Extension<AppState>,
    Path(entity_id): Path<Uuid>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<RefreshReport>, ApiError> {
    let report = state
        .refresh
        .run(entity_id, request)
        .await
        .map_err(ApiError::from_domain)?;
    Ok(Json(report))
}
