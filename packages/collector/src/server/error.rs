use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::domains::collection::activities::RefreshError;
use crate::domains::schedules::TriggerError;

/// Errors returned by the HTTP surface
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Map domain errors carried inside an `anyhow::Error` to their status.
    pub fn from_domain(err: anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<TriggerError>() {
            return match e {
                TriggerError::ConfigNotFound(_) => ApiError::NotFound(e.to_string()),
            };
        }
        if let Some(e) = err.downcast_ref::<RefreshError>() {
            return match e {
                RefreshError::NoProviders => ApiError::BadRequest(e.to_string()),
            };
        }
        ApiError::Internal(err)
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            // Infrastructure and provider details stay in the logs
            ApiError::Internal(e) => {
                tracing::error!(error = %format!("{:#}", e), "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let not_found = ApiError::from_domain(TriggerError::ConfigNotFound(Uuid::nil()).into());
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let bad = ApiError::from_domain(RefreshError::NoProviders.into());
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);

        let internal = ApiError::from_domain(anyhow::anyhow!("connection reset"));
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn internal_errors_hide_details() {
        let response = ApiError::Internal(anyhow::anyhow!("provider said 502")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
