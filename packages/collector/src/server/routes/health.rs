use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;

use crate::server::app::AppState;

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
pub struct HealthResponse {
    healthy: bool,
    database: Probe,
    /// Jobs a worker could claim right now
    queue_backlog: Option<i64>,
    pool_connections: u32,
    providers: Vec<String>,
}

#[derive(Serialize)]
pub struct Probe {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

impl Probe {
    fn from_result<T, E: std::fmt::Display>(
        result: Result<Result<T, E>, tokio::time::error::Elapsed>,
    ) -> (Self, Option<T>) {
        match result {
            Ok(Ok(value)) => (Probe { ok: true, detail: None }, Some(value)),
            Ok(Err(e)) => (
                Probe {
                    ok: false,
                    detail: Some(e.to_string()),
                },
                None,
            ),
            Err(_) => (
                Probe {
                    ok: false,
                    detail: Some(format!("timed out after {:?}", PROBE_TIMEOUT)),
                },
                None,
            ),
        }
    }
}

/// Liveness plus a queue backlog snapshot; 503 when the database is unreachable.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let (database, _) = Probe::from_result(
        tokio::time::timeout(
            PROBE_TIMEOUT,
            sqlx::query("SELECT 1").execute(&state.db_pool),
        )
        .await,
    );

    let queue_backlog = if database.ok {
        let (_, backlog) = Probe::from_result(
            tokio::time::timeout(PROBE_TIMEOUT, state.deps.queue.count_claimable(None)).await,
        );
        backlog
    } else {
        None
    };

    let code = if database.ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(HealthResponse {
            healthy: database.ok,
            database,
            queue_backlog,
            pool_connections: state.db_pool.size(),
            providers: state.deps.providers.keys(),
        }),
    )
}
