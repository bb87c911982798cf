//! SSE streaming endpoint.
//!
//! GET /api/streams/:topic
//!
//! Subscribes to the progress hub by topic (`queue`, `entity:<id>`) and
//! forwards each event as SSE, named by its `type`.

use std::convert::Infallible;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{self, StreamExt};
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::kernel::progress_hub::topics;
use crate::server::app::AppState;

pub async fn stream_handler(
    Extension(state): Extension<AppState>,
    Path(topic): Path<String>,
) -> Result<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>, StatusCode> {
    validate_topic(&topic).map_err(|_| StatusCode::BAD_REQUEST)?;

    let rx = state.deps.stream_hub.subscribe(&topic).await;

    let connected =
        stream::once(async { Ok::<_, Infallible>(Event::default().event("connected").data("ok")) });

    let events = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(event) => Event::default()
                .event(event.event_type())
                .json_data(&event)
                .ok()
                .map(Ok),
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(n)) => {
                Event::default()
                    .event("lagged")
                    .json_data(serde_json::json!({"missed": n}))
                    .ok()
                    .map(Ok)
            }
        }
    });

    Ok(Sse::new(connected.chain(events)).keep_alive(KeepAlive::default()))
}

/// Only the hub's known topics can be subscribed to.
fn validate_topic(topic: &str) -> Result<(), anyhow::Error> {
    if topic == topics::QUEUE {
        return Ok(());
    }
    match topic.strip_prefix("entity:") {
        Some(id) => {
            Uuid::parse_str(id)?;
            Ok(())
        }
        None => anyhow::bail!("Unknown topic: {}", topic),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_known_topics_only() {
        assert!(validate_topic("queue").is_ok());
        assert!(validate_topic(&topics::entity(Uuid::new_v4())).is_ok());
        assert!(validate_topic("entity:not-a-uuid").is_err());
        assert!(validate_topic("chat:123").is_err());
    }
}
