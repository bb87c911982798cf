//! In-process pub/sub hub for collection progress.
//!
//! Topic-keyed broadcast channels carrying typed [`StreamEvent`]s. Producers are the
//! queue processor (topic `queue`) and the session / refresh drivers
//! (topic `entity:<id>`); consumers are SSE endpoints.
//!
//! # Usage
//!
//! Producers:
//!   hub.publish(&topics::entity(entity_id), StreamEvent::progress("phase2", progress)).await;
//!
//! Consumers:
//!   let rx = hub.subscribe(topics::QUEUE).await;

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};

use super::jobs::JobEvent;
use crate::common::CollectionProgress;

pub mod topics {
    use uuid::Uuid;

    pub const QUEUE: &str = "queue";

    pub fn entity(entity_id: Uuid) -> String {
        format!("entity:{}", entity_id)
    }
}

/// Message published on the hub.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A unit was handled; carries the full progress record.
    Progress {
        phase: String,
        progress: CollectionProgress,
    },
    /// A session or refresh finished.
    Finished {
        label: String,
        progress: CollectionProgress,
    },
    /// A queue job changed state.
    Job { event: JobEvent },
}

impl StreamEvent {
    pub fn progress(phase: impl Into<String>, progress: CollectionProgress) -> Self {
        StreamEvent::Progress {
            phase: phase.into(),
            progress,
        }
    }

    /// SSE event name.
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Progress { .. } => "progress",
            StreamEvent::Finished { .. } => "finished",
            StreamEvent::Job { .. } => "job",
        }
    }
}

/// Cloneable pub/sub hub keyed by string topics.
#[derive(Clone)]
pub struct ProgressHub {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<StreamEvent>>>>,
    capacity: usize,
}

impl ProgressHub {
    /// Hub with 256 buffered messages per topic.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Publish to a topic. No-op if nobody is subscribed.
    pub async fn publish(&self, topic: &str, event: StreamEvent) {
        let channels = self.channels.read().await;
        if let Some(tx) = channels.get(topic) {
            // No active receivers is fine
            let _ = tx.send(event);
        }
    }

    pub async fn publish_job(&self, event: JobEvent) {
        self.publish(topics::QUEUE, StreamEvent::Job { event }).await;
    }

    /// Subscribe to a topic, creating its channel if needed.
    pub async fn subscribe(&self, topic: &str) -> broadcast::Receiver<StreamEvent> {
        let mut channels = self.channels.write().await;
        let tx = channels
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        tx.subscribe()
    }

    /// Drop channels nobody listens to anymore.
    pub async fn cleanup(&self) {
        let mut channels = self.channels.write().await;
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}
