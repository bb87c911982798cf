//! Durable job queue for scheduled collection runs.
//!
//! # Architecture
//!
//! ```text
//! ScheduleTrigger ──enqueue──► queue_jobs table
//!                                   │
//! QueueWorker ─► QueueProcessor.tick() ─► BatchExecutor (providers + sink)
//!      ▲                │
//!      └── Dispatcher ◄─┘  Continue | Stop
//! ```
//!
//! One tick executes one batch of one job. The cursor (`batch_index`) only moves
//! after a successful batch; ownership is a lease plus a versioned write-back.

mod dispatcher;
mod events;
mod job;
mod processor;
mod queue;
mod worker;

pub use dispatcher::{decide, ChainDecision, Dispatcher};
pub use events::JobEvent;
pub use job::{JobScope, JobStatus, QueueJob, ScopeValue};
pub use processor::{BatchExecutor, BatchSummary, ProcessorConfig, QueueProcessor, TickOutcome};
pub(crate) use queue::insert_jobs;
pub use queue::{PostgresQueueStore, QueueStore, WriteBack};
pub use worker::{DrainReport, QueueWorker};
