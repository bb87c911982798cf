//! Continuation decision after a processor tick.
//!
//! Replaces re-triggering the processor over HTTP: the worker loop asks the
//! dispatcher after every tick whether to run another one.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use super::job::JobStatus;
use super::processor::TickOutcome;
use super::queue::QueueStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainDecision {
    Continue,
    Stop,
}

/// Decide whether to chain another tick.
///
/// A job still `processing` keeps going. Anything else (terminal, healed, waiting
/// for a retry, lost to a conflict) continues only when other jobs are claimable,
/// so a failing batch is not hammered in a tight loop.
pub fn decide(outcome: &TickOutcome, others_claimable: i64) -> ChainDecision {
    match outcome {
        TickOutcome::Idle => ChainDecision::Stop,
        TickOutcome::Advanced {
            status: JobStatus::Processing,
            ..
        } => ChainDecision::Continue,
        _ if others_claimable > 0 => ChainDecision::Continue,
        _ => ChainDecision::Stop,
    }
}

pub struct Dispatcher {
    store: Arc<dyn QueueStore>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    pub async fn after_tick(&self, outcome: &TickOutcome) -> Result<ChainDecision> {
        let others = match outcome {
            TickOutcome::Idle
            | TickOutcome::Advanced {
                status: JobStatus::Processing,
                ..
            } => 0,
            _ => self.store.count_claimable(outcome.job_id()).await?,
        };

        let decision = decide(outcome, others);
        debug!(outcome = ?outcome, others_claimable = others, decision = ?decision, "dispatch decision");
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn advanced(status: JobStatus) -> TickOutcome {
        TickOutcome::Advanced {
            job_id: Uuid::new_v4(),
            batch_index: 4,
            total_units: 16,
            status,
        }
    }

    #[test]
    fn idle_stops() {
        assert_eq!(decide(&TickOutcome::Idle, 5), ChainDecision::Stop);
    }

    #[test]
    fn processing_job_continues_regardless_of_backlog() {
        assert_eq!(decide(&advanced(JobStatus::Processing), 0), ChainDecision::Continue);
    }

    #[test]
    fn completed_job_continues_only_with_other_work() {
        assert_eq!(decide(&advanced(JobStatus::Completed), 2), ChainDecision::Continue);
        assert_eq!(decide(&advanced(JobStatus::Completed), 0), ChainDecision::Stop);
    }

    #[test]
    fn healed_and_conflict_follow_backlog() {
        let healed = TickOutcome::Healed {
            job_id: Uuid::new_v4(),
        };
        let conflict = TickOutcome::Conflict {
            job_id: Uuid::new_v4(),
        };
        assert_eq!(decide(&healed, 1), ChainDecision::Continue);
        assert_eq!(decide(&conflict, 0), ChainDecision::Stop);
    }

    #[test]
    fn failed_batch_does_not_immediately_retry_alone() {
        let retrying = TickOutcome::Retrying {
            job_id: Uuid::new_v4(),
            retry_count: 1,
            status: JobStatus::Pending,
        };
        assert_eq!(decide(&retrying, 0), ChainDecision::Stop);
        assert_eq!(decide(&retrying, 1), ChainDecision::Continue);
    }
}
