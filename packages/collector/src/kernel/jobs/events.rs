use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::JobStatus;

/// Queue job lifecycle events.
///
/// These are facts about what a processor tick did. They are published on the
/// progress hub's queue topic so observers in other tasks (SSE clients) can follow
/// the backlog without reading the jobs table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobEvent {
    /// A job was claimed by a worker for one batch.
    Claimed {
        job_id: Uuid,
        worker_id: String,
        batch_index: i32,
        total_units: i32,
    },

    /// A batch succeeded and the cursor advanced.
    BatchSucceeded {
        job_id: Uuid,
        batch_index: i32,
        total_units: i32,
        status: JobStatus,
    },

    /// A batch failed; the cursor did not move.
    BatchFailed {
        job_id: Uuid,
        retry_count: i32,
        will_retry: bool,
    },

    /// A job whose cursor was already at the end was marked completed.
    Healed { job_id: Uuid },

    /// The write-back lost to another owner of the same job.
    LeaseConflict { job_id: Uuid },

    /// A failed job was reset for another attempt.
    Reset { job_id: Uuid },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Claimed { job_id, .. }
            | JobEvent::BatchSucceeded { job_id, .. }
            | JobEvent::BatchFailed { job_id, .. }
            | JobEvent::Healed { job_id }
            | JobEvent::LeaseConflict { job_id }
            | JobEvent::Reset { job_id } => *job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_with_kind_tag() {
        let event = JobEvent::BatchFailed {
            job_id: Uuid::new_v4(),
            retry_count: 2,
            will_retry: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "batch_failed");
        assert_eq!(json["retry_count"], 2);
    }

    #[test]
    fn job_id_is_available_for_every_variant() {
        let id = Uuid::new_v4();
        assert_eq!(JobEvent::Healed { job_id: id }.job_id(), id);
        assert_eq!(JobEvent::LeaseConflict { job_id: id }.job_id(), id);
    }
}
