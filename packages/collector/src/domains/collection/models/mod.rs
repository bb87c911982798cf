pub mod entity_status;
pub mod metrics;
pub mod response_record;
pub mod work_item;

pub use entity_status::{
    EntityCollectionStatus, EntityStatusStore, PostgresEntityStatusStore, SessionStatus,
    NOT_STARTED_LABEL,
};
pub use metrics::ResponseMetrics;
pub use response_record::{NewResponse, PostgresResponseSink, UpsertOutcome};
pub use work_item::{PostgresWorkItemSource, WorkItem};
