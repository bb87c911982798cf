pub mod collect_batch;
pub mod queue_batch;
pub mod refresh;
pub mod session;

pub use collect_batch::{BatchOutcome, NoopObserver, UnitCollector, UnitFailure, UnitObserver, UnitResult};
pub use queue_batch::CollectionBatchExecutor;
pub use refresh::{
    ItemSelection, OnDemandRefresh, RefreshError, RefreshMode, RefreshReport, RefreshRequest,
};
pub use session::{CollectionSession, SessionReport};
