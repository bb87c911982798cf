//! Kernel module - queue infrastructure, provider adapters and dependencies.

pub mod deps;
pub mod jobs;
pub mod progress_hub;
pub mod providers;
pub mod scheduled_tasks;
pub mod test_dependencies;
pub mod traits;

pub use deps::CollectorDeps;
pub use progress_hub::{ProgressHub, StreamEvent};
pub use providers::{HttpProvider, ProviderError, ProviderRegistry};
pub use scheduled_tasks::start_scheduler;
pub use test_dependencies::TestDependencies;
pub use traits::*;
