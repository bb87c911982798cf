// Common types shared across the queue, the session and the refresh paths

pub mod progress;
pub mod types;

pub use progress::CollectionProgress;
pub use types::*;
