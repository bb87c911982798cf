// HTTP routes
pub mod collection;
pub mod health;
pub mod queue;
pub mod stream;
pub mod trigger;

pub use collection::*;
pub use health::*;
pub use queue::*;
pub use stream::*;
pub use trigger::*;
