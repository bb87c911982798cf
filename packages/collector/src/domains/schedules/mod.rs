//! Schedules domain - recurring collection configurations and the trigger that
//! turns them into queue jobs.

pub mod models;
pub mod trigger;

pub use trigger::{ScheduleTrigger, SkipReason, TriggerError, TriggerReport, TriggerRequest};
