// Employer Perception Tracker - Collection Core
//
// Collects responses from many AI-model providers for many prompts: the recurring
// job queue and its worker, the monthly schedule trigger, the resumable onboarding
// session and on-demand refresh.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
