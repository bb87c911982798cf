//! Collection domain - provider fan-out for queue jobs, onboarding sessions and refreshes.
//!
//! All three paths share `activities::collect_batch`: skip-existing check,
//! provider call under a timeout, idempotent upsert.

pub mod activities;
pub mod models;
