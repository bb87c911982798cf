//! Fixtures: scopes, queue jobs, configurations and timestamps.

use chrono::{DateTime, TimeZone, Utc};
use sqlx::types::Json;
use uuid::Uuid;

use collector_core::domains::schedules::models::{CollectionConfiguration, ScopeDimension};
use collector_core::kernel::jobs::{JobScope, QueueJob, ScopeValue};

pub const CHATGPT: &str = "chatgpt";
pub const PERPLEXITY: &str = "perplexity";

/// Single-dimension scope, e.g. `industry=fintech`.
pub fn industry_scope(industry: &str, providers: &[&str]) -> JobScope {
    JobScope {
        values: vec![ScopeValue {
            dimension: "industry".to_string(),
            value: industry.to_string(),
        }],
        providers: providers.iter().map(|p| p.to_string()).collect(),
    }
}

/// Fresh pending job for `scope` with `total_units` units.
pub fn pending_job(scope: JobScope, total_units: i32) -> QueueJob {
    QueueJob::for_scope(Uuid::new_v4(), scope, total_units)
}

pub fn dimension(name: &str, values: &[&str]) -> ScopeDimension {
    ScopeDimension {
        name: name.to_string(),
        values: values.iter().map(|v| v.to_string()).collect(),
    }
}

/// Active monthly configuration.
pub fn monthly_config(
    day_of_month: i32,
    hour_of_day: i32,
    dimensions: Vec<ScopeDimension>,
    providers: &[&str],
) -> CollectionConfiguration {
    CollectionConfiguration::builder()
        .name("Monthly perception check")
        .day_of_month(day_of_month)
        .hour_of_day(hour_of_day)
        .dimensions(Json(dimensions))
        .providers(Json(providers.iter().map(|p| p.to_string()).collect::<Vec<_>>()))
        .build()
}

/// UTC timestamp on the hour.
pub fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}
