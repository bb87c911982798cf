use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::PgPool;
use typed_builder::TypedBuilder;
use uuid::Uuid;

use crate::kernel::jobs::{insert_jobs, JobScope, QueueJob, ScopeValue};

/// Named list of values to cross-product (e.g. `industry: [fintech, retail]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeDimension {
    pub name: String,
    pub values: Vec<String>,
}

/// Recurring monthly collection run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
#[builder(field_defaults(setter(into)))]
pub struct CollectionConfiguration {
    #[builder(default = Uuid::now_v7())]
    pub id: Uuid,
    pub name: String,
    /// 1-31; days past the end of a month fire on its last day
    pub day_of_month: i32,
    /// 0-23, UTC
    pub hour_of_day: i32,
    pub dimensions: Json<Vec<ScopeDimension>>,
    pub providers: Json<Vec<String>>,
    #[builder(default = true)]
    pub active: bool,
    #[builder(default, setter(strip_option))]
    pub last_run_at: Option<DateTime<Utc>>,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

impl CollectionConfiguration {
    /// Whether the schedule matches this hour.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let last_day = days_in_month(now.year(), now.month());
        let day = u32::try_from(self.day_of_month.max(1))
            .unwrap_or(1)
            .min(last_day);
        now.day() == day && i64::from(now.hour()) == i64::from(self.hour_of_day)
    }

    /// Already run during `now`'s calendar month.
    pub fn ran_this_month(&self, now: DateTime<Utc>) -> bool {
        self.last_run_at
            .is_some_and(|t| t.year() == now.year() && t.month() == now.month())
    }

    /// How a job of `units_per_job` row-major units covers this configuration's
    /// items: `(full_items, leftover_units)`. Leftover units reach only the first
    /// providers of one more item; items past that are never collected.
    pub fn unit_coverage(&self, units_per_job: i32) -> (i32, i32) {
        let per_item = i32::try_from(self.providers.0.len()).unwrap_or(i32::MAX);
        if per_item == 0 {
            return (0, 0);
        }
        (units_per_job / per_item, units_per_job % per_item)
    }

    /// One scope per combination of dimension values. Empty if any list is empty.
    pub fn expand_scopes(&self) -> Vec<JobScope> {
        let dimensions = &self.dimensions.0;
        if dimensions.is_empty() || dimensions.iter().any(|d| d.values.is_empty()) {
            return Vec::new();
        }

        let mut combinations: Vec<Vec<ScopeValue>> = vec![Vec::new()];
        for dimension in dimensions {
            combinations = combinations
                .into_iter()
                .flat_map(|prefix| {
                    dimension.values.iter().map(move |value| {
                        let mut combo = prefix.clone();
                        combo.push(ScopeValue {
                            dimension: dimension.name.clone(),
                            value: value.clone(),
                        });
                        combo
                    })
                })
                .collect();
        }

        combinations
            .into_iter()
            .map(|values| JobScope {
                values,
                providers: self.providers.0.clone(),
            })
            .collect()
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .and_then(|d| d.pred_opt())
        .map(|d| d.day())
        .unwrap_or(28)
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn find_active(&self) -> Result<Vec<CollectionConfiguration>>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CollectionConfiguration>>;

    /// Record a run at `at` and persist its jobs as one atomic step.
    ///
    /// Unless `forced`, the claim only succeeds when the configuration has not
    /// already run during `at`'s calendar month (UTC). Returns `None` when the
    /// claim lost, in which case nothing was written.
    async fn claim_and_enqueue(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        forced: bool,
        jobs: Vec<QueueJob>,
    ) -> Result<Option<Vec<QueueJob>>>;
}

pub struct PostgresConfigStore {
    pool: PgPool,
}

impl PostgresConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConfigStore for PostgresConfigStore {
    async fn find_active(&self) -> Result<Vec<CollectionConfiguration>> {
        sqlx::query_as::<_, CollectionConfiguration>(
            "SELECT * FROM collection_configs WHERE active = true ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<CollectionConfiguration>> {
        sqlx::query_as::<_, CollectionConfiguration>(
            "SELECT * FROM collection_configs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Into::into)
    }

    async fn claim_and_enqueue(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
        forced: bool,
        jobs: Vec<QueueJob>,
    ) -> Result<Option<Vec<QueueJob>>> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE collection_configs
            SET last_run_at = $2, updated_at = NOW()
            WHERE id = $1
              AND (
                  $3
                  OR last_run_at IS NULL
                  OR date_trunc('month', last_run_at AT TIME ZONE 'UTC')
                     <> date_trunc('month', $2::timestamptz AT TIME ZONE 'UTC')
              )
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(forced)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        let inserted = insert_jobs(&mut *tx, &jobs).await?;
        tx.commit().await?;
        Ok(Some(inserted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(day: i32, hour: i32) -> CollectionConfiguration {
        CollectionConfiguration::builder()
            .name("Monthly benchmark")
            .day_of_month(day)
            .hour_of_day(hour)
            .dimensions(Json(vec![
                ScopeDimension {
                    name: "industry".to_string(),
                    values: vec!["fintech".to_string(), "retail".to_string()],
                },
                ScopeDimension {
                    name: "region".to_string(),
                    values: vec!["emea".to_string(), "na".to_string()],
                },
            ]))
            .providers(Json(vec!["chatgpt".to_string(), "claude".to_string()]))
            .build()
    }

    #[test]
    fn due_only_on_matching_day_and_hour() {
        let config = config(5, 9);
        assert!(config.is_due(Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap()));
        assert!(!config.is_due(Utc.with_ymd_and_hms(2026, 3, 5, 10, 0, 0).unwrap()));
        assert!(!config.is_due(Utc.with_ymd_and_hms(2026, 3, 6, 9, 0, 0).unwrap()));
    }

    #[test]
    fn day_past_month_end_fires_on_last_day() {
        let config = config(31, 0);
        assert!(config.is_due(Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap()));
        assert!(config.is_due(Utc.with_ymd_and_hms(2028, 2, 29, 0, 0, 0).unwrap()));
        assert!(config.is_due(Utc.with_ymd_and_hms(2026, 4, 30, 0, 0, 0).unwrap()));
        assert!(!config.is_due(Utc.with_ymd_and_hms(2026, 4, 29, 0, 0, 0).unwrap()));
    }

    #[test]
    fn ran_this_month_compares_calendar_month() {
        let mut config = config(5, 9);
        assert!(!config.ran_this_month(Utc::now()));

        config.last_run_at = Some(Utc.with_ymd_and_hms(2026, 3, 5, 9, 0, 0).unwrap());
        assert!(config.ran_this_month(Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).unwrap()));
        assert!(!config.ran_this_month(Utc.with_ymd_and_hms(2026, 4, 5, 9, 0, 0).unwrap()));
        assert!(!config.ran_this_month(Utc.with_ymd_and_hms(2027, 3, 5, 9, 0, 0).unwrap()));
    }

    #[test]
    fn unit_coverage_reports_partial_last_item() {
        let mut config = config(5, 9);
        assert_eq!(config.unit_coverage(16), (8, 0));

        config.providers.0.push("perplexity".to_string());
        assert_eq!(config.unit_coverage(16), (5, 1));

        config.providers.0.clear();
        assert_eq!(config.unit_coverage(16), (0, 0));
    }

    #[test]
    fn two_by_two_dimensions_expand_to_four_scopes() {
        let scopes = config(5, 9).expand_scopes();
        assert_eq!(scopes.len(), 4);
        assert_eq!(scopes[0].key(), "industry=fintech|region=emea");
        assert_eq!(scopes[3].key(), "industry=retail|region=na");
        assert!(scopes.iter().all(|s| s.providers.len() == 2));
    }

    #[test]
    fn empty_value_list_expands_to_nothing() {
        let mut config = config(5, 9);
        config.dimensions.0[1].values.clear();
        assert!(config.expand_scopes().is_empty());

        config.dimensions.0.clear();
        assert!(config.expand_scopes().is_empty());
    }
}
