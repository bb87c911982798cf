use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    /// Provider key → proxy endpoint, in query order
    pub provider_endpoints: Vec<(String, String)>,
    pub insights_url: Option<String>,
    pub provider_timeout: Duration,
    pub queue: QueueSettings,
    pub worker: WorkerSettings,
}

/// Queue shape: how many units a job has and how much of it one tick executes.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub batch_size: i32,
    pub units_per_job: i32,
    pub max_retries: i32,
    pub lease_duration: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            batch_size: 1,
            units_per_job: 16,
            max_retries: 3,
            lease_duration: Duration::from_millis(300_000),
        }
    }
}

impl QueueSettings {
    /// Reject shapes the queue cannot run safely.
    ///
    /// Leases are not renewed mid-batch, so a lease shorter than a worst-case
    /// batch (every unit hitting the provider timeout) lets a second worker
    /// reclaim a live job and repeat its provider calls.
    pub fn validate(&self, provider_timeout: Duration) -> Result<()> {
        if self.batch_size < 1 || self.units_per_job < 1 {
            bail!("QUEUE_BATCH_SIZE and QUEUE_UNITS_PER_JOB must be positive");
        }
        let worst_batch = provider_timeout
            .checked_mul(u32::try_from(self.batch_size)?)
            .context("QUEUE_BATCH_SIZE x PROVIDER_TIMEOUT_SECS overflows")?;
        if self.lease_duration < worst_batch {
            bail!(
                "QUEUE_LEASE_MS ({} ms) must cover QUEUE_BATCH_SIZE x PROVIDER_TIMEOUT_SECS ({} ms)",
                self.lease_duration.as_millis(),
                worst_batch.as_millis()
            );
        }
        Ok(())
    }
}

/// Budget for a single worker wake.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub max_ticks_per_wake: u32,
    pub wake_budget: Duration,
    pub poll_interval: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            max_ticks_per_wake: 25,
            wake_budget: Duration::from_secs(240),
            poll_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let provider_timeout = Duration::from_secs(env_or("PROVIDER_TIMEOUT_SECS", 60)?);
        let queue = QueueSettings {
            batch_size: env_or("QUEUE_BATCH_SIZE", 1)?,
            units_per_job: env_or("QUEUE_UNITS_PER_JOB", 16)?,
            max_retries: env_or("QUEUE_MAX_RETRIES", 3)?,
            lease_duration: Duration::from_millis(env_or("QUEUE_LEASE_MS", 300_000)?),
        };
        queue.validate(provider_timeout)?;

        let worker = WorkerSettings {
            max_ticks_per_wake: env_or("WORKER_MAX_TICKS", 25)?,
            wake_budget: Duration::from_secs(env_or("WORKER_BUDGET_SECS", 240)?),
            poll_interval: Duration::from_secs(env_or("WORKER_POLL_SECS", 60)?),
        };

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env_or("PORT", 8080)?,
            provider_endpoints: parse_provider_endpoints(
                &env::var("PROVIDER_ENDPOINTS").unwrap_or_default(),
            )?,
            insights_url: env::var("INSIGHTS_URL").ok().filter(|s| !s.is_empty()),
            provider_timeout,
            queue,
            worker,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

/// Parse `key=url,key=url` into ordered pairs.
pub fn parse_provider_endpoints(raw: &str) -> Result<Vec<(String, String)>> {
    let mut endpoints: Vec<(String, String)> = Vec::new();

    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((key, url)) = entry.split_once('=') else {
            bail!("PROVIDER_ENDPOINTS entry '{}' is not key=url", entry);
        };
        let key = key.trim();
        let url = url.trim();
        url::Url::parse(url).with_context(|| format!("invalid endpoint for provider {}", key))?;

        if endpoints.iter().any(|(existing, _)| existing == key) {
            bail!("provider '{}' configured twice", key);
        }
        endpoints.push((key.to_string(), url.to_string()));
    }

    Ok(endpoints)
}
