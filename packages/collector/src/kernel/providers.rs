//! Provider adapters and the registry the collectors select them from.
//!
//! Every AI backend sits behind a thin proxy endpoint that takes a prompt and
//! answers with text plus citations, so one HTTP adapter covers all of them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::traits::{BaseInsightGatherer, BaseProvider};
use crate::common::ProviderResponse;

/// Errors from the HTTP provider proxies.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Connection failed or the request timed out
    #[error("Network error: {0}")]
    Network(String),

    /// Non-2xx response from the proxy
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Unexpected response format
    #[error("Parse error: {0}")]
    Parse(String),

    /// The proxy answered with an empty response text
    #[error("Provider returned an empty response")]
    Empty,
}

// =============================================================================
// HTTP provider
// =============================================================================

#[derive(Serialize)]
struct InvokeBody<'a> {
    prompt: &'a str,
}

/// Provider adapter that POSTs the prompt to a per-provider proxy endpoint.
pub struct HttpProvider {
    key: String,
    endpoint: String,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(key: impl Into<String>, endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            key: key.into(),
            endpoint: endpoint.into(),
            client,
        })
    }
}

#[async_trait]
impl BaseProvider for HttpProvider {
    fn key(&self) -> &str {
        &self.key
    }

    async fn invoke(&self, prompt: &str) -> Result<ProviderResponse> {
        debug!(provider = %self.key, "invoking provider");

        let response = self
            .client
            .post(&self.endpoint)
            .json(&InvokeBody { prompt })
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let parsed: ProviderResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        if parsed.response_text.trim().is_empty() {
            return Err(ProviderError::Empty.into());
        }

        Ok(parsed)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Ordered set of providers, addressable by key.
///
/// Order matters: queue jobs address units as `(item, provider)` pairs by index.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn BaseProvider>>,
}

impl ProviderRegistry {
    pub fn new(providers: Vec<Arc<dyn BaseProvider>>) -> Self {
        Self { providers }
    }

    /// Build HTTP adapters for `(key, endpoint)` pairs.
    pub fn from_endpoints(endpoints: &[(String, String)], timeout: Duration) -> Result<Self> {
        let mut providers: Vec<Arc<dyn BaseProvider>> = Vec::with_capacity(endpoints.len());
        for (key, endpoint) in endpoints {
            providers.push(Arc::new(HttpProvider::new(key, endpoint, timeout)?));
        }
        info!(count = providers.len(), "provider registry built");
        Ok(Self { providers })
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn BaseProvider>> {
        self.providers.iter().find(|p| p.key() == key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.key().to_string()).collect()
    }

    pub fn all(&self) -> Vec<Arc<dyn BaseProvider>> {
        self.providers.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Providers for `keys`, in the order given. Unknown keys are returned separately.
    pub fn select(&self, keys: &[String]) -> (Vec<Arc<dyn BaseProvider>>, Vec<String>) {
        let mut found: Vec<Arc<dyn BaseProvider>> = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for key in keys {
            match self.get(key) {
                Some(provider) if !found.iter().any(|p| p.key() == key.as_str()) => {
                    found.push(provider)
                }
                Some(_) => {}
                None => missing.push(key.clone()),
            }
        }
        (found, missing)
    }
}

// =============================================================================
// Insight gatherers
// =============================================================================

#[derive(Serialize)]
struct GatherBody {
    entity_id: Uuid,
}

/// Phase-1 gatherer backed by an HTTP endpoint.
pub struct HttpInsightGatherer {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpInsightGatherer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl BaseInsightGatherer for HttpInsightGatherer {
    async fn gather(&self, entity_id: Uuid) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&GatherBody { entity_id })
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            }
            .into());
        }
        Ok(())
    }
}

/// Gatherer used when no insights endpoint is configured.
pub struct NoopInsightGatherer;

#[async_trait]
impl BaseInsightGatherer for NoopInsightGatherer {
    async fn gather(&self, entity_id: Uuid) -> Result<()> {
        warn!(entity_id = %entity_id, "no insights endpoint configured, skipping phase 1");
        Ok(())
    }
}
