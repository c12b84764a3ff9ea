use super::config::{
    DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_RETRY_ATTEMPTS, INITIAL_RETRY_BACKOFF_MS,
    MAX_RETRY_BACKOFF_SECS, PODS_PATH,
};
use crate::error::{Error, Result};
use crate::k8s::model::{Entity, StateResponse};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Request/response access to the full set of known cluster entities.
#[async_trait]
pub trait ClusterStateSource: Send + Sync {
    /// Fetch the entities the state service reports for `node_name`.
    ///
    /// # Errors
    ///
    /// Returns an error when the transport fails, times out, or the body cannot be
    /// decoded.
    async fn fetch(&self, node_name: &str) -> Result<Vec<Entity>>;
}

#[derive(Debug, Clone)]
pub struct ClusterStateConfig {
    /// Base URL of the cluster state service
    pub url: String,
    /// Timeout applied to every attempt
    pub timeout: Duration,
    /// Extra attempts after the first failure
    pub retry_attempts: u32,
    /// Delay before the first retry, doubled for each further one
    pub retry_backoff: Duration,
}

impl ClusterStateConfig {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_backoff: Duration::from_millis(INITIAL_RETRY_BACKOFF_MS),
        }
    }

    #[must_use]
    pub fn pods_url(&self) -> String {
        format!("{}{PODS_PATH}", self.url.trim_end_matches('/'))
    }
}

/// Fetches cluster state over HTTP, retrying with exponential backoff.
#[derive(Debug, Clone)]
pub struct HttpClusterStateSource {
    client: reqwest::Client,
    config: ClusterStateConfig,
}

impl HttpClusterStateSource {
    /// Build a source with a client bound to the configured timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed
    pub fn new(config: ClusterStateConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(crate::k8s::USER_AGENT)
            .build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub const fn config(&self) -> &ClusterStateConfig {
        &self.config
    }

    async fn fetch_once(&self, node_name: &str) -> Result<Vec<Entity>> {
        let response = self
            .client
            .get(self.config.pods_url())
            .query(&[("node", node_name)])
            .send()
            .await?
            .error_for_status()?;
        let state: StateResponse = response.json().await?;
        Ok(state.entities)
    }

    fn backoff_for(&self, retry: u32) -> Duration {
        let max = Duration::from_secs(MAX_RETRY_BACKOFF_SECS);
        self.config
            .retry_backoff
            .checked_mul(2_u32.saturating_pow(retry))
            .map_or(max, |delay| delay.min(max))
    }
}

#[async_trait]
impl ClusterStateSource for HttpClusterStateSource {
    async fn fetch(&self, node_name: &str) -> Result<Vec<Entity>> {
        let attempts = self.config.retry_attempts.saturating_add(1);
        info!(
            "🔍 fetching cluster state from {}?node={}",
            self.config.pods_url(),
            node_name
        );

        let mut attempt = 0;
        loop {
            attempt += 1;
            let start = Instant::now();
            match self.fetch_once(node_name).await {
                Ok(entities) => {
                    debug!(
                        entities = entities.len(),
                        elapsed_ms = start.elapsed().as_millis(),
                        attempt,
                        "cluster state fetched"
                    );
                    return Ok(entities);
                }
                Err(e) if attempt < attempts => {
                    let delay = self.backoff_for(attempt - 1);
                    warn!(
                        "🔄 cluster state fetch failed (attempt {}/{}): {}, retrying in {}ms",
                        attempt,
                        attempts,
                        e,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!("❌ cluster state fetch abandoned after {} attempt(s): {}", attempt, e);
                    return Err(Error::Bootstrap {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }
}
