use crate::cli::Cli;
use crate::error::{Error, Result};
use crate::k8s::cache::errors::invalid_config_error;
use crate::k8s::cache::{ClusterStateConfig, EventStreamConfig};
use std::time::Duration;

/// Runtime configuration of the enrichment subsystem
#[derive(Debug, Clone)]
pub struct EnricherConfig {
    pub node_name: String,
    pub cluster_state: ClusterStateConfig,
    pub events: EventStreamConfig,
    pub log_level: String,
    pub resolve_pids: Vec<u32>,
}

impl EnricherConfig {
    /// # Errors
    ///
    /// Returns an error naming the first invalid field
    pub fn validate(&self) -> Result<()> {
        if self.node_name.trim().is_empty() {
            return Err(invalid_config_error("node_name", "must not be empty"));
        }
        if self.cluster_state.url.trim().is_empty() {
            return Err(invalid_config_error("watcher_url", "must not be empty"));
        }
        if self.cluster_state.timeout.is_zero() {
            return Err(invalid_config_error("fetch_timeout_secs", "must be greater than 0"));
        }
        if self.events.channel.trim().is_empty() {
            return Err(invalid_config_error("redis_channel", "must not be empty"));
        }
        Ok(())
    }
}

impl TryFrom<Cli> for EnricherConfig {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let config = Self {
            node_name: cli.node_name,
            cluster_state: ClusterStateConfig {
                url: cli.watcher_url,
                timeout: Duration::from_secs(cli.fetch_timeout_secs),
                retry_attempts: cli.retry_attempts,
                retry_backoff: Duration::from_millis(cli.retry_backoff_ms),
            },
            events: EventStreamConfig {
                host: cli.redis_host,
                port: cli.redis_port,
                channel: cli.redis_channel,
            },
            log_level: cli.log_level,
            resolve_pids: cli.resolve_pids,
        };
        config.validate()?;
        Ok(config)
    }
}
