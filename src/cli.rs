use crate::k8s::cache::config::{
    DEFAULT_EVENT_CHANNEL, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_REDIS_HOST, DEFAULT_REDIS_PORT,
    DEFAULT_RETRY_ATTEMPTS, INITIAL_RETRY_BACKOFF_MS,
};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Kubernetes pod identity for container IDs seen on this node", long_about = None)]
pub struct Cli {
    /// Name of the node this agent runs on
    #[arg(long, env = "NODE_NAME")]
    pub node_name: String,

    /// Base URL of the cluster state service
    #[arg(long, env = "K8S_WATCHER_URL")]
    pub watcher_url: String,

    /// Timeout for one cluster state request, in seconds
    #[arg(long, env = "K8S_WATCHER_TIMEOUT_SECS", default_value_t = DEFAULT_FETCH_TIMEOUT_SECS)]
    pub fetch_timeout_secs: u64,

    /// Extra attempts after a failed cluster state request
    #[arg(long, env = "K8S_WATCHER_RETRY_ATTEMPTS", default_value_t = DEFAULT_RETRY_ATTEMPTS)]
    pub retry_attempts: u32,

    /// Delay before the first retry, in milliseconds
    #[arg(long, env = "K8S_WATCHER_RETRY_BACKOFF_MS", default_value_t = INITIAL_RETRY_BACKOFF_MS)]
    pub retry_backoff_ms: u64,

    #[arg(long, env = "REDIS_HOST", default_value = DEFAULT_REDIS_HOST)]
    pub redis_host: String,

    #[arg(long, env = "REDIS_PORT", default_value_t = DEFAULT_REDIS_PORT)]
    pub redis_port: u16,

    /// Pub/sub channel carrying change events
    #[arg(long, env = "REDIS_CHANNEL", default_value = DEFAULT_EVENT_CHANNEL)]
    pub redis_channel: String,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Resolve these process IDs to pods once bootstrap completes
    #[arg(long = "resolve-pid")]
    pub resolve_pids: Vec<u32>,
}
