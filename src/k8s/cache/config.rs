/**
 * Configuration constants for the container index and its transports
 */
/// Default timeout for one cluster state request
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Default number of extra attempts after a failed cluster state request
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

/// Initial backoff between cluster state attempts, in milliseconds
pub const INITIAL_RETRY_BACKOFF_MS: u64 = 500;

/// Maximum backoff between cluster state attempts
pub const MAX_RETRY_BACKOFF_SECS: u64 = 30;

/// Path of the node-scoped pod listing on the cluster state service
pub const PODS_PATH: &str = "/api/v1/k8s/pods";

/// Pub/sub channel carrying change events
pub const DEFAULT_EVENT_CHANNEL: &str = "k8s-events";

pub const DEFAULT_REDIS_HOST: &str = "127.0.0.1";
pub const DEFAULT_REDIS_PORT: u16 = 6379;

/// Capacity of in-process event channels
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Validate configuration constants at compile time
const _: () = {
    assert!(DEFAULT_FETCH_TIMEOUT_SECS > 0, "DEFAULT_FETCH_TIMEOUT_SECS must be greater than 0");
    assert!(INITIAL_RETRY_BACKOFF_MS > 0, "INITIAL_RETRY_BACKOFF_MS must be greater than 0");
    assert!(
        MAX_RETRY_BACKOFF_SECS * 1000 >= INITIAL_RETRY_BACKOFF_MS,
        "MAX_RETRY_BACKOFF_SECS must not be below the initial backoff"
    );
    assert!(EVENT_CHANNEL_CAPACITY > 0, "EVENT_CHANNEL_CAPACITY must be greater than 0");
    assert!(DEFAULT_REDIS_PORT > 0, "DEFAULT_REDIS_PORT must be greater than 0");
};
