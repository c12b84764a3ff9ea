/**
Process-wide access to the container index

`initialize` bootstraps the index for this node, starts streaming change events and
publishes the index so that any part of the process can resolve container IDs.
*/
use crate::config::EnricherConfig;
use crate::error::Result;
use crate::k8s::cache::errors::already_initialized_error;
use crate::k8s::cache::{
    ContainerIndex, EnrichmentHandle, EnrichmentService, HttpClusterStateSource,
    RedisEventSource,
};
use crate::k8s::matcher::{IdentifierMatcher, RuntimeIdMatcher};
use crate::k8s::model::PodRecord;
use crate::profiler::cgroup::extract_container_id;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Global index instance
static INDEX: OnceLock<Arc<ContainerIndex>> = OnceLock::new();
/// Matcher used to canonicalize raw container IDs before lookup
static MATCHER: OnceLock<Arc<dyn IdentifierMatcher>> = OnceLock::new();

/// Bootstrap the index for `config.node_name` and start streaming change events.
///
/// # Errors
///
/// Returns an error if the index is already initialized, if either transport cannot
/// be set up or if bootstrap fails
pub async fn initialize(config: &EnricherConfig) -> Result<EnrichmentHandle> {
    if INDEX.get().is_some() {
        return Err(already_initialized_error("container index"));
    }

    let matcher: Arc<dyn IdentifierMatcher> = Arc::new(RuntimeIdMatcher);
    let state_source = Arc::new(HttpClusterStateSource::new(config.cluster_state.clone())?);
    let events = RedisEventSource::connect(&config.events).await?;
    info!(
        "subscribed to change events on {} channel {}",
        config.events.redis_url(),
        config.events.channel
    );

    let service = EnrichmentService::new(
        config.node_name.clone(),
        state_source,
        Arc::clone(&matcher),
    );
    let handle = service.start(events, CancellationToken::new()).await?;

    if INDEX.set(handle.index()).is_err() {
        error!("Container index already initialized");
        handle.cancellation_token().cancel();
        return Err(already_initialized_error("container index"));
    }
    // INDEX is set exactly once, so MATCHER is still empty here
    let _ = MATCHER.set(matcher);

    info!("container index initialized for node {}", config.node_name);
    Ok(handle)
}

/// Get the global index instance
///
/// Returns None if `initialize` hasn't completed yet
#[must_use]
pub fn get_index() -> Option<Arc<ContainerIndex>> {
    INDEX.get().cloned()
}

/// Resolve a raw container ID, in any runtime-prefixed form, to its pod.
#[must_use]
pub fn lookup(raw_id: &str) -> Option<Arc<PodRecord>> {
    let index = INDEX.get()?;
    let key = MATCHER.get()?.match_id(raw_id)?;
    index.get(&key)
}

/// Resolve the pod running process `pid` through its cgroup membership.
///
/// # Errors
///
/// Returns an error if `/proc/<pid>/cgroup` cannot be read
pub fn lookup_pid(pid: u32) -> Result<Option<Arc<PodRecord>>> {
    let Some(container_id) = extract_container_id(pid)? else {
        debug!("pid {} is not in a container", pid);
        return Ok(None);
    };
    Ok(lookup(&container_id))
}
