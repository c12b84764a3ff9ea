/**
 * Container identity enrichment service
 *
 * Bootstraps the container index from one cluster state fetch, then keeps it current
 * from a change event stream on a single background task. That task is the only
 * writer; lookups go straight to the shared index.
 */
use super::container_index::ContainerIndex;
use super::errors::{stream_closed_error, terminal_state_error};
use super::event_source::ChangeEventSource;
use super::fetcher::ClusterStateSource;
use super::reconciler::{ReconcileSummary, Reconciler};
use crate::error::{Error, Result};
use crate::k8s::matcher::IdentifierMatcher;
use crate::k8s::model::ChangeEvent;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};

/// Lifecycle of one service instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Bootstrapping,
    Streaming,
    /// Terminal: the index is frozen and may go stale
    Failed,
    /// Terminal: cancelled from outside
    Stopped,
}

impl ServiceState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }
}

#[derive(Debug, Default)]
struct ReconcileCounters {
    events_received: AtomicU64,
    events_applied: AtomicU64,
    decode_errors: AtomicU64,
    refreshes: AtomicU64,
    refresh_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub events_received: u64,
    pub events_applied: u64,
    pub decode_errors: u64,
    pub refreshes: u64,
    pub refresh_failures: u64,
}

impl ReconcileCounters {
    fn snapshot(&self) -> ReconcileStats {
        ReconcileStats {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_applied: self.events_applied.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            refresh_failures: self.refresh_failures.load(Ordering::Relaxed),
        }
    }
}

pub struct EnrichmentService {
    reconciler: Arc<Reconciler>,
    state_source: Arc<dyn ClusterStateSource>,
    state_tx: watch::Sender<ServiceState>,
    counters: Arc<ReconcileCounters>,
}

impl EnrichmentService {
    #[must_use]
    pub fn new(
        node_name: impl Into<String>,
        state_source: Arc<dyn ClusterStateSource>,
        matcher: Arc<dyn IdentifierMatcher>,
    ) -> Self {
        let index = Arc::new(ContainerIndex::new());
        let (state_tx, _) = watch::channel(ServiceState::Bootstrapping);
        Self {
            reconciler: Arc::new(Reconciler::new(index, matcher, node_name)),
            state_source,
            state_tx,
            counters: Arc::new(ReconcileCounters::default()),
        }
    }

    #[must_use]
    pub fn index(&self) -> Arc<ContainerIndex> {
        Arc::clone(self.reconciler.index())
    }

    #[must_use]
    pub fn node_name(&self) -> &str {
        self.reconciler.node_name()
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_tx.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ServiceState> {
        self.state_tx.subscribe()
    }

    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.counters.snapshot()
    }

    fn set_state(&self, state: ServiceState) {
        self.state_tx.send_replace(state);
    }

    fn fail(&self, e: Error) -> Error {
        error!("❌ enrichment for node {} failed: {}", self.node_name(), e);
        self.set_state(ServiceState::Failed);
        e
    }

    /// Fetch cluster state once and index the local node's containers.
    ///
    /// # Errors
    ///
    /// Returns the fetch error; the service is then `Failed`. A service that already
    /// reached a terminal state is refused and stays as it is.
    pub async fn bootstrap(&self) -> Result<ReconcileSummary> {
        let state = self.state();
        if state.is_terminal() {
            return Err(terminal_state_error(&format!("{state:?}"), "bootstrap"));
        }
        self.set_state(ServiceState::Bootstrapping);
        let entities = match self.state_source.fetch(self.node_name()).await {
            Ok(entities) => entities,
            Err(e) => return Err(self.fail(e)),
        };

        let summary = self.reconciler.apply_state(&entities);
        info!(
            "🚀 bootstrap complete for node {}: {} containers indexed from {} entities",
            self.node_name(),
            summary.upserted,
            entities.len()
        );
        self.log_index();
        Ok(summary)
    }

    fn log_index(&self) {
        if !tracing::enabled!(Level::DEBUG) {
            return;
        }
        for (key, record) in self.reconciler.index().snapshot() {
            debug!(
                key = %key,
                pod = %record.name,
                namespace = %record.namespace,
                containers = ?record.containers,
                "index entry"
            );
        }
    }

    /// Bootstrap, then stream `events` on a background task.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap error; no task is started in that case.
    pub async fn start<E>(self, events: E, cancel: CancellationToken) -> Result<EnrichmentHandle>
    where
        E: ChangeEventSource + 'static,
    {
        self.bootstrap().await?;
        Ok(self.spawn_streaming(events, cancel))
    }

    /// Only called once bootstrap has succeeded.
    fn spawn_streaming<E>(self, events: E, cancel: CancellationToken) -> EnrichmentHandle
    where
        E: ChangeEventSource + 'static,
    {
        self.set_state(ServiceState::Streaming);
        let index = self.index();
        let state_rx = self.subscribe_state();
        let counters = Arc::clone(&self.counters);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move { self.run_stream(events, task_cancel).await });

        EnrichmentHandle {
            index,
            state_rx,
            counters,
            cancel,
            task,
        }
    }

    async fn run_stream<E>(&self, mut events: E, cancel: CancellationToken) -> Result<()>
    where
        E: ChangeEventSource,
    {
        info!("📡 streaming change events for node {}", self.node_name());

        loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = events.recv() => received,
            };

            match received {
                Ok(Some(payload)) => {
                    if self.handle_payload(&payload, &cancel).await.is_break() {
                        break;
                    }
                }
                Ok(None) => return Err(self.fail(stream_closed_error("event source exhausted"))),
                Err(e) => return Err(self.fail(e)),
            }
        }

        info!("🛑 change event stream for node {} cancelled", self.node_name());
        self.set_state(ServiceState::Stopped);
        Ok(())
    }

    async fn handle_payload(&self, payload: &str, cancel: &CancellationToken) -> ControlFlow<()> {
        self.counters.events_received.fetch_add(1, Ordering::Relaxed);

        let event = match ChangeEvent::from_payload(payload) {
            Ok(event) => event,
            Err(e) => {
                self.counters.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("⚠️  dropping malformed change event: {}", e);
                return ControlFlow::Continue(());
            }
        };

        match event {
            ChangeEvent::Refresh => {
                let fetched = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return ControlFlow::Break(()),
                    fetched = self.state_source.fetch(self.node_name()) => fetched,
                };
                self.counters.refreshes.fetch_add(1, Ordering::Relaxed);
                match fetched {
                    Ok(entities) => {
                        self.reconciler.resync(&entities);
                    }
                    Err(e) => {
                        self.counters.refresh_failures.fetch_add(1, Ordering::Relaxed);
                        warn!("⚠️  refresh failed, keeping current index: {}", e);
                    }
                }
            }
            event => {
                let summary = self.reconciler.apply_event(&event);
                debug!(
                    kind = event.kind(),
                    upserted = summary.upserted,
                    removed = summary.removed,
                    "change event applied"
                );
            }
        }

        self.counters.events_applied.fetch_add(1, Ordering::Relaxed);
        ControlFlow::Continue(())
    }
}

/// Handle to a running enrichment service
pub struct EnrichmentHandle {
    index: Arc<ContainerIndex>,
    state_rx: watch::Receiver<ServiceState>,
    counters: Arc<ReconcileCounters>,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl EnrichmentHandle {
    #[must_use]
    pub fn index(&self) -> Arc<ContainerIndex> {
        Arc::clone(&self.index)
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.counters.snapshot()
    }

    /// Token that stops the streaming task when cancelled
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait until the service reaches a terminal state
    pub async fn terminated(&mut self) -> ServiceState {
        let reached = self
            .state_rx
            .wait_for(|state| state.is_terminal())
            .await
            .map(|state| *state);
        // Sender gone: the task has exited, keep its last published state
        reached.unwrap_or_else(|_| *self.state_rx.borrow())
    }

    /// Wait for the streaming task to end and return its outcome
    ///
    /// # Errors
    ///
    /// Returns the stream error, or an error if the task panicked
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(Error::Custom(format!("enrichment task failed: {e}"))),
        }
    }

    /// Cancel the streaming task and wait for it to finish
    ///
    /// # Errors
    ///
    /// Returns an error if the task had already failed
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!ServiceState::Bootstrapping.is_terminal());
        assert!(!ServiceState::Streaming.is_terminal());
        assert!(ServiceState::Failed.is_terminal());
        assert!(ServiceState::Stopped.is_terminal());
    }
}
