use async_trait::async_trait;
use container_enricher::error::{Error, Result};
use container_enricher::k8s::cache::{
    ChannelEventSource, ClusterStateSource, ContainerIndex, EnrichmentHandle, EnrichmentService,
    ServiceState,
};
use container_enricher::k8s::matcher::RuntimeIdMatcher;
use container_enricher::k8s::model::{Container, Entity, PodRecord};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const WEB_ID: &str = "1111111111111111111111111111111111111111111111111111111111111111";
const DB_ID: &str = "2222222222222222222222222222222222222222222222222222222222222222";
const REMOTE_ID: &str = "3333333333333333333333333333333333333333333333333333333333333333";

/// Replies with queued responses in order, then fails every call
#[derive(Default)]
struct ScriptedStateSource {
    responses: Mutex<VecDeque<Result<Vec<Entity>>>>,
    calls: AtomicUsize,
}

impl ScriptedStateSource {
    fn new(responses: Vec<Result<Vec<Entity>>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ClusterStateSource for ScriptedStateSource {
    async fn fetch(&self, node_name: &str) -> Result<Vec<Entity>> {
        assert_eq!(node_name, "node-A");
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Custom("cluster state unavailable".to_string())))
    }
}

fn pod(name: &str, node: &str, containers: &[(&str, &str)]) -> PodRecord {
    PodRecord {
        name: name.to_string(),
        namespace: "default".to_string(),
        node_name: node.to_string(),
        containers: containers
            .iter()
            .map(|(id, name)| Container {
                id: format!("containerd://{id}"),
                name: (*name).to_string(),
            })
            .collect(),
        ips: vec!["10.0.0.7".to_string()],
        owner: None,
    }
}

fn web_pod() -> PodRecord {
    pod("web-1", "node-A", &[(WEB_ID, "web")])
}

fn modified(pod: &PodRecord) -> String {
    serde_json::json!({ "Modified": { "pod": pod } }).to_string()
}

fn deleted(pod: &PodRecord) -> String {
    serde_json::json!({ "Deleted": { "pod": pod } }).to_string()
}

fn refresh() -> String {
    serde_json::json!({ "Refresh": true }).to_string()
}

async fn start_service(
    source: Arc<ScriptedStateSource>,
) -> (mpsc::Sender<String>, EnrichmentHandle) {
    let service = EnrichmentService::new("node-A", source, Arc::new(RuntimeIdMatcher));
    let (tx, events) = ChannelEventSource::channel();
    let handle = service
        .start(events, CancellationToken::new())
        .await
        .expect("bootstrap should succeed");
    (tx, handle)
}

/// Wait until the streaming task has finished with `count` payloads, applied or dropped
async fn wait_for_events(handle: &EnrichmentHandle, count: u64) {
    timeout(Duration::from_secs(5), async {
        loop {
            let stats = handle.stats();
            if stats.events_applied + stats.decode_errors >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("events were not processed in time");
}

fn pod_name(index: &ContainerIndex, key: &str) -> Option<String> {
    index.get(key).map(|record| record.name.clone())
}

#[tokio::test]
async fn test_bootstrap_indexes_local_pods_only() {
    let source = ScriptedStateSource::new(vec![Ok(vec![
        Entity::pod(web_pod()),
        Entity::pod(pod("remote-1", "node-B", &[(REMOTE_ID, "remote")])),
    ])]);
    let (_tx, handle) = start_service(source).await;

    let index = handle.index();
    let record = index.get(WEB_ID).expect("web-1 should be indexed");
    assert_eq!(record.name, "web-1");
    assert_eq!(record.namespace, "default");
    assert_eq!(record.containers.len(), 1);
    assert_eq!(record.containers[0].name, "web");
    assert!(index.get(REMOTE_ID).is_none());
    assert_eq!(index.len(), 1);
    assert_eq!(handle.state(), ServiceState::Streaming);
}

#[tokio::test]
async fn test_bootstrap_failure_leaves_service_failed() {
    let source = ScriptedStateSource::new(vec![Err(Error::Custom("boom".to_string()))]);
    let service = EnrichmentService::new("node-A", source, Arc::new(RuntimeIdMatcher));

    assert!(service.bootstrap().await.is_err());
    assert_eq!(service.state(), ServiceState::Failed);
    assert!(service.index().is_empty());
}

#[tokio::test]
async fn test_failed_service_stays_failed() {
    let source = ScriptedStateSource::new(vec![
        Err(Error::Custom("boom".to_string())),
        Ok(vec![Entity::pod(web_pod())]),
    ]);
    let service = EnrichmentService::new(
        "node-A",
        Arc::clone(&source) as Arc<dyn ClusterStateSource>,
        Arc::new(RuntimeIdMatcher),
    );

    assert!(service.bootstrap().await.is_err());
    assert!(service.bootstrap().await.is_err());
    assert_eq!(service.state(), ServiceState::Failed);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);

    let index = service.index();
    let (tx, events) = ChannelEventSource::channel();
    assert!(service.start(events, CancellationToken::new()).await.is_err());
    // No streaming task was started, so the event has nowhere to go
    assert!(tx.send(modified(&web_pod())).await.is_err());
    assert!(index.is_empty());
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_start_surfaces_bootstrap_error() {
    let source = ScriptedStateSource::new(vec![]);
    let service = EnrichmentService::new("node-A", source, Arc::new(RuntimeIdMatcher));
    let (_tx, events) = ChannelEventSource::channel();

    let result = service.start(events, CancellationToken::new()).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_modified_then_deleted() {
    let source = ScriptedStateSource::new(vec![Ok(vec![])]);
    let (tx, handle) = start_service(source).await;
    let index = handle.index();

    tx.send(modified(&web_pod())).await.unwrap();
    wait_for_events(&handle, 1).await;
    assert_eq!(pod_name(&index, WEB_ID).as_deref(), Some("web-1"));

    tx.send(deleted(&web_pod())).await.unwrap();
    wait_for_events(&handle, 2).await;
    assert!(index.get(WEB_ID).is_none());
    assert!(index.is_empty());
}

#[tokio::test]
async fn test_remote_pod_events_are_ignored() {
    let source = ScriptedStateSource::new(vec![Ok(vec![Entity::pod(web_pod())])]);
    let (tx, handle) = start_service(source).await;

    tx.send(modified(&pod("remote-1", "node-B", &[(REMOTE_ID, "remote")])))
        .await
        .unwrap();
    wait_for_events(&handle, 1).await;

    let index = handle.index();
    assert!(index.get(REMOTE_ID).is_none());
    assert_eq!(index.len(), 1);
}

#[tokio::test]
async fn test_pod_moving_away_is_removed() {
    let source = ScriptedStateSource::new(vec![Ok(vec![Entity::pod(web_pod())])]);
    let (tx, handle) = start_service(source).await;

    tx.send(modified(&pod("web-1", "node-B", &[(WEB_ID, "web")])))
        .await
        .unwrap();
    wait_for_events(&handle, 1).await;

    assert!(handle.index().get(WEB_ID).is_none());
}

#[tokio::test]
async fn test_malformed_payloads_do_not_stop_streaming() {
    let source = ScriptedStateSource::new(vec![Ok(vec![])]);
    let (tx, handle) = start_service(source).await;

    tx.send("not json".to_string()).await.unwrap();
    tx.send("{}".to_string()).await.unwrap();
    tx.send(modified(&web_pod())).await.unwrap();
    wait_for_events(&handle, 3).await;

    let stats = handle.stats();
    assert_eq!(stats.decode_errors, 2);
    assert_eq!(stats.events_applied, 1);
    assert_eq!(handle.state(), ServiceState::Streaming);
    assert_eq!(pod_name(&handle.index(), WEB_ID).as_deref(), Some("web-1"));
}

#[tokio::test]
async fn test_replayed_events_are_idempotent() {
    let source = ScriptedStateSource::new(vec![Ok(vec![])]);
    let (tx, handle) = start_service(source).await;
    let db = pod("db-0", "node-A", &[(DB_ID, "postgres")]);

    tx.send(modified(&db)).await.unwrap();
    wait_for_events(&handle, 1).await;
    let once = handle.index().snapshot();

    tx.send(modified(&db)).await.unwrap();
    tx.send(deleted(&web_pod())).await.unwrap();
    wait_for_events(&handle, 3).await;

    assert_eq!(handle.index().snapshot(), once);
}

#[tokio::test]
async fn test_refresh_resyncs_index() {
    let db = pod("db-0", "node-A", &[(DB_ID, "postgres")]);
    let source = ScriptedStateSource::new(vec![
        Ok(vec![Entity::pod(web_pod())]),
        Ok(vec![Entity::pod(db)]),
    ]);
    let (tx, handle) = start_service(Arc::clone(&source)).await;

    tx.send(refresh()).await.unwrap();
    wait_for_events(&handle, 1).await;

    let index = handle.index();
    assert!(index.get(WEB_ID).is_none());
    assert_eq!(pod_name(&index, DB_ID).as_deref(), Some("db-0"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    assert_eq!(handle.stats().refreshes, 1);
}

#[tokio::test]
async fn test_failed_refresh_keeps_index() {
    let source = ScriptedStateSource::new(vec![Ok(vec![Entity::pod(web_pod())])]);
    let (tx, handle) = start_service(source).await;

    tx.send(refresh()).await.unwrap();
    wait_for_events(&handle, 1).await;

    assert_eq!(handle.stats().refresh_failures, 1);
    assert_eq!(handle.state(), ServiceState::Streaming);
    assert_eq!(pod_name(&handle.index(), WEB_ID).as_deref(), Some("web-1"));
}

#[tokio::test]
async fn test_closed_stream_fails_service() {
    let source = ScriptedStateSource::new(vec![Ok(vec![Entity::pod(web_pod())])]);
    let (tx, mut handle) = start_service(source).await;
    let index = handle.index();

    drop(tx);
    let state = timeout(Duration::from_secs(5), handle.terminated())
        .await
        .unwrap();
    assert_eq!(state, ServiceState::Failed);

    let result = handle.join().await;
    assert!(matches!(result, Err(Error::EventStreamClosed(_))));
    // Frozen, not cleared
    assert_eq!(pod_name(&index, WEB_ID).as_deref(), Some("web-1"));
}

#[tokio::test]
async fn test_cancel_stops_service() {
    let source = ScriptedStateSource::new(vec![Ok(vec![])]);
    let (_tx, mut handle) = start_service(source).await;

    handle.cancellation_token().cancel();
    let state = timeout(Duration::from_secs(5), handle.terminated())
        .await
        .unwrap();
    assert_eq!(state, ServiceState::Stopped);
    assert!(handle.join().await.is_ok());
}

/// Serves the first fetch, then never answers again
struct StallingStateSource {
    first: Mutex<Option<Vec<Entity>>>,
    calls: AtomicUsize,
}

#[async_trait]
impl ClusterStateSource for StallingStateSource {
    async fn fetch(&self, _node_name: &str) -> Result<Vec<Entity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let first = self.first.lock().unwrap().take();
        match first {
            Some(entities) => Ok(entities),
            None => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn test_cancel_during_refresh_leaves_index_untouched() {
    let source = Arc::new(StallingStateSource {
        first: Mutex::new(Some(vec![Entity::pod(web_pod())])),
        calls: AtomicUsize::new(0),
    });
    let service = EnrichmentService::new(
        "node-A",
        Arc::clone(&source) as Arc<dyn ClusterStateSource>,
        Arc::new(RuntimeIdMatcher),
    );
    let (tx, events) = ChannelEventSource::channel();
    let mut handle = service
        .start(events, CancellationToken::new())
        .await
        .unwrap();
    let before = handle.index().snapshot();

    tx.send(refresh()).await.unwrap();
    timeout(Duration::from_secs(5), async {
        while source.calls.load(Ordering::SeqCst) < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("refresh fetch was not issued");

    handle.cancellation_token().cancel();
    let state = timeout(Duration::from_secs(5), handle.terminated())
        .await
        .unwrap();
    assert_eq!(state, ServiceState::Stopped);
    assert_eq!(handle.index().snapshot(), before);
    let stats = handle.stats();
    assert_eq!(stats.refreshes, 0);
    assert_eq!(stats.events_applied, 0);
    assert!(handle.join().await.is_ok());
}

#[tokio::test]
async fn test_readers_run_while_streaming() {
    let source = ScriptedStateSource::new(vec![Ok(vec![])]);
    let (tx, handle) = start_service(source).await;
    let index = handle.index();

    let reader = tokio::spawn(async move {
        for _ in 0..200 {
            if let Some(record) = index.get(WEB_ID) {
                assert_eq!(record.name, "web-1");
                assert_eq!(record.containers.len(), 1);
            }
            tokio::task::yield_now().await;
        }
    });

    for _ in 0..20 {
        tx.send(modified(&web_pod())).await.unwrap();
        tx.send(deleted(&web_pod())).await.unwrap();
    }
    wait_for_events(&handle, 40).await;
    reader.await.unwrap();

    assert!(handle.shutdown().await.is_ok());
}
