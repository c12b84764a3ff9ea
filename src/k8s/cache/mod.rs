pub mod config;
pub mod container_index;
pub mod enricher;
pub mod errors;
pub mod event_source;
pub mod fetcher;
pub mod reconciler;

pub use container_index::{ContainerIndex, IndexStats};
pub use enricher::{EnrichmentHandle, EnrichmentService, ReconcileStats, ServiceState};
pub use event_source::{
    ChangeEventSource, ChannelEventSource, EventStreamConfig, RedisEventSource, StreamEventSource,
};
pub use fetcher::{ClusterStateConfig, ClusterStateSource, HttpClusterStateSource};
pub use reconciler::{ReconcileSummary, Reconciler};
