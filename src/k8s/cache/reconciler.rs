/**
 * Reconciliation of cluster state into the container index
 *
 * Every rule filters to the local node first, then keys each container through the
 * identifier matcher. Containers whose IDs do not match are skipped silently.
 */
use super::container_index::ContainerIndex;
use crate::k8s::matcher::IdentifierMatcher;
use crate::k8s::model::{ChangeEvent, Container, ContainerKey, Entity, PodRecord};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// What a reconciliation pass did to the index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub upserted: usize,
    pub removed: usize,
    pub skipped_entities: usize,
}

impl ReconcileSummary {
    fn merge(&mut self, other: Self) {
        self.upserted += other.upserted;
        self.removed += other.removed;
        self.skipped_entities += other.skipped_entities;
    }
}

pub struct Reconciler {
    index: Arc<ContainerIndex>,
    matcher: Arc<dyn IdentifierMatcher>,
    node_name: String,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        index: Arc<ContainerIndex>,
        matcher: Arc<dyn IdentifierMatcher>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            index,
            matcher,
            node_name: node_name.into(),
        }
    }

    #[must_use]
    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    #[must_use]
    pub const fn index(&self) -> &Arc<ContainerIndex> {
        &self.index
    }

    /// Keys for the pod's containers, first container wins on duplicate keys.
    fn keyed_containers<'a>(
        &self,
        pod: &'a PodRecord,
    ) -> Vec<(ContainerKey, &'a Container)> {
        let mut seen = HashSet::new();
        pod.containers
            .iter()
            .filter_map(|container| {
                let key = self.matcher.match_id(&container.id)?;
                seen.insert(key.clone()).then_some((key, container))
            })
            .collect()
    }

    /// Index every container of a local pod under its own key. Non-local pods are
    /// ignored.
    pub fn upsert_pod(&self, pod: &PodRecord) -> ReconcileSummary {
        if !pod.is_on_node(&self.node_name) {
            return ReconcileSummary {
                skipped_entities: 1,
                ..ReconcileSummary::default()
            };
        }

        let mut summary = ReconcileSummary::default();
        for (key, container) in self.keyed_containers(pod) {
            self.index.set(key, pod.restricted_to(container));
            summary.upserted += 1;
        }
        summary
    }

    /// Remove every container key of a local pod.
    pub fn remove_pod(&self, pod: &PodRecord) -> ReconcileSummary {
        if !pod.is_on_node(&self.node_name) {
            return ReconcileSummary {
                skipped_entities: 1,
                ..ReconcileSummary::default()
            };
        }
        self.remove_keys(pod)
    }

    fn remove_keys(&self, pod: &PodRecord) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for (key, _) in self.keyed_containers(pod) {
            if self.index.delete(&key) {
                summary.removed += 1;
            }
        }
        summary
    }

    /// Apply a fetched cluster state: the bootstrap rule.
    pub fn apply_state(&self, entities: &[Entity]) -> ReconcileSummary {
        let mut summary = ReconcileSummary::default();
        for entity in entities {
            match &entity.pod {
                Some(pod) => summary.merge(self.upsert_pod(pod)),
                None => summary.skipped_entities += 1,
            }
        }
        info!(
            node = %self.node_name,
            upserted = summary.upserted,
            skipped = summary.skipped_entities,
            "📦 cluster state applied"
        );
        summary
    }

    /// Apply a fresh cluster state and drop every key it no longer mentions.
    pub fn resync(&self, entities: &[Entity]) -> ReconcileSummary {
        let live: HashSet<ContainerKey> = entities
            .iter()
            .filter_map(|entity| entity.pod.as_ref())
            .filter(|pod| pod.is_on_node(&self.node_name))
            .flat_map(|pod| self.keyed_containers(pod).into_iter().map(|(key, _)| key))
            .collect();

        let mut summary = self.apply_state(entities);
        summary.removed += self.index.retain(|key| live.contains(key));
        info!(node = %self.node_name, removed = summary.removed, "🔄 resync complete");
        summary
    }

    /// Apply one incremental event. `Refresh` needs a fetch and is left to the caller.
    pub fn apply_event(&self, event: &ChangeEvent) -> ReconcileSummary {
        match event {
            ChangeEvent::Modified(entity) => {
                let Some(pod) = &entity.pod else {
                    return ReconcileSummary::default();
                };
                if pod.is_on_node(&self.node_name) {
                    debug!(pod = %pod.name, namespace = %pod.namespace, "📝 pod modified");
                    self.upsert_pod(pod)
                } else {
                    // The pod may have moved off this node
                    let summary = self.remove_keys(pod);
                    if summary.removed > 0 {
                        info!(
                            pod = %pod.name,
                            namespace = %pod.namespace,
                            node = %pod.node_name,
                            removed = summary.removed,
                            "🚚 pod left this node"
                        );
                    }
                    ReconcileSummary {
                        skipped_entities: 1,
                        ..summary
                    }
                }
            }
            ChangeEvent::Deleted(entity) => {
                let Some(pod) = &entity.pod else {
                    return ReconcileSummary::default();
                };
                debug!(pod = %pod.name, namespace = %pod.namespace, "🗑️  pod deleted");
                self.remove_pod(pod)
            }
            ChangeEvent::Refresh => ReconcileSummary::default(),
        }
    }
}
