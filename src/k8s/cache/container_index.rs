use crate::k8s::model::{ContainerKey, PodRecord};
use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Concurrent index from container key to the pod that runs the container.
///
/// One writer (the reconciliation task) and any number of readers. Records are
/// stored behind `Arc` and replaced whole, so a reader sees either the previous
/// or the next record for a key, never a mix. Lookups touch a single shard and
/// never wait on I/O. There is no eviction: an entry lives until it is deleted
/// or overwritten.
///
/// Hit/miss counting is opt-in through [`ContainerIndex::with_stats`]: it adds a
/// shared atomic write to every lookup.
#[derive(Debug, Default)]
pub struct ContainerIndex {
    entries: DashMap<ContainerKey, Arc<PodRecord>>,
    lookups: Option<LookupCounters>,
}

#[derive(Debug, Default)]
struct LookupCounters {
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ContainerIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Index that also counts lookup hits and misses, for diagnostics.
    #[must_use]
    pub fn with_stats() -> Self {
        Self {
            entries: DashMap::new(),
            lookups: Some(LookupCounters::default()),
        }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<Arc<PodRecord>>
    where
        ContainerKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        // Clone the Arc and release the shard guard before returning
        let found = self.entries.get(key).map(|entry| Arc::clone(entry.value()));
        if let Some(lookups) = &self.lookups {
            let counter = if found.is_some() {
                &lookups.hits
            } else {
                &lookups.misses
            };
            counter.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    /// Insert or replace the record for `key`. Last write wins.
    pub fn set(&self, key: ContainerKey, record: PodRecord) {
        debug!(key = %key, pod = %record.name, namespace = %record.namespace, "index set");
        self.entries.insert(key, Arc::new(record));
    }

    /// Remove `key`, returning whether it was present.
    pub fn delete<Q>(&self, key: &Q) -> bool
    where
        ContainerKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.remove(key).is_some()
    }

    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        ContainerKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.entries.contains_key(key)
    }

    /// Point-in-time copy of the entries for diagnostics.
    ///
    /// Shards are visited one at a time, so writes that land during the walk may or
    /// may not be included. Entries are sorted by key.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(ContainerKey, Arc<PodRecord>)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    #[must_use]
    pub fn keys(&self) -> Vec<ContainerKey> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Drop every key for which `keep` returns false; returns how many were removed.
    pub fn retain(&self, mut keep: impl FnMut(&ContainerKey) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(key));
        before.saturating_sub(self.entries.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        let (hits, misses) = self.lookups.as_ref().map_or((0, 0), |lookups| {
            (
                lookups.hits.load(Ordering::Relaxed),
                lookups.misses.load(Ordering::Relaxed),
            )
        });
        IndexStats {
            entries: self.entries.len(),
            hits,
            misses,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl IndexStats {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
