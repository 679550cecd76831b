//! Tenant-partitioned state management.
//!
//! Provides [`PartitionStore`], a thread-safe concurrent store that keeps
//! one keyed collection per tenant partition. The identity cache and the
//! function registry are both built on it.

use std::sync::Arc;

use dashmap::DashMap;

use crate::types::TenantPartition;

/// Thread-safe, partition-scoped map of named items.
///
/// Each partition owns an independent `DashMap<String, Arc<T>>`. Readers hold
/// `Arc` clones, so an item replaced by a concurrent writer stays
/// valid for whoever already fetched it.
///
/// # Examples
///
/// ```
/// use lambdagate_core::{PartitionStore, TenantPartition};
///
/// let store = PartitionStore::<u64>::new();
/// let prod = TenantPartition::new("prod");
/// store.insert(&prod, "answer", 42);
/// assert_eq!(store.get(&prod, "answer").as_deref(), Some(&42));
/// ```
#[derive(Debug)]
pub struct PartitionStore<T: Send + Sync> {
    inner: DashMap<TenantPartition, Arc<DashMap<String, Arc<T>>>>,
}

impl<T: Send + Sync> PartitionStore<T> {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Insert or replace an item.
    pub fn insert(&self, partition: &TenantPartition, name: impl Into<String>, item: T) {
        let bucket = self
            .inner
            .entry(partition.clone())
            .or_insert_with(|| Arc::new(DashMap::new()))
            .clone();
        bucket.insert(name.into(), Arc::new(item));
    }

    /// Get an item by partition and name.
    #[must_use]
    pub fn get(&self, partition: &TenantPartition, name: &str) -> Option<Arc<T>> {
        let bucket = self.inner.get(partition).map(|b| Arc::clone(b.value()))?;
        bucket.get(name).map(|v| Arc::clone(v.value()))
    }

    /// Snapshot every item visible in a partition.
    ///
    /// The snapshot is taken item by item while other writers may be active;
    /// it never blocks them and never observes a torn item.
    #[must_use]
    pub fn list(&self, partition: &TenantPartition) -> Vec<Arc<T>> {
        let Some(bucket) = self.inner.get(partition).map(|b| Arc::clone(b.value())) else {
            return Vec::new();
        };
        bucket.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Replace the whole store content with the given items.
    pub fn replace_all(&self, items: impl IntoIterator<Item = (TenantPartition, String, T)>) {
        let fresh: DashMap<TenantPartition, Arc<DashMap<String, Arc<T>>>> = DashMap::new();
        for (partition, name, item) in items {
            fresh
                .entry(partition)
                .or_insert_with(|| Arc::new(DashMap::new()))
                .insert(name, Arc::new(item));
        }

        self.inner.retain(|partition, _| fresh.contains_key(partition));
        for (partition, bucket) in fresh {
            self.inner.insert(partition, bucket);
        }
    }

    /// Total number of items across all partitions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.iter().map(|bucket| bucket.value().len()).sum()
    }

    /// Whether the store holds no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Send + Sync> Default for PartitionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}
