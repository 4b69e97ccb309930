//! Fact caches
//!
//! Three independently consistent caches (subjects, bindings, roles), each
//! behind its own reader/writer lock. Writers convert objects into facts
//! before taking the lock, so a write holds it only for the index mutation.
//! Entries are stored as `Arc`s: readers clone handles out of the lock and
//! never observe a partially updated record.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use kube::Resource;
use serde::de::DeserializeOwned;

mod bindings;
mod roles;
mod subjects;
pub mod sync;

pub use bindings::BindingCache;
pub use roles::RoleCache;
pub use subjects::SubjectCache;
pub use sync::{SyncHandle, SyncState};

/// A cache fed by a watch stream of one object kind
pub trait FactStore: Send + Sync + 'static {
    /// Cluster object this store consumes
    type Object: Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    /// Kind label for logs and metrics
    const KIND: &'static str;

    /// Add or update an object
    ///
    /// An object that fails conversion is skipped for this event only; a
    /// previously stored version stays in place.
    fn on_apply(&self, obj: &Self::Object) -> warden_common::Result<()>;

    /// Remove an object
    fn on_delete(&self, obj: &Self::Object);

    /// Replace the whole contents with a fresh listing, returning the
    /// conversion errors for objects that were skipped
    fn replace(&self, objs: &[Self::Object]) -> Vec<warden_common::Error>;

    /// Number of stored facts
    fn len(&self) -> usize;

    /// Whether the store holds no facts
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The three caches an engine resolves against
#[derive(Debug, Clone, Default)]
pub struct FactCaches {
    /// Subjects with at least one group
    pub subjects: Arc<SubjectCache>,
    /// Bindings indexed by subject and group
    pub bindings: Arc<BindingCache>,
    /// Role-family members
    pub roles: Arc<RoleCache>,
}

impl FactCaches {
    /// Create empty caches
    pub fn new() -> Self {
        Self::default()
    }
}

/// Secondary index: bucket key -> (primary key -> value)
///
/// Empty buckets are dropped so the index does not grow with churn.
#[derive(Debug)]
pub(crate) struct Buckets<V> {
    inner: HashMap<String, BTreeMap<String, V>>,
}

impl<V> Default for Buckets<V> {
    fn default() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }
}

impl<V: Clone> Buckets<V> {
    pub(crate) fn insert(&mut self, bucket: &str, key: &str, value: V) {
        self.inner
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), value);
    }

    pub(crate) fn remove(&mut self, bucket: &str, key: &str) {
        if let Some(entries) = self.inner.get_mut(bucket) {
            entries.remove(key);
            if entries.is_empty() {
                self.inner.remove(bucket);
            }
        }
    }

    pub(crate) fn values(&self, bucket: &str) -> Vec<V> {
        self.inner
            .get(bucket)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn keys(&self, bucket: &str) -> Vec<String> {
        self.inner
            .get(bucket)
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_drop_when_emptied() {
        let mut buckets: Buckets<u32> = Buckets::default();
        buckets.insert("devs", "b1", 1);
        buckets.insert("devs", "b2", 2);
        assert_eq!(buckets.values("devs"), vec![1, 2]);
        assert_eq!(buckets.keys("devs"), vec!["b1", "b2"]);

        buckets.remove("devs", "b1");
        buckets.remove("devs", "b2");
        assert_eq!(buckets.bucket_count(), 0);
        assert!(buckets.values("devs").is_empty());
    }

    #[test]
    fn removing_from_missing_bucket_is_noop() {
        let mut buckets: Buckets<u32> = Buckets::default();
        buckets.remove("nobody", "b1");
        assert_eq!(buckets.bucket_count(), 0);
    }
}
