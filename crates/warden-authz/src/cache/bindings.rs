//! Binding cache with subject and group indices

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::trace;
use warden_common::crd::UserBinding;

use super::{Buckets, FactStore};
use crate::facts::{binding_key, Binding};

#[derive(Default)]
struct Index {
    by_key: HashMap<String, Arc<Binding>>,
    by_subject: Buckets<Arc<Binding>>,
    by_group: Buckets<Arc<Binding>>,
}

impl Index {
    fn insert(&mut self, binding: Binding) {
        // Drop the previous version from whichever buckets it sat in
        self.remove(&binding.key);
        let binding = Arc::new(binding);
        if let Some(subject) = &binding.subject {
            self.by_subject.insert(subject, &binding.key, binding.clone());
        }
        if let Some(group) = &binding.group {
            self.by_group.insert(group, &binding.key, binding.clone());
        }
        self.by_key.insert(binding.key.clone(), binding);
    }

    fn remove(&mut self, key: &str) {
        if let Some(old) = self.by_key.remove(key) {
            if let Some(subject) = &old.subject {
                self.by_subject.remove(subject, key);
            }
            if let Some(group) = &old.group {
                self.by_group.remove(group, key);
            }
        }
    }
}

/// Bindings keyed by `namespace/name`, indexed by subject and by group
///
/// A binding carrying neither label is stored but reachable only by key.
#[derive(Default)]
pub struct BindingCache {
    index: RwLock<Index>,
}

impl BindingCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a binding by `namespace/name`
    pub fn get(&self, key: &str) -> Option<Arc<Binding>> {
        self.index.read().by_key.get(key).cloned()
    }

    /// Bindings that name the subject directly
    pub fn by_subject(&self, subject: &str) -> Vec<Arc<Binding>> {
        self.index.read().by_subject.values(subject)
    }

    /// Bindings granted to a group
    pub fn by_group(&self, group: &str) -> Vec<Arc<Binding>> {
        self.index.read().by_group.values(group)
    }

    /// Bindings granted to any of the groups, in group order, not deduplicated
    pub fn by_groups<S: AsRef<str>>(&self, groups: &[S]) -> Vec<Arc<Binding>> {
        let index = self.index.read();
        groups
            .iter()
            .flat_map(|g| index.by_group.values(g.as_ref()))
            .collect()
    }

    /// Insert or replace a binding fact directly
    pub fn insert(&self, binding: Binding) {
        self.index.write().insert(binding);
    }

    /// Remove a binding by key
    pub fn remove(&self, key: &str) {
        self.index.write().remove(key);
    }
}

impl FactStore for BindingCache {
    type Object = UserBinding;
    const KIND: &'static str = "UserBinding";

    fn on_apply(&self, obj: &UserBinding) -> warden_common::Result<()> {
        let binding = Binding::try_from(obj)?;
        trace!(
            binding = %binding.key,
            role = %binding.role_family,
            scope = ?binding.scope,
            "Applying binding"
        );
        self.insert(binding);
        Ok(())
    }

    fn on_delete(&self, obj: &UserBinding) {
        self.remove(&binding_key(obj));
    }

    fn replace(&self, objs: &[UserBinding]) -> Vec<warden_common::Error> {
        let mut fresh = Index::default();
        let mut errors = Vec::new();
        for obj in objs {
            match Binding::try_from(obj) {
                Ok(binding) => fresh.insert(binding),
                Err(e) => errors.push(e),
            }
        }
        *self.index.write() = fresh;
        errors
    }

    fn len(&self) -> usize {
        self.index.read().by_key.len()
    }
}

impl std::fmt::Debug for BindingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.read();
        f.debug_struct("BindingCache")
            .field("bindings", &index.by_key.len())
            .field("subjects", &index.by_subject.bucket_count())
            .field("groups", &index.by_group.bucket_count())
            .finish()
    }
}
