//! Role cache, indexed by role family

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::ResourceExt;
use parking_lot::RwLock;
use tracing::trace;

use super::{Buckets, FactStore};
use crate::facts::Role;

#[derive(Default)]
struct Index {
    by_name: HashMap<String, Arc<Role>>,
    by_family: Buckets<Arc<Role>>,
}

impl Index {
    fn insert(&mut self, role: Role) {
        self.remove(&role.name);
        let role = Arc::new(role);
        self.by_family.insert(&role.family, &role.name, role.clone());
        self.by_name.insert(role.name.clone(), role);
    }

    fn remove(&mut self, name: &str) {
        if let Some(old) = self.by_name.remove(name) {
            self.by_family.remove(&old.family, name);
        }
    }
}

/// ClusterRoles carrying the role-family label, keyed by name
#[derive(Default)]
pub struct RoleCache {
    index: RwLock<Index>,
}

impl RoleCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a role by ClusterRole name
    pub fn get(&self, name: &str) -> Option<Arc<Role>> {
        self.index.read().by_name.get(name).cloned()
    }

    /// Every role in a family, ordered by name
    pub fn by_family(&self, family: &str) -> Vec<Arc<Role>> {
        self.index.read().by_family.values(family)
    }

    /// Insert or replace a role fact directly
    pub fn insert(&self, role: Role) {
        self.index.write().insert(role);
    }

    /// Remove a role by name
    pub fn remove(&self, name: &str) {
        self.index.write().remove(name);
    }
}

impl FactStore for RoleCache {
    type Object = ClusterRole;
    const KIND: &'static str = "ClusterRole";

    fn on_apply(&self, obj: &ClusterRole) -> warden_common::Result<()> {
        let role = Role::try_from(obj)?;
        trace!(
            role = %role.name,
            family = %role.family,
            rules = role.rules.len(),
            "Applying role"
        );
        self.insert(role);
        Ok(())
    }

    fn on_delete(&self, obj: &ClusterRole) {
        self.remove(&obj.name_any());
    }

    fn replace(&self, objs: &[ClusterRole]) -> Vec<warden_common::Error> {
        let mut fresh = Index::default();
        let mut errors = Vec::new();
        for obj in objs {
            match Role::try_from(obj) {
                Ok(role) => fresh.insert(role),
                Err(e) => errors.push(e),
            }
        }
        *self.index.write() = fresh;
        errors
    }

    fn len(&self) -> usize {
        self.index.read().by_name.len()
    }
}

impl std::fmt::Debug for RoleCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.read();
        f.debug_struct("RoleCache")
            .field("roles", &index.by_name.len())
            .field("families", &index.by_family.bucket_count())
            .finish()
    }
}
