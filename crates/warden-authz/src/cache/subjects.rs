//! Subject cache: who belongs to which groups

use std::collections::HashMap;
use std::sync::Arc;

use kube::ResourceExt;
use parking_lot::RwLock;
use tracing::trace;
use warden_common::crd::User;

use super::{Buckets, FactStore};
use crate::facts::Subject;

#[derive(Default)]
struct Index {
    by_name: HashMap<String, Arc<Subject>>,
    members: Buckets<()>,
}

impl Index {
    fn insert(&mut self, subject: Subject) {
        self.remove(&subject.name);
        // Subjects without groups contribute nothing and are not stored
        if subject.groups.is_empty() {
            return;
        }
        for group in &subject.groups {
            self.members.insert(group, &subject.name, ());
        }
        self.by_name.insert(subject.name.clone(), Arc::new(subject));
    }

    fn remove(&mut self, name: &str) {
        if let Some(old) = self.by_name.remove(name) {
            for group in &old.groups {
                self.members.remove(group, name);
            }
        }
    }
}

/// Subjects with at least one group membership, keyed by subject name
#[derive(Default)]
pub struct SubjectCache {
    index: RwLock<Index>,
}

impl SubjectCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a subject by name
    pub fn get(&self, name: &str) -> Option<Arc<Subject>> {
        self.index.read().by_name.get(name).cloned()
    }

    /// Groups of a subject; empty when the subject is unknown
    pub fn groups_of(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|s| s.groups.clone())
            .unwrap_or_default()
    }

    /// Names of subjects belonging to a group, sorted
    pub fn members_of(&self, group: &str) -> Vec<String> {
        self.index.read().members.keys(group)
    }

    /// Insert or replace a subject fact directly
    pub fn insert(&self, subject: Subject) {
        self.index.write().insert(subject);
    }

    /// Remove a subject by name
    pub fn remove(&self, name: &str) {
        self.index.write().remove(name);
    }
}

impl FactStore for SubjectCache {
    type Object = User;
    const KIND: &'static str = "User";

    fn on_apply(&self, obj: &User) -> warden_common::Result<()> {
        let subject = Subject::try_from(obj)?;
        trace!(subject = %subject.name, groups = subject.groups.len(), "Applying subject");
        self.insert(subject);
        Ok(())
    }

    fn on_delete(&self, obj: &User) {
        self.remove(&obj.name_any());
    }

    fn replace(&self, objs: &[User]) -> Vec<warden_common::Error> {
        let mut fresh = Index::default();
        let mut errors = Vec::new();
        for obj in objs {
            match Subject::try_from(obj) {
                Ok(subject) => fresh.insert(subject),
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

impl std::fmt::Debug for SubjectCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let index = self.index.read();
        f.debug_struct("SubjectCache")
            .field("subjects", &index.by_name.len())
            .field("groups", &index.members.bucket_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::test_support::user;

    #[test]
    fn stores_subjects_with_groups() {
        let cache = SubjectCache::new();
        cache.on_apply(&user("u1", &["devs", "ops"])).unwrap();

        let subject = cache.get("u1").unwrap();
        assert_eq!(subject.groups, vec!["devs", "ops"]);
        assert_eq!(cache.members_of("devs"), vec!["u1"]);
        assert_eq!(cache.members_of("ops"), vec!["u1"]);
    }

    #[test]
    fn subjects_without_groups_are_dropped() {
        let cache = SubjectCache::new();
        cache.on_apply(&user("u1", &[])).unwrap();
        assert!(cache.get("u1").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn update_removing_all_groups_acts_as_delete() {
        let cache = SubjectCache::new();
        cache.on_apply(&user("u1", &["devs"])).unwrap();
        cache.on_apply(&user("u1", &[])).unwrap();
        assert!(cache.get("u1").is_none());
        assert!(cache.members_of("devs").is_empty());
    }

    #[test]
    fn group_change_moves_membership() {
        let cache = SubjectCache::new();
        cache.on_apply(&user("u1", &["devs"])).unwrap();
        cache.on_apply(&user("u2", &["devs"])).unwrap();
        cache.on_apply(&user("u1", &["ops"])).unwrap();

        assert_eq!(cache.members_of("devs"), vec!["u2"]);
        assert_eq!(cache.members_of("ops"), vec!["u1"]);
        assert_eq!(cache.groups_of("u1"), vec!["ops"]);
    }

    #[test]
    fn delete_and_replace() {
        let cache = SubjectCache::new();
        cache.on_apply(&user("u1", &["devs"])).unwrap();
        cache.on_delete(&user("u1", &["devs"]));
        assert!(cache.is_empty());

        cache.on_apply(&user("stale", &["devs"])).unwrap();
        let errors = cache.replace(&[user("u2", &["ops"]), user("u3", &[])]);
        assert!(errors.is_empty());
        assert_eq!(cache.len(), 1);
        assert!(cache.get("stale").is_none());
        assert!(cache.members_of("devs").is_empty());
        assert!(cache.get("u2").is_some());
    }
}
