//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::BTreeMap;

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule};
use kube::api::ObjectMeta;
use warden_authz::{FactCaches, FactStore};
use warden_common::crd::{ConstraintTuple, User, UserBinding, UserBindingSpec, UserSpec};
use warden_common::{
    BINDING_GROUP_LABEL, BINDING_ROLE_LABEL, BINDING_SUBJECT_LABEL, PROJECT_LABEL,
    ROLE_FAMILY_LABEL,
};

pub fn user(name: &str, groups: &[&str]) -> User {
    User::new(
        name,
        UserSpec {
            email: format!("{name}@example.com"),
            groups: groups.iter().map(|g| g.to_string()).collect(),
            ..Default::default()
        },
    )
}

pub enum Bound<'a> {
    Subject(&'a str),
    Group(&'a str),
}

pub fn binding(
    name: &str,
    family: &str,
    scope: &str,
    bound: Bound<'_>,
    project: Option<&str>,
    clusters: &[&str],
) -> UserBinding {
    let mut labels = BTreeMap::new();
    labels.insert(BINDING_ROLE_LABEL.to_string(), family.to_string());
    match bound {
        Bound::Subject(s) => labels.insert(BINDING_SUBJECT_LABEL.to_string(), s.to_string()),
        Bound::Group(g) => labels.insert(BINDING_GROUP_LABEL.to_string(), g.to_string()),
    };
    if let Some(project) = project {
        labels.insert(PROJECT_LABEL.to_string(), project.to_string());
    }

    let mut ub = UserBinding::new(
        name,
        UserBindingSpec {
            role_ref: family.to_string(),
            scope: scope.to_string(),
            constraint: clusters
                .iter()
                .map(|c| ConstraintTuple {
                    cluster: c.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        },
    );
    ub.metadata.namespace = Some("cpaas-system".to_string());
    ub.metadata.labels = Some(labels);
    ub
}

pub fn rule(groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    let list = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    PolicyRule {
        api_groups: Some(list(groups)),
        resources: Some(list(resources)),
        verbs: list(verbs),
        ..Default::default()
    }
}

pub fn role(name: &str, family: &str, rules: Vec<PolicyRule>) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::from([(
                ROLE_FAMILY_LABEL.to_string(),
                family.to_string(),
            )])),
            ..Default::default()
        },
        rules: Some(rules),
        ..Default::default()
    }
}

/// Caches populated through the same path the watchers use
pub fn caches(users: &[User], bindings: &[UserBinding], roles: &[ClusterRole]) -> FactCaches {
    let caches = FactCaches::new();
    assert!(caches.subjects.replace(users).is_empty());
    assert!(caches.bindings.replace(bindings).is_empty());
    assert!(caches.roles.replace(roles).is_empty());
    caches
}
