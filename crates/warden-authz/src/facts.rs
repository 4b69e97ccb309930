//! Typed authorization facts
//!
//! Cluster objects carry most of their authorization meaning in labels. The
//! conversions here read those labels exactly once, when an object enters a
//! cache, so everything downstream works with plain typed fields.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule as K8sPolicyRule};
use kube::ResourceExt;
use warden_common::crd::{User, UserBinding};
use warden_common::ROLE_FAMILY_LABEL;

use crate::permission::{Constraints, Dimension, GroupResource};

/// Wildcard accepted in API groups, resources and verbs
pub const WILDCARD: &str = "*";

/// Tenancy level a binding applies at, or a request addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Whole platform
    Platform,
    /// A single cluster
    Cluster,
    /// A project, across its clusters
    Project,
    /// A namespace inside a project's cluster
    Namespace,
}

impl Scope {
    /// Wire value of this scope
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Platform => "platform",
            Self::Cluster => "cluster",
            Self::Project => "project",
            Self::Namespace => "namespace",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = warden_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "platform" => Ok(Self::Platform),
            "cluster" => Ok(Self::Cluster),
            "project" => Ok(Self::Project),
            "namespace" => Ok(Self::Namespace),
            other => Err(warden_common::Error::validation_for(
                "scope",
                other,
                "expected platform, cluster, project or namespace",
            )),
        }
    }
}

/// An identity known to the subject cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Subject name (hash of the email)
    pub name: String,
    /// Raw email, when the user record carries one
    pub email: Option<String>,
    /// Group memberships, empty names removed
    pub groups: Vec<String>,
}

impl TryFrom<&User> for Subject {
    type Error = warden_common::Error;

    fn try_from(user: &User) -> Result<Self, Self::Error> {
        let name = user.name_any();
        if name.is_empty() {
            return Err(warden_common::Error::validation_for(
                "User",
                "<unnamed>",
                "metadata.name is empty",
            ));
        }

        let mut groups: Vec<String> = Vec::with_capacity(user.spec.groups.len());
        for group in &user.spec.groups {
            if !group.is_empty() && !groups.contains(group) {
                groups.push(group.clone());
            }
        }

        Ok(Self {
            name,
            email: Some(user.spec.email.clone()).filter(|e| !e.is_empty()),
            groups,
        })
    }
}

/// A binding of a subject or group to a role family
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Unique cache key, `namespace/name`
    pub key: String,
    /// Role family granted
    pub role_family: String,
    /// Declared scope; `None` when the binding names a scope this engine
    /// does not recognize, which grants through the label constraints alone
    pub scope: Option<Scope>,
    /// Subject index key, if bound to a single subject
    pub subject: Option<String>,
    /// Group index key, if bound to a group
    pub group: Option<String>,
    /// Project the binding is limited to
    pub project: Option<String>,
    /// Namespace the binding is limited to
    pub namespace: Option<String>,
    /// Cluster label value
    pub cluster: Option<String>,
    /// Clusters from explicit constraint tuples, in declaration order
    pub constraint_clusters: Vec<String>,
}

impl Binding {
    /// Constraint set every permission derived from this binding carries
    ///
    /// Cluster-scoped bindings take their cluster constraint from the
    /// explicit tuples, joined with commas, overriding the label value.
    pub fn constraints(&self) -> Constraints {
        let mut constraints = Constraints::new();
        if let Some(project) = &self.project {
            constraints.insert(Dimension::Project, project.clone());
        }
        if let Some(namespace) = &self.namespace {
            constraints.insert(Dimension::Namespace, namespace.clone());
        }
        if let Some(cluster) = &self.cluster {
            constraints.insert(Dimension::Cluster, cluster.clone());
        }
        if self.scope == Some(Scope::Cluster) {
            constraints.insert(Dimension::Cluster, self.constraint_clusters.join(","));
        }
        constraints
    }
}

impl TryFrom<&UserBinding> for Binding {
    type Error = warden_common::Error;

    fn try_from(binding: &UserBinding) -> Result<Self, Self::Error> {
        let key = binding_key(binding);

        let role_family = binding
            .role_family()
            .or_else(|| Some(binding.spec.role_ref.as_str()).filter(|r| !r.is_empty()))
            .ok_or_else(|| {
                warden_common::Error::validation_for("UserBinding", &key, "no role family")
            })?
            .to_string();

        let scope = binding.spec.scope.parse::<Scope>().ok();

        Ok(Self {
            role_family,
            scope,
            subject: binding.subject_name().map(str::to_string),
            group: binding.group_name().map(str::to_string),
            project: binding.project().map(str::to_string),
            namespace: binding.namespace_constraint().map(str::to_string),
            cluster: binding.cluster().map(str::to_string),
            constraint_clusters: binding
                .constraint_clusters()
                .into_iter()
                .map(str::to_string)
                .collect(),
            key,
        })
    }
}

/// Cache key for a UserBinding
pub fn binding_key(binding: &UserBinding) -> String {
    format!(
        "{}/{}",
        binding.namespace().unwrap_or_default(),
        binding.name_any()
    )
}

/// A role-family member and its rules
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    /// ClusterRole name
    pub name: String,
    /// Family this role belongs to
    pub family: String,
    /// Policy rules
    pub rules: Vec<PolicyRule>,
}

impl TryFrom<&ClusterRole> for Role {
    type Error = warden_common::Error;

    fn try_from(role: &ClusterRole) -> Result<Self, Self::Error> {
        let name = role.name_any();
        let family = role
            .labels()
            .get(ROLE_FAMILY_LABEL)
            .filter(|f| !f.is_empty())
            .cloned()
            .ok_or_else(|| {
                warden_common::Error::validation_for(
                    "ClusterRole",
                    &name,
                    format!("missing {ROLE_FAMILY_LABEL} label"),
                )
            })?;

        let rules = role
            .rules
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(PolicyRule::from)
            .collect();

        Ok(Self {
            name,
            family,
            rules,
        })
    }
}

/// A single policy rule
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyRule {
    /// API groups, may contain `*`
    pub api_groups: Vec<String>,
    /// Resources, may contain `*`
    pub resources: Vec<String>,
    /// Verbs, may contain `*`
    pub verbs: Vec<String>,
    /// Instance names; empty means every instance
    pub resource_names: Vec<String>,
}

impl PolicyRule {
    /// Whether this rule covers the given resource
    pub fn applies_to(&self, resource: &GroupResource) -> bool {
        let group_ok = self
            .api_groups
            .iter()
            .any(|g| g == WILDCARD || *g == resource.group);
        let resource_ok = self
            .resources
            .iter()
            .any(|r| r == WILDCARD || *r == resource.resource);
        group_ok && resource_ok
    }
}

impl From<&K8sPolicyRule> for PolicyRule {
    fn from(rule: &K8sPolicyRule) -> Self {
        Self {
            api_groups: rule.api_groups.clone().unwrap_or_default(),
            resources: rule.resources.clone().unwrap_or_default(),
            verbs: rule.verbs.clone(),
            resource_names: rule.resource_names.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Builders for facts and the cluster objects they come from

    use std::collections::BTreeMap;

    use k8s_openapi::api::rbac::v1::{ClusterRole, PolicyRule as K8sPolicyRule};
    use kube::api::ObjectMeta;
    use warden_common::crd::{ConstraintTuple, User, UserBinding, UserBindingSpec, UserSpec};
    use warden_common::{
        BINDING_GROUP_LABEL, BINDING_ROLE_LABEL, BINDING_SUBJECT_LABEL, CLUSTER_LABEL,
        NAMESPACE_LABEL, PROJECT_LABEL, ROLE_FAMILY_LABEL,
    };

    pub fn user(name: &str, groups: &[&str]) -> User {
        let mut user = User::new(
            name,
            UserSpec {
                email: format!("{name}@example.com"),
                groups: groups.iter().map(|g| g.to_string()).collect(),
                ..Default::default()
            },
        );
        user.metadata.resource_version = Some("1".to_string());
        user
    }

    /// Binding builder; `labels` are extra domain labels (project etc.)
    pub struct BindingBuilder {
        name: String,
        labels: BTreeMap<String, String>,
        spec: UserBindingSpec,
    }

    impl BindingBuilder {
        pub fn new(name: &str, role_family: &str, scope: &str) -> Self {
            let mut labels = BTreeMap::new();
            labels.insert(BINDING_ROLE_LABEL.to_string(), role_family.to_string());
            Self {
                name: name.to_string(),
                labels,
                spec: UserBindingSpec {
                    role_ref: role_family.to_string(),
                    scope: scope.to_string(),
                    ..Default::default()
                },
            }
        }

        pub fn subject(mut self, subject: &str) -> Self {
            self.labels
                .insert(BINDING_SUBJECT_LABEL.to_string(), subject.to_string());
            self
        }

        pub fn group(mut self, group: &str) -> Self {
            self.labels
                .insert(BINDING_GROUP_LABEL.to_string(), group.to_string());
            self
        }

        pub fn project(mut self, project: &str) -> Self {
            self.labels
                .insert(PROJECT_LABEL.to_string(), project.to_string());
            self
        }

        pub fn namespace(mut self, namespace: &str) -> Self {
            self.labels
                .insert(NAMESPACE_LABEL.to_string(), namespace.to_string());
            self
        }

        pub fn cluster(mut self, cluster: &str) -> Self {
            self.labels
                .insert(CLUSTER_LABEL.to_string(), cluster.to_string());
            self
        }

        pub fn constraint_clusters(mut self, clusters: &[&str]) -> Self {
            self.spec.constraint = clusters
                .iter()
                .map(|c| ConstraintTuple {
                    cluster: c.to_string(),
                    ..Default::default()
                })
                .collect();
            self
        }

        pub fn build(self) -> UserBinding {
            let mut binding = UserBinding::new(&self.name, self.spec);
            binding.metadata.namespace = Some("cpaas-system".to_string());
            binding.metadata.labels = Some(self.labels);
            binding
        }
    }

    pub fn rule(
        groups: &[&str],
        resources: &[&str],
        verbs: &[&str],
        names: &[&str],
    ) -> K8sPolicyRule {
        let list = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        K8sPolicyRule {
            api_groups: Some(list(groups)),
            resources: Some(list(resources)),
            verbs: list(verbs),
            resource_names: if names.is_empty() {
                None
            } else {
                Some(list(names))
            },
            ..Default::default()
        }
    }

    pub fn cluster_role(name: &str, family: &str, rules: Vec<K8sPolicyRule>) -> ClusterRole {
        let mut labels = BTreeMap::new();
        labels.insert(ROLE_FAMILY_LABEL.to_string(), family.to_string());
        ClusterRole {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(labels),
                ..Default::default()
            },
            rules: Some(rules),
            ..Default::default()
        }
    }
}
