//! UserBinding CRD
//!
//! A UserBinding ties a subject (or every member of a group) to a role family
//! at a tenancy scope. Most of the authorization-relevant fields are carried
//! as labels on the object rather than in the spec, so the accessors below
//! are the single place those labels are read.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::non_empty;
use crate::{
    BINDING_GROUP_LABEL, BINDING_ROLE_LABEL, BINDING_SUBJECT_LABEL, CLUSTER_LABEL, NAMESPACE_LABEL,
    PROJECT_LABEL,
};

/// UserBinding grants a role family to a subject or group.
///
/// Example:
/// ```yaml
/// apiVersion: auth.alauda.io/v1
/// kind: UserBinding
/// metadata:
///   name: alice-cluster-admin
///   namespace: cpaas-system
///   labels:
///     auth.cpaas.io/role.name: cluster-admin
///     auth.cpaas.io/user.email: 8bd108c8a01a892d129c52484ef97a0d
/// spec:
///   roleRef: cluster-admin
///   scope: cluster
///   constraint:
///     - cluster: east
///     - cluster: west
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "auth.alauda.io",
    version = "v1",
    kind = "UserBinding",
    namespaced,
    status = "UserBindingStatus",
    printcolumn = r#"{"name":"Role","type":"string","jsonPath":".spec.roleRef"}"#,
    printcolumn = r#"{"name":"Scope","type":"string","jsonPath":".spec.scope"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UserBindingSpec {
    /// Explicit subjects (informational; indexing uses labels)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subjects: Vec<BindingSubject>,

    /// Role reference as written by the binding's author
    #[serde(default)]
    pub role_ref: String,

    /// Declared scope: platform, cluster, project or namespace.
    ///
    /// Kept as a free string so one malformed binding cannot break the watch
    /// list; it is parsed when the binding becomes a fact.
    #[serde(default)]
    pub scope: String,

    /// Explicit constraint tuples, consulted for cluster-scoped bindings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub constraint: Vec<ConstraintTuple>,
}

/// A subject named by a binding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct BindingSubject {
    /// User, Group or ServiceAccount
    pub kind: String,
    /// Subject name
    pub name: String,
}

/// A (project, namespace, cluster) tuple limiting where a binding applies
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub struct ConstraintTuple {
    /// Project name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub project: String,
    /// Namespace name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    /// Cluster name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster: String,
}

/// UserBinding status
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserBindingStatus {
    /// Observed conditions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<UserBindingCondition>,
    /// Hash of the last reconciled spec
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_spec_hash: Option<String>,
    /// Current phase
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// A status condition on a UserBinding
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserBindingCondition {
    /// Condition type
    #[serde(rename = "type")]
    pub type_: String,
    /// True, False or Unknown
    pub status: String,
    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Last transition time (RFC 3339)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

impl UserBinding {
    /// Role family granted by this binding
    pub fn role_family(&self) -> Option<&str> {
        non_empty(self.metadata.labels.as_ref(), BINDING_ROLE_LABEL)
    }

    /// Subject name this binding is indexed under
    pub fn subject_name(&self) -> Option<&str> {
        non_empty(self.metadata.labels.as_ref(), BINDING_SUBJECT_LABEL)
    }

    /// Group name this binding is indexed under
    pub fn group_name(&self) -> Option<&str> {
        non_empty(self.metadata.labels.as_ref(), BINDING_GROUP_LABEL)
    }

    /// Project the binding is limited to
    pub fn project(&self) -> Option<&str> {
        non_empty(self.metadata.labels.as_ref(), PROJECT_LABEL)
    }

    /// Namespace the binding is limited to
    pub fn namespace_constraint(&self) -> Option<&str> {
        non_empty(self.metadata.labels.as_ref(), NAMESPACE_LABEL)
    }

    /// Cluster the binding is limited to
    pub fn cluster(&self) -> Option<&str> {
        non_empty(self.metadata.labels.as_ref(), CLUSTER_LABEL)
    }

    /// Clusters named by the explicit constraint tuples, in order
    pub fn constraint_clusters(&self) -> Vec<&str> {
        self.spec
            .constraint
            .iter()
            .map(|c| c.cluster.as_str())
            .collect()
    }
}
