//! Common types for Warden: CRDs, label keys, errors, and telemetry

#![deny(missing_docs)]

pub mod crd;
pub mod error;
pub mod metrics;
pub mod telemetry;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Label marking a ClusterRole as part of a role family (value = family name)
pub const ROLE_FAMILY_LABEL: &str = "auth.cpaas.io/role.relative";

/// Label on a UserBinding naming the role family it grants
pub const BINDING_ROLE_LABEL: &str = "auth.cpaas.io/role.name";

/// Label on a UserBinding naming the subject it binds
pub const BINDING_SUBJECT_LABEL: &str = "auth.cpaas.io/user.email";

/// Label on a UserBinding naming the group it binds
pub const BINDING_GROUP_LABEL: &str = "auth.cpaas.io/group.name";

/// Label carrying the project a resource belongs to
pub const PROJECT_LABEL: &str = "cpaas.io/project";

/// Label carrying the namespace a binding is scoped to
pub const NAMESPACE_LABEL: &str = "cpaas.io/namespace";

/// Label carrying the cluster a binding is scoped to
pub const CLUSTER_LABEL: &str = "cpaas.io/cluster";

/// Label selector restricting the role watch to role-family members
pub const ROLE_FAMILY_SELECTOR: &str = ROLE_FAMILY_LABEL;
