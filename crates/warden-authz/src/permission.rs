//! Flattened permissions and constraint matching

use std::collections::BTreeMap;
use std::fmt;

use crate::config::MatchMode;

/// A tenancy axis a permission may be limited to
///
/// The declaration order is the canonical visiting order for
/// [`MatchMode::Legacy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Dimension {
    /// Project name
    Project,
    /// Namespace name
    Namespace,
    /// Cluster name; on permissions, a comma-separated list
    Cluster,
    /// Resource instance name
    ResourceName,
}

impl Dimension {
    /// Label value for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Namespace => "namespace",
            Self::Cluster => "cluster",
            Self::ResourceName => "resourceName",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraint values keyed by dimension
pub type Constraints = BTreeMap<Dimension, String>;

/// An API group and resource, e.g. `pods.apps`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GroupResource {
    /// API group; empty for the core group
    pub group: String,
    /// Plural resource name
    pub resource: String,
}

impl GroupResource {
    /// Create a group resource
    pub fn new(group: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            resource: resource.into(),
        }
    }
}

impl fmt::Display for GroupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            f.write_str(&self.resource)
        } else {
            write!(f, "{}.{}", self.resource, self.group)
        }
    }
}

/// A request-independent grant of actions under a constraint set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Permission {
    /// Role the permission came from
    pub role_name: String,
    /// Granted verbs, may contain `*`
    pub actions: Vec<String>,
    /// Empty means unconstrained
    pub constraints: Constraints,
    /// Resource the permission was expanded for
    pub resource: GroupResource,
}

impl Permission {
    /// Whether this permission applies to a request's constraint set
    pub fn matches(&self, request: &Constraints, mode: MatchMode) -> bool {
        matches(&self.constraints, request, mode)
    }
}

/// Decide whether permission constraints are satisfied by request constraints
///
/// A request dimension that is absent compares as the empty string. The
/// cluster dimension matches when the request's cluster is one of the
/// permission's comma-separated clusters.
pub fn matches(permission: &Constraints, request: &Constraints, mode: MatchMode) -> bool {
    if permission.is_empty() {
        return true;
    }
    match mode {
        MatchMode::Strict => permission
            .iter()
            .all(|(dim, want)| dimension_matches(*dim, want, request_value(request, *dim))),
        MatchMode::Legacy => legacy_matches(permission, request),
    }
}

// First dimension whose request value is absent or different decides:
// the whole check passes only when that dimension is the cluster and the
// request's cluster is in the list.
fn legacy_matches(permission: &Constraints, request: &Constraints) -> bool {
    for (dim, want) in permission {
        match request.get(dim) {
            Some(got) if got == want => continue,
            got => {
                let got = got.map(String::as_str).unwrap_or_default();
                return *dim == Dimension::Cluster && in_cluster_list(want, got);
            }
        }
    }
    true
}

fn dimension_matches(dim: Dimension, want: &str, got: &str) -> bool {
    match dim {
        Dimension::Cluster => in_cluster_list(want, got),
        _ => want == got,
    }
}

fn in_cluster_list(list: &str, cluster: &str) -> bool {
    list.split(',').any(|c| c == cluster)
}

fn request_value(request: &Constraints, dim: Dimension) -> &str {
    request.get(&dim).map(String::as_str).unwrap_or_default()
}
