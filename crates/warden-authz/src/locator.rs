//! Request location: turn an HTTP method and path into a resource address
//!
//! Resource paths look like:
//!
//! ```text
//! /{prefix}/{group}/{ver}/{resource}[/{name}[/{subresource}]]
//! /{prefix}/{group}/{ver}/clusters/{cluster}/{resource}[/...]
//! /{prefix}/{group}/{ver}/projects/{project}/{resource}[/...]
//! /{prefix}/{group}/{ver}/projects/{project}/clusters/{cluster}/namespaces/{ns}/{resource}[/...]
//! ```
//!
//! Anything whose first segment is not a configured prefix is a
//! non-resource request and carries only its path and verb.

use serde::Deserialize;

use crate::facts::Scope;

/// Structured address of an inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestLocation {
    /// URL path as received
    pub path: String,
    /// Kubernetes verb (get, list, watch, create, ...); empty for unknown methods
    pub verb: String,
    /// Whether the path addressed an API resource
    pub is_resource_request: bool,
    /// Product prefix the path started with
    pub api_prefix: String,
    /// API group
    pub api_group: String,
    /// API version
    pub api_version: String,
    /// Project, if addressed
    pub project: String,
    /// Cluster, if addressed
    pub cluster: String,
    /// Namespace, if addressed
    pub namespace: String,
    /// Tenancy level the path addressed
    pub scope: Option<Scope>,
    /// Resource (plural)
    pub resource: String,
    /// Subresource
    pub subresource: String,
    /// Instance name
    pub name: String,
    /// Segments after the tenancy prefix, starting at the resource
    pub parts: Vec<String>,
}

/// Parses requests against a fixed set of product prefixes
#[derive(Debug, Clone)]
pub struct RequestLocator {
    prefixes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListQuery {
    watch: Option<String>,
    field_selector: Option<String>,
}

impl RequestLocator {
    /// Create a locator recognizing the given prefixes (without slashes)
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| p.into().trim_matches('/').to_string())
                .collect(),
        }
    }

    /// Locate a request from its method and path
    pub fn locate(&self, method: &str, path: &str) -> RequestLocation {
        self.locate_with_query(method, path, None)
    }

    /// Locate a request, consulting the query string for watch intent and a
    /// `metadata.name` field selector on collection reads
    pub fn locate_with_query(
        &self,
        method: &str,
        path: &str,
        query: Option<&str>,
    ) -> RequestLocation {
        let mut loc = RequestLocation {
            path: path.to_string(),
            verb: method_verb(method).to_string(),
            ..Default::default()
        };

        let segments = split_path(path);
        let Some(prefix) = segments.first() else {
            return loc;
        };
        if !self.prefixes.iter().any(|p| p == prefix) {
            return loc;
        }
        // prefix, group and version are all required
        if segments.len() < 3 {
            return loc;
        }

        loc.is_resource_request = true;
        loc.api_prefix = segments[0].to_string();
        loc.api_group = segments[1].to_string();
        loc.api_version = segments[2].to_string();

        let rest = locate_tenancy(&mut loc, &segments[3..]);
        loc.parts = rest.iter().map(|s| s.to_string()).collect();

        let mut parts = loc.parts.iter();
        if let Some(resource) = parts.next() {
            loc.resource = resource.clone();
        }
        if let Some(name) = parts.next() {
            loc.name = name.clone();
        }
        if let Some(subresource) = parts.next() {
            loc.subresource = subresource.clone();
        }

        if loc.name.is_empty() && loc.verb == "get" {
            let query = parse_query(query);
            loc.verb = if query.watch.as_deref().is_some_and(is_true) {
                "watch".to_string()
            } else {
                "list".to_string()
            };
            if let Some(name) = query
                .field_selector
                .as_deref()
                .and_then(exact_name_selector)
                .filter(|n| is_valid_path_segment(n))
            {
                loc.name = name.to_string();
            }
        }

        if loc.name.is_empty() && loc.verb == "delete" {
            loc.verb = "deletecollection".to_string();
        }

        loc
    }
}

/// Read the tenancy prefix, returning the segments that follow it.
///
/// A tenancy keyword whose value is the last segment stays in the returned
/// slice, so `projects/p1` addresses resource `projects` named `p1`.
fn locate_tenancy<'a>(loc: &mut RequestLocation, segments: &'a [&'a str]) -> &'a [&'a str] {
    match segments {
        ["projects", project, rest @ ..] => {
            loc.project = project.to_string();
            loc.scope = Some(Scope::Project);
            if rest.is_empty() {
                return segments;
            }
            match rest {
                ["clusters", cluster, after_cluster @ ..] => {
                    loc.cluster = cluster.to_string();
                    if after_cluster.is_empty() {
                        return rest;
                    }
                    match after_cluster {
                        ["namespaces", namespace, resource @ ..] => {
                            loc.namespace = namespace.to_string();
                            loc.scope = Some(Scope::Namespace);
                            if resource.is_empty() {
                                after_cluster
                            } else {
                                resource
                            }
                        }
                        _ => after_cluster,
                    }
                }
                _ => rest,
            }
        }
        ["clusters", cluster, rest @ ..] => {
            loc.cluster = cluster.to_string();
            loc.scope = Some(Scope::Cluster);
            if rest.is_empty() {
                segments
            } else {
                rest
            }
        }
        ["projects"] | ["clusters"] => segments,
        _ => {
            loc.scope = Some(Scope::Platform);
            segments
        }
    }
}

/// Map an HTTP method to a Kubernetes verb
pub fn method_verb(method: &str) -> &'static str {
    match method {
        "POST" => "create",
        "GET" | "HEAD" => "get",
        "PUT" => "update",
        "PATCH" => "patch",
        "DELETE" => "delete",
        _ => "",
    }
}

fn split_path(path: &str) -> Vec<&str> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split('/').collect()
}

fn parse_query(query: Option<&str>) -> ListQuery {
    query
        .filter(|q| !q.is_empty())
        .and_then(|q| serde_urlencoded::from_str(q).ok())
        .unwrap_or_default()
}

fn is_true(value: &str) -> bool {
    matches!(value, "true" | "1")
}

/// Name required by a field selector of the form `metadata.name=<n>` or
/// `metadata.name==<n>`, possibly alongside other terms
fn exact_name_selector(selector: &str) -> Option<&str> {
    selector.split(',').find_map(|term| {
        let value = term.trim().strip_prefix("metadata.name")?;
        let value = value.strip_prefix("==").or_else(|| value.strip_prefix('='))?;
        Some(value).filter(|v| !v.is_empty())
    })
}

fn is_valid_path_segment(name: &str) -> bool {
    name != "." && name != ".." && !name.contains('/') && !name.contains('%')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locator() -> RequestLocator {
        RequestLocator::new(["api", "platform"])
    }

    #[test]
    fn namespaced_get_in_project_cluster() {
        let loc = locator().locate(
            "GET",
            "/api/apps/v1/projects/p1/clusters/c1/namespaces/ns1/pods/foo",
        );
        assert!(loc.is_resource_request);
        assert_eq!(loc.project, "p1");
        assert_eq!(loc.cluster, "c1");
        assert_eq!(loc.namespace, "ns1");
        assert_eq!(loc.resource, "pods");
        assert_eq!(loc.name, "foo");
        assert_eq!(loc.verb, "get");
        assert_eq!(loc.scope, Some(Scope::Namespace));
        assert_eq!(loc.api_prefix, "api");
        assert_eq!(loc.api_group, "apps");
        assert_eq!(loc.api_version, "v1");
    }

    #[test]
    fn cluster_collection_delete() {
        let loc = locator().locate("DELETE", "/api/apps/v1/clusters/c1/pods");
        assert_eq!(loc.cluster, "c1");
        assert_eq!(loc.resource, "pods");
        assert_eq!(loc.name, "");
        assert_eq!(loc.verb, "deletecollection");
        assert_eq!(loc.scope, Some(Scope::Cluster));
        assert!(loc.project.is_empty());
        assert!(loc.namespace.is_empty());
    }

    #[test]
    fn project_resource_with_subresource() {
        let loc = locator().locate(
            "PUT",
            "/platform/auth.alauda.io/v1/projects/p1/userbindings/b1/status",
        );
        assert_eq!(loc.project, "p1");
        assert_eq!(loc.scope, Some(Scope::Project));
        assert_eq!(loc.resource, "userbindings");
        assert_eq!(loc.name, "b1");
        assert_eq!(loc.subresource, "status");
        assert_eq!(loc.verb, "update");
        assert_eq!(loc.parts, vec!["userbindings", "b1", "status"]);
    }

    #[test]
    fn platform_list() {
        let loc = locator().locate("GET", "/api/auth.alauda.io/v1/users");
        assert_eq!(loc.scope, Some(Scope::Platform));
        assert_eq!(loc.resource, "users");
        assert_eq!(loc.verb, "list");
    }

    #[test]
    fn bare_project_addresses_projects_resource() {
        let loc = locator().locate("GET", "/api/auth.alauda.io/v1/projects/p1");
        assert_eq!(loc.project, "p1");
        assert_eq!(loc.resource, "projects");
        assert_eq!(loc.name, "p1");
        assert_eq!(loc.verb, "get");
    }

    #[test]
    fn bare_cluster_addresses_clusters_resource() {
        let loc = locator().locate("GET", "/api/g/v1/clusters/c1");
        assert_eq!(loc.cluster, "c1");
        assert_eq!(loc.resource, "clusters");
        assert_eq!(loc.name, "c1");
    }

    #[test]
    fn project_cluster_namespace_without_resource() {
        let loc = locator().locate("GET", "/api/g/v1/projects/p1/clusters/c1/namespaces/ns1");
        assert_eq!(loc.namespace, "ns1");
        assert_eq!(loc.resource, "namespaces");
        assert_eq!(loc.name, "ns1");
    }

    #[test]
    fn project_cluster_without_namespace_keeps_project_scope() {
        let loc = locator().locate("GET", "/api/g/v1/projects/p1/clusters/c1/pods/x");
        assert_eq!(loc.project, "p1");
        assert_eq!(loc.cluster, "c1");
        assert_eq!(loc.scope, Some(Scope::Project));
        assert_eq!(loc.resource, "pods");
        assert_eq!(loc.name, "x");
    }

    #[test]
    fn unknown_prefix_is_non_resource() {
        let loc = locator().locate("GET", "/healthz");
        assert!(!loc.is_resource_request);
        assert_eq!(loc.verb, "get");
        assert_eq!(loc.path, "/healthz");
        assert!(loc.resource.is_empty());
    }

    #[test]
    fn short_path_is_non_resource() {
        let loc = locator().locate("GET", "/api/apps");
        assert!(!loc.is_resource_request);
        let loc = locator().locate("GET", "/");
        assert!(!loc.is_resource_request);
    }

    #[test]
    fn method_mapping() {
        assert_eq!(method_verb("POST"), "create");
        assert_eq!(method_verb("HEAD"), "get");
        assert_eq!(method_verb("PATCH"), "patch");
        assert_eq!(method_verb("OPTIONS"), "");
    }

    #[test]
    fn watch_query_turns_collection_get_into_watch() {
        let loc = locator().locate_with_query("GET", "/api/apps/v1/pods", Some("watch=true"));
        assert_eq!(loc.verb, "watch");
        let loc = locator().locate_with_query("GET", "/api/apps/v1/pods", Some("watch=1&limit=5"));
        assert_eq!(loc.verb, "watch");
        let loc = locator().locate_with_query("GET", "/api/apps/v1/pods", Some("watch=false"));
        assert_eq!(loc.verb, "list");
    }

    #[test]
    fn field_selector_names_the_instance() {
        let loc = locator().locate_with_query(
            "GET",
            "/api/apps/v1/pods",
            Some("fieldSelector=metadata.name%3Dfoo"),
        );
        assert_eq!(loc.verb, "list");
        assert_eq!(loc.name, "foo");

        let loc = locator().locate_with_query(
            "GET",
            "/api/apps/v1/pods",
            Some("fieldSelector=metadata.name%3D..%2Cstatus.phase%3DRunning"),
        );
        assert_eq!(loc.name, "");
    }

    #[test]
    fn custom_prefixes() {
        let locator = RequestLocator::new(["/kubernetes/"]);
        assert!(locator.locate("GET", "/kubernetes/apps/v1/pods").is_resource_request);
        assert!(!locator.locate("GET", "/api/apps/v1/pods").is_resource_request);
    }
}
