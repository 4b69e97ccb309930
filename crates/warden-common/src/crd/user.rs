//! User CRD
//!
//! A User is the platform-level record of an authenticated identity. Its
//! object name is the subject name Warden authorizes (a hash of the email),
//! and `spec.groups` lists the groups the subject belongs to.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// User defines a platform identity and its group memberships.
///
/// Example:
/// ```yaml
/// apiVersion: auth.alauda.io/v1
/// kind: User
/// metadata:
///   name: 8bd108c8a01a892d129c52484ef97a0d
/// spec:
///   email: alice@example.com
///   username: alice
///   connector_type: ldap
///   connector_name: corp
///   groups: ["frontend", "oncall"]
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "auth.alauda.io",
    version = "v1",
    kind = "User",
    printcolumn = r#"{"name":"Email","type":"string","jsonPath":".spec.email"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct UserSpec {
    /// Identity provider type (ldap, oidc, local)
    #[serde(default)]
    pub connector_type: String,

    /// Identity provider instance name
    #[serde(default)]
    pub connector_name: String,

    /// Email address; hashed to form the subject name
    #[serde(default)]
    pub email: String,

    /// Display username
    #[serde(default)]
    pub username: String,

    /// Groups this user is a member of
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub groups: Vec<String>,

    /// Whether the user is a platform administrator
    #[serde(default)]
    pub is_admin: bool,

    /// Account state (active, disabled, locked, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// Whether the account is disabled
    #[serde(default)]
    pub is_disabled: bool,
}
