//! Authorization resolution for hierarchical tenancy
//!
//! Answers whether a subject may perform a verb on a resource, given the
//! platform/cluster/project/namespace location of the request. Facts
//! (users, bindings, role families) are mirrored from the cluster into
//! in-memory caches; each decision expands the subject's bindings into
//! permissions and matches their constraints against the request.

#![deny(missing_docs)]

pub mod authorizer;
pub mod cache;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod expander;
pub mod facts;
pub mod identity;
pub mod locator;
pub mod permission;

pub use authorizer::{AuthorizeOptions, Authorizer, RequestParts};
pub use cache::{FactCaches, FactStore, SyncState};
pub use config::{AuthzConfig, MatchMode};
pub use decision::{ActionSet, DecisionEngine};
pub use engine::AuthzEngine;
pub use error::{Error, Result};
pub use expander::PermissionExpander;
pub use identity::{ClaimsIdentityResolver, Identity, IdentityResolver};
pub use locator::{RequestLocation, RequestLocator};
pub use permission::{Constraints, Dimension, GroupResource, Permission};
