//! Request authorization
//!
//! Combines identity resolution, request location and the decision engine
//! into a single call for the HTTP middleware boundary.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::http::Request;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use warden_common::metrics::{record_decision, AuthDecision};

use crate::decision::DecisionEngine;
use crate::error::{Error, Result};
use crate::identity::{extract_bearer_token, IdentityResolver};
use crate::locator::{RequestLocation, RequestLocator};
use crate::permission::{Constraints, Dimension, GroupResource};

/// Per-call authorization options
#[derive(Debug, Clone, Default)]
pub struct AuthorizeOptions {
    /// Remaps `"<resource>.<group>"` to another `"<resource>.<group>"`
    /// before evaluation
    pub resource_map: HashMap<String, String>,
}

impl AuthorizeOptions {
    /// Add a resource remapping
    pub fn map_resource(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.resource_map.insert(from.into(), to.into());
        self
    }
}

/// The parts of an HTTP request authorization looks at
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestParts {
    /// HTTP method
    pub method: String,
    /// URL path
    pub path: String,
    /// Raw query string
    pub query: Option<String>,
    /// Bearer credential
    pub credential: Option<String>,
}

impl RequestParts {
    /// Capture the relevant parts of an HTTP request
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().as_str().to_string(),
            path: req.uri().path().to_string(),
            query: req.uri().query().map(str::to_string),
            credential: extract_bearer_token(req.headers()).map(str::to_string),
        }
    }
}

/// Authorizes inbound requests
#[derive(Clone)]
pub struct Authorizer {
    decisions: DecisionEngine,
    locator: RequestLocator,
    identity: Arc<dyn IdentityResolver>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("decisions", &self.decisions)
            .field("locator", &self.locator)
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Create an authorizer
    pub fn new(
        decisions: DecisionEngine,
        locator: RequestLocator,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            decisions,
            locator,
            identity,
        }
    }

    /// The decision engine behind this authorizer
    pub fn decisions(&self) -> &DecisionEngine {
        &self.decisions
    }

    /// The request locator behind this authorizer
    pub fn locator(&self) -> &RequestLocator {
        &self.locator
    }

    /// Whether the request may proceed
    pub fn authorize<'a, B>(
        &'a self,
        req: &Request<B>,
        options: Option<&'a AuthorizeOptions>,
    ) -> impl Future<Output = Result<bool>> + Send + 'a {
        self.authorize_parts(RequestParts::from_request(req), options, CancellationToken::new())
    }

    /// [`authorize`](Self::authorize) with caller cancellation
    pub fn authorize_with_cancel<'a, B>(
        &'a self,
        req: &Request<B>,
        options: Option<&'a AuthorizeOptions>,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<bool>> + Send + 'a {
        self.authorize_parts(RequestParts::from_request(req), options, cancel)
    }

    /// Authorize, turning a deny into [`Error::Forbidden`]
    pub async fn enforce(
        &self,
        parts: RequestParts,
        options: Option<&AuthorizeOptions>,
    ) -> Result<()> {
        let summary = format!("{} {}", parts.method, parts.path);
        if self
            .authorize_parts(parts, options, CancellationToken::new())
            .await?
        {
            Ok(())
        } else {
            Err(Error::Forbidden(format!("access denied to {summary}")))
        }
    }

    /// Authorize already-extracted request parts
    #[instrument(
        skip(self, parts, options, cancel),
        fields(method = %parts.method, path = %parts.path)
    )]
    pub async fn authorize_parts(
        &self,
        parts: RequestParts,
        options: Option<&AuthorizeOptions>,
        cancel: CancellationToken,
    ) -> Result<bool> {
        let credential = parts
            .credential
            .as_deref()
            .ok_or_else(|| Error::unauthenticated("missing bearer token"))?;
        let identity = self.identity.identify(credential).await?;

        if identity.is_service_account {
            debug!(
                subject = %identity.subject,
                issuer = %identity.issuer,
                "Skipping service account authorization"
            );
            record_decision(AuthDecision::Allow, "serviceaccount");
            return Ok(true);
        }

        let location = self
            .locator
            .locate_with_query(&parts.method, &parts.path, parts.query.as_deref());
        if !location.is_resource_request {
            return Err(Error::invalid_argument(format!(
                "{} is not a resource request",
                parts.path
            )));
        }

        let resource = remap_resource(&location, options);
        let constraints = request_constraints(&location);

        debug!(
            subject = %identity.subject,
            verb = %location.verb,
            resource = %resource,
            "Checking authorization"
        );

        self.decisions
            .verify_with_cancel(&identity.subject, &location.verb, &resource, &constraints, &cancel)
            .await
    }
}

/// Resource to evaluate, after applying any caller remapping
pub fn remap_resource(
    location: &RequestLocation,
    options: Option<&AuthorizeOptions>,
) -> GroupResource {
    let key = format!("{}.{}", location.resource, location.api_group);
    match options.and_then(|o| o.resource_map.get(&key)) {
        Some(mapped) => match mapped.split_once('.') {
            Some((resource, group)) => GroupResource::new(group, resource),
            None => GroupResource::new("", mapped.as_str()),
        },
        None => GroupResource::new(location.api_group.as_str(), location.resource.as_str()),
    }
}

/// Constraint set a located request presents: every non-empty tenancy
/// field plus the instance name
pub fn request_constraints(location: &RequestLocation) -> Constraints {
    [
        (Dimension::Project, &location.project),
        (Dimension::Namespace, &location.namespace),
        (Dimension::Cluster, &location.cluster),
        (Dimension::ResourceName, &location.name),
    ]
    .into_iter()
    .filter(|(_, value)| !value.is_empty())
    .map(|(dim, value)| (dim, value.clone()))
    .collect()
}
