//! Aggregation of permissions into decisions

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use warden_common::metrics::{record_decision, AuthDecision};

use crate::cache::FactCaches;
use crate::config::{AuthzConfig, MatchMode};
use crate::error::{Error, Result};
use crate::expander::PermissionExpander;
use crate::facts::{Subject, WILDCARD};
use crate::permission::{Constraints, GroupResource, Permission};

/// Verbs a subject may perform on a resource under some constraints
///
/// A set containing the wildcard holds nothing else.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet(BTreeSet<String>);

impl ActionSet {
    /// Build from verbs, collapsing to `{"*"}` if the wildcard is present
    pub fn from_verbs<I, S>(verbs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = BTreeSet::new();
        for verb in verbs {
            let verb = verb.into();
            if verb == WILDCARD {
                return Self::wildcard();
            }
            set.insert(verb);
        }
        Self(set)
    }

    /// The set allowing every verb
    pub fn wildcard() -> Self {
        Self(BTreeSet::from([WILDCARD.to_string()]))
    }

    /// Whether this set is exactly `{"*"}`
    pub fn is_wildcard(&self) -> bool {
        self.0.contains(WILDCARD)
    }

    /// Whether `verb` is allowed
    pub fn allows(&self, verb: &str) -> bool {
        has_action(verb, self.0.iter())
    }

    /// Number of distinct verbs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is allowed
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Verbs in sorted order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Verbs as a sorted list
    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

/// Whether `verb` is granted by `actions`, directly or by wildcard
pub fn has_action<I, S>(verb: &str, actions: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    actions
        .into_iter()
        .any(|a| a.as_ref() == WILDCARD || a.as_ref() == verb)
}

/// Union the actions of every permission that matches the request
pub fn aggregate(permissions: &[Permission], request: &Constraints, mode: MatchMode) -> ActionSet {
    ActionSet::from_verbs(
        permissions
            .iter()
            .filter(|p| p.matches(request, mode))
            .flat_map(|p| p.actions.iter().map(String::as_str)),
    )
}

/// Answers what a subject may do
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    expander: PermissionExpander,
    mode: MatchMode,
}

impl DecisionEngine {
    /// Create an engine over the given caches
    pub fn new(caches: FactCaches, config: &AuthzConfig) -> Self {
        Self {
            expander: PermissionExpander::new(caches, config.expand_timeout),
            mode: config.match_mode,
        }
    }

    /// Constraint matching policy in use
    pub fn match_mode(&self) -> MatchMode {
        self.mode
    }

    /// The underlying expander
    pub fn expander(&self) -> &PermissionExpander {
        &self.expander
    }

    /// Look up a subject in the subject cache
    pub fn subject(&self, name: &str) -> Result<Arc<Subject>> {
        self.expander
            .caches()
            .subjects
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("subject {name:?}")))
    }

    /// Actions a subject may perform on a resource under `constraints`
    pub async fn get_actions(
        &self,
        subject: &str,
        resource: &GroupResource,
        constraints: &Constraints,
    ) -> Result<ActionSet> {
        self.get_actions_with_cancel(subject, resource, constraints, &CancellationToken::new())
            .await
    }

    /// [`get_actions`](Self::get_actions) with caller cancellation
    pub async fn get_actions_with_cancel(
        &self,
        subject: &str,
        resource: &GroupResource,
        constraints: &Constraints,
        cancel: &CancellationToken,
    ) -> Result<ActionSet> {
        if subject.is_empty() {
            return Err(Error::invalid_argument("subject is empty"));
        }
        if resource.resource.is_empty() {
            return Err(Error::invalid_argument("resource is empty"));
        }

        let permissions = self
            .expander
            .expand_with_cancel(subject, resource, cancel)
            .await;
        Ok(aggregate(&permissions, constraints, self.mode))
    }

    /// Whether a subject may perform `verb` on a resource under `constraints`
    pub async fn verify(
        &self,
        subject: &str,
        verb: &str,
        resource: &GroupResource,
        constraints: &Constraints,
    ) -> Result<bool> {
        self.verify_with_cancel(subject, verb, resource, constraints, &CancellationToken::new())
            .await
    }

    /// [`verify`](Self::verify) with caller cancellation
    #[instrument(skip(self, resource, constraints, cancel), fields(resource = %resource))]
    pub async fn verify_with_cancel(
        &self,
        subject: &str,
        verb: &str,
        resource: &GroupResource,
        constraints: &Constraints,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let actions = match self
            .get_actions_with_cancel(subject, resource, constraints, cancel)
            .await
        {
            Ok(actions) => actions,
            Err(e) => {
                record_decision(AuthDecision::Error, verb);
                return Err(e);
            }
        };

        let allowed = actions.allows(verb);
        debug!(
            ?constraints,
            actions = ?actions.iter().collect::<Vec<_>>(),
            allowed,
            mode = %self.mode,
            "Authorization decision"
        );
        record_decision(
            if allowed {
                AuthDecision::Allow
            } else {
                AuthDecision::Deny
            },
            verb,
        );
        Ok(allowed)
    }
}
