//! Permission expansion
//!
//! Turns a subject's bindings into flattened [`Permission`]s for one
//! resource. Each binding is expanded in its own task, and within it each
//! role of the binding's family in a nested task. The whole collection runs
//! under a deadline; when the deadline passes or the caller cancels, the
//! outstanding tasks are aborted and whatever was collected is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use warden_common::metrics::{record_expand_duration, record_expand_interrupted};

use crate::cache::{FactCaches, RoleCache};
use crate::facts::{Binding, Role};
use crate::permission::{Constraints, Dimension, GroupResource, Permission};

/// Expands bindings into permissions
#[derive(Debug, Clone)]
pub struct PermissionExpander {
    caches: FactCaches,
    timeout: Duration,
}

impl PermissionExpander {
    /// Create an expander over the given caches
    pub fn new(caches: FactCaches, timeout: Duration) -> Self {
        Self { caches, timeout }
    }

    /// Caches this expander reads
    pub fn caches(&self) -> &FactCaches {
        &self.caches
    }

    /// Bindings that apply to a subject: direct ones, then those of each of
    /// its groups. Not deduplicated.
    pub fn bindings_for(&self, subject: &str) -> Vec<Arc<Binding>> {
        let mut bindings = self.caches.bindings.by_subject(subject);
        let groups = self.caches.subjects.groups_of(subject);
        if !groups.is_empty() {
            bindings.extend(self.caches.bindings.by_groups(groups.as_slice()));
        }
        bindings
    }

    /// Expand to completion or deadline
    pub async fn expand(&self, subject: &str, resource: &GroupResource) -> Vec<Permission> {
        self.expand_with_cancel(subject, resource, &CancellationToken::new())
            .await
    }

    /// Expand, stopping early if `cancel` fires
    ///
    /// Never fails; an interrupted expansion returns the permissions
    /// collected so far, in no particular order.
    #[instrument(skip(self, resource, cancel), fields(resource = %resource))]
    pub async fn expand_with_cancel(
        &self,
        subject: &str,
        resource: &GroupResource,
        cancel: &CancellationToken,
    ) -> Vec<Permission> {
        let start = Instant::now();
        let bindings = self.bindings_for(subject);
        if bindings.is_empty() {
            debug!("No bindings");
            return Vec::new();
        }

        let resource = Arc::new(resource.clone());
        let mut tasks = JoinSet::new();
        for binding in bindings {
            tasks.spawn(expand_binding(
                self.caches.roles.clone(),
                binding,
                resource.clone(),
            ));
        }
        let binding_count = tasks.len();

        let (permissions, interrupted) = collect_until(&mut tasks, self.timeout, cancel).await;

        if let Some(reason) = interrupted {
            warn!(
                reason,
                bindings = binding_count,
                collected = permissions.len(),
                "Expansion interrupted, returning partial result"
            );
            record_expand_interrupted(reason);
        }

        record_expand_duration(start.elapsed().as_secs_f64());
        debug!(
            bindings = binding_count,
            permissions = permissions.len(),
            "Expanded"
        );
        permissions
    }
}

/// Drain `tasks` until they all finish, `deadline` passes, or `cancel`
/// fires. On interruption the remaining tasks are aborted and the reason is
/// returned alongside whatever was collected.
async fn collect_until(
    tasks: &mut JoinSet<Vec<Permission>>,
    deadline: Duration,
    cancel: &CancellationToken,
) -> (Vec<Permission>, Option<&'static str>) {
    let mut permissions = Vec::new();
    let interrupted = tokio::select! {
        biased;
        _ = cancel.cancelled() => Some("cancelled"),
        res = tokio::time::timeout(deadline, collect(tasks, &mut permissions)) => {
            res.err().map(|_| "deadline")
        }
    };
    if interrupted.is_some() {
        tasks.abort_all();
    }
    (permissions, interrupted)
}

async fn collect(tasks: &mut JoinSet<Vec<Permission>>, out: &mut Vec<Permission>) {
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(perms) => out.extend(perms),
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "Expansion task failed"),
        }
    }
}

async fn expand_binding(
    roles: Arc<RoleCache>,
    binding: Arc<Binding>,
    resource: Arc<GroupResource>,
) -> Vec<Permission> {
    let family = roles.by_family(&binding.role_family);
    if family.is_empty() {
        debug!(binding = %binding.key, family = %binding.role_family, "Role family has no roles");
        return Vec::new();
    }

    let constraints = Arc::new(binding.constraints());
    let mut tasks = JoinSet::new();
    for role in family {
        let constraints = constraints.clone();
        let resource = resource.clone();
        tasks.spawn(async move { role_permissions(&role, &constraints, &resource) });
    }

    let mut out = Vec::new();
    collect(&mut tasks, &mut out).await;
    out
}

/// Permissions one role grants on a resource under a binding's constraints
pub fn role_permissions(
    role: &Role,
    constraints: &Constraints,
    resource: &GroupResource,
) -> Vec<Permission> {
    let mut out = Vec::new();
    for rule in role.rules.iter().filter(|r| r.applies_to(resource)) {
        let permission = |constraints: Constraints| Permission {
            role_name: role.name.clone(),
            actions: rule.verbs.clone(),
            constraints,
            resource: resource.clone(),
        };
        if rule.resource_names.is_empty() {
            out.push(permission(constraints.clone()));
        } else {
            for name in &rule.resource_names {
                let mut scoped = constraints.clone();
                scoped.insert(Dimension::ResourceName, name.clone());
                out.push(permission(scoped));
            }
        }
    }
    out
}
