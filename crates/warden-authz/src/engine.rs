//! Engine lifecycle
//!
//! An [`AuthzEngine`] owns the fact caches, the background tasks that keep
//! them in sync with the cluster, and the resolution components built on
//! top. Startup fails unless every cache completes its initial listing
//! within the configured timeout.

use std::sync::Arc;

use futures::Stream;
use k8s_openapi::api::rbac::v1::ClusterRole;
use kube::runtime::watcher::{self, watcher, Event};
use kube::{Api, Client};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_common::crd::{User, UserBinding};
use warden_common::ROLE_FAMILY_SELECTOR;

use crate::authorizer::{AuthorizeOptions, Authorizer, RequestParts};
use crate::cache::sync::spawn_sync;
use crate::cache::{FactCaches, SyncHandle, SyncState};
use crate::config::AuthzConfig;
use crate::decision::{ActionSet, DecisionEngine};
use crate::error::{Error, Result};
use crate::identity::{ClaimsIdentityResolver, IdentityResolver};
use crate::locator::RequestLocator;
use crate::permission::{Constraints, GroupResource};

type WatchItem<K> = std::result::Result<Event<K>, watcher::Error>;

/// A running authorization engine
pub struct AuthzEngine {
    caches: FactCaches,
    authorizer: Authorizer,
    config: AuthzConfig,
    cancel: CancellationToken,
    syncs: Vec<SyncHandle>,
}

impl std::fmt::Debug for AuthzEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthzEngine")
            .field("caches", &self.caches)
            .field("config", &self.config)
            .field("syncs", &self.syncs.len())
            .finish_non_exhaustive()
    }
}

impl AuthzEngine {
    /// Start syncing from the cluster and wait for the caches to be ready
    pub async fn start(client: Client, config: AuthzConfig) -> Result<Self> {
        let identity = Arc::new(ClaimsIdentityResolver::new(
            config.service_account_issuers.clone(),
        ));
        Self::start_with_identity(client, config, identity).await
    }

    /// [`start`](Self::start) with a custom identity resolver
    pub async fn start_with_identity(
        client: Client,
        config: AuthzConfig,
        identity: Arc<dyn IdentityResolver>,
    ) -> Result<Self> {
        let watch_config = watcher::Config::default().timeout(config.watch_timeout_secs);
        let users: Api<User> = Api::all(client.clone());
        let bindings: Api<UserBinding> = Api::all(client.clone());
        let roles: Api<ClusterRole> = Api::all(client);

        info!(
            match_mode = %config.match_mode,
            prefixes = ?config.api_prefixes,
            "Starting authorization engine"
        );

        Self::start_from_streams(
            config,
            identity,
            watcher(users, watch_config.clone()),
            watcher(bindings, watch_config.clone()),
            watcher(roles, watch_config.labels(ROLE_FAMILY_SELECTOR)),
        )
        .await
    }

    /// Start from arbitrary watch streams, one per kind
    pub async fn start_from_streams<U, B, R>(
        config: AuthzConfig,
        identity: Arc<dyn IdentityResolver>,
        users: U,
        bindings: B,
        roles: R,
    ) -> Result<Self>
    where
        U: Stream<Item = WatchItem<User>> + Send + 'static,
        B: Stream<Item = WatchItem<UserBinding>> + Send + 'static,
        R: Stream<Item = WatchItem<ClusterRole>> + Send + 'static,
    {
        let caches = FactCaches::new();
        let cancel = CancellationToken::new();
        let backoff = config.watch_error_backoff;

        let syncs = vec![
            spawn_sync(caches.subjects.clone(), users, backoff, cancel.child_token()),
            spawn_sync(caches.bindings.clone(), bindings, backoff, cancel.child_token()),
            spawn_sync(caches.roles.clone(), roles, backoff, cancel.child_token()),
        ];

        let mut engine = Self::assemble(caches, config, identity, cancel, syncs);
        if let Err(e) = engine.wait_ready().await {
            warn!(error = %e, "Initial sync failed, shutting down");
            engine.shutdown().await;
            return Err(e);
        }

        info!(
            subjects = crate::cache::FactStore::len(engine.caches.subjects.as_ref()),
            bindings = crate::cache::FactStore::len(engine.caches.bindings.as_ref()),
            roles = crate::cache::FactStore::len(engine.caches.roles.as_ref()),
            "Authorization engine ready"
        );
        Ok(engine)
    }

    /// Build an engine over caches that are populated by the caller
    pub fn from_caches(
        caches: FactCaches,
        config: AuthzConfig,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self::assemble(caches, config, identity, CancellationToken::new(), Vec::new())
    }

    fn assemble(
        caches: FactCaches,
        config: AuthzConfig,
        identity: Arc<dyn IdentityResolver>,
        cancel: CancellationToken,
        syncs: Vec<SyncHandle>,
    ) -> Self {
        let decisions = DecisionEngine::new(caches.clone(), &config);
        let locator = RequestLocator::new(config.api_prefixes.iter().cloned());
        Self {
            authorizer: Authorizer::new(decisions, locator, identity),
            caches,
            config,
            cancel,
            syncs,
        }
    }

    async fn wait_ready(&mut self) -> Result<()> {
        let timeout = self.config.initial_sync_timeout;
        let syncs = &mut self.syncs;
        tokio::time::timeout(timeout, async move {
            for handle in syncs.iter_mut() {
                handle.wait_ready().await?;
                info!(kind = handle.kind(), "Cache synced");
            }
            Ok::<(), Error>(())
        })
        .await
        .map_err(|_| Error::unavailable(format!("caches not synced within {timeout:?}")))?
    }

    /// Whether every sync task has completed its initial listing
    pub fn is_ready(&self) -> bool {
        self.syncs.iter().all(|h| h.state() == SyncState::Ready)
    }

    /// The fact caches
    pub fn caches(&self) -> &FactCaches {
        &self.caches
    }

    /// The decision engine
    pub fn decisions(&self) -> &DecisionEngine {
        self.authorizer.decisions()
    }

    /// The request authorizer
    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }

    /// The configuration the engine was started with
    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    /// See [`DecisionEngine::verify`]
    pub async fn verify(
        &self,
        subject: &str,
        verb: &str,
        resource: &GroupResource,
        constraints: &Constraints,
    ) -> Result<bool> {
        self.decisions()
            .verify(subject, verb, resource, constraints)
            .await
    }

    /// See [`DecisionEngine::get_actions`]
    pub async fn get_actions(
        &self,
        subject: &str,
        resource: &GroupResource,
        constraints: &Constraints,
    ) -> Result<ActionSet> {
        self.decisions()
            .get_actions(subject, resource, constraints)
            .await
    }

    /// See [`Authorizer::authorize_parts`]
    pub async fn authorize(
        &self,
        parts: RequestParts,
        options: Option<&AuthorizeOptions>,
    ) -> Result<bool> {
        self.authorizer
            .authorize_parts(parts, options, self.cancel.child_token())
            .await
    }

    /// Stop every sync task and wait for them to finish
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for handle in std::mem::take(&mut self.syncs) {
            handle.join().await;
        }
        info!("Authorization engine stopped");
    }
}

impl Drop for AuthzEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::test_support::{cluster_role, rule, user, BindingBuilder};
    use crate::identity::MockIdentityResolver;
    use crate::permission::Dimension;
    use futures::{stream, StreamExt};
    use std::time::Duration;

    fn listing<K: Send + 'static>(
        objs: Vec<K>,
    ) -> impl Stream<Item = WatchItem<K>> + Send + 'static {
        let mut events = vec![Ok(Event::Init)];
        events.extend(objs.into_iter().map(|o| Ok(Event::InitApply(o))));
        events.push(Ok(Event::InitDone));
        stream::iter(events).chain(stream::pending())
    }

    fn config() -> AuthzConfig {
        AuthzConfig::default().with_initial_sync_timeout(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn starts_once_all_caches_listed() {
        let engine = AuthzEngine::start_from_streams(
            config(),
            Arc::new(MockIdentityResolver::new()),
            listing(vec![user("u1", &["devs"])]),
            listing(vec![BindingBuilder::new("devs-view", "viewer", "cluster")
                .group("devs")
                .constraint_clusters(&["c1", "c2"])
                .build()]),
            listing(vec![cluster_role(
                "viewer",
                "viewer",
                vec![rule(&["apps"], &["pods"], &["get"], &[])],
            )]),
        )
        .await
        .unwrap();

        assert!(engine.is_ready());
        let pods = GroupResource::new("apps", "pods");
        let c2: Constraints = [(Dimension::Cluster, "c2".to_string())].into();
        let c3: Constraints = [(Dimension::Cluster, "c3".to_string())].into();
        assert!(engine.verify("u1", "get", &pods, &c2).await.unwrap());
        assert!(!engine.verify("u1", "get", &pods, &c3).await.unwrap());

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn failed_listing_aborts_startup() {
        let broken = stream::iter(vec![
            Ok(Event::Init),
            Err(watcher::Error::NoResourceVersion),
        ]);
        let result = AuthzEngine::start_from_streams(
            config(),
            Arc::new(MockIdentityResolver::new()),
            listing(Vec::<User>::new()),
            broken,
            listing(Vec::<ClusterRole>::new()),
        )
        .await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_listing_times_out() {
        let result = AuthzEngine::start_from_streams(
            config(),
            Arc::new(MockIdentityResolver::new()),
            stream::pending(),
            listing(Vec::<UserBinding>::new()),
            listing(Vec::<ClusterRole>::new()),
        )
        .await;
        assert!(matches!(result, Err(Error::Unavailable(msg)) if msg.contains("not synced")));
    }

    #[tokio::test]
    async fn engine_over_prebuilt_caches_is_ready() {
        let engine = AuthzEngine::from_caches(
            FactCaches::new(),
            AuthzConfig::default(),
            Arc::new(MockIdentityResolver::new()),
        );
        assert!(engine.is_ready());
        let actions = engine
            .get_actions("u1", &GroupResource::new("apps", "pods"), &Constraints::new())
            .await
            .unwrap();
        assert!(actions.is_empty());
    }
}
