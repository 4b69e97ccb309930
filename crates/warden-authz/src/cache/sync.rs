//! Watch-driven cache synchronization
//!
//! One task per object kind consumes a watcher stream and applies it to a
//! [`FactStore`]. Initial and re-list pages are buffered and swapped in
//! whole on `InitDone`, so objects deleted during a watch gap disappear.
//!
//! Readiness is published on a `watch` channel. Before the first listing
//! completes, any stream error is fatal; afterwards errors are logged and
//! the task backs off before polling again.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use kube::runtime::watcher::{self, Event};
use kube::ResourceExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use warden_common::metrics::{record_cache_event, EventOutcome};

use super::FactStore;
use crate::error::{Error, Result};

/// Readiness of one cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// Initial listing still in progress
    Pending,
    /// Initial listing applied; incremental events flowing
    Ready,
    /// Initial listing failed; the cache will never become ready
    Failed(String),
}

/// Handle to a running sync task
#[derive(Debug)]
pub struct SyncHandle {
    kind: &'static str,
    state: watch::Receiver<SyncState>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Kind of object this task syncs
    pub fn kind(&self) -> &'static str {
        self.kind
    }

    /// Current readiness
    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Wait until the initial listing is applied
    ///
    /// Returns [`Error::Unavailable`] if the initial sync failed or the task
    /// ended first.
    pub async fn wait_ready(&mut self) -> Result<()> {
        let kind = self.kind;
        let state = self
            .state
            .wait_for(|s| *s != SyncState::Pending)
            .await
            .map_err(|_| Error::unavailable(format!("{kind} sync ended before initial listing")))?;
        if let SyncState::Failed(reason) = &*state {
            return Err(Error::unavailable(format!(
                "{kind} initial sync failed: {reason}"
            )));
        }
        Ok(())
    }

    /// Wait for the task to finish
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                warn!(kind = self.kind, error = %e, "Sync task panicked");
            }
        }
    }

    /// Abort the task without waiting
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Spawn a task applying a watcher stream to a store
pub fn spawn_sync<S, St>(
    store: Arc<S>,
    stream: St,
    error_backoff: Duration,
    cancel: CancellationToken,
) -> SyncHandle
where
    S: FactStore,
    St: Stream<Item = std::result::Result<Event<S::Object>, watcher::Error>> + Send + 'static,
{
    let (tx, rx) = watch::channel(SyncState::Pending);
    let task = tokio::spawn(run_sync(store, stream, tx, error_backoff, cancel));
    SyncHandle {
        kind: S::KIND,
        state: rx,
        task,
    }
}

/// Apply a watcher stream to a store until it ends, fails before the
/// initial listing, or `cancel` fires
#[instrument(skip_all, fields(kind = S::KIND))]
pub async fn run_sync<S, St>(
    store: Arc<S>,
    stream: St,
    state: watch::Sender<SyncState>,
    error_backoff: Duration,
    cancel: CancellationToken,
) where
    S: FactStore,
    St: Stream<Item = std::result::Result<Event<S::Object>, watcher::Error>> + Send,
{
    let mut stream = std::pin::pin!(stream);
    let mut ready = false;
    let mut buffer: Option<Vec<S::Object>> = None;

    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Sync cancelled");
                break;
            }
            next = stream.next() => match next {
                Some(event) => event,
                None => {
                    if ready {
                        warn!("Watch stream ended");
                    } else {
                        fail(&state, "watch stream ended before initial listing");
                    }
                    break;
                }
            },
        };

        match event {
            Ok(Event::Init) => {
                debug!("Listing started");
                buffer = Some(Vec::new());
            }
            Ok(Event::InitApply(obj)) => {
                buffer.get_or_insert_with(Vec::new).push(obj);
            }
            Ok(Event::InitDone) => {
                let objs = buffer.take().unwrap_or_default();
                let skipped = store.replace(&objs);
                for e in &skipped {
                    warn!(error = %e, "Skipping object during listing");
                    record_cache_event(S::KIND, "relist", EventOutcome::Skipped);
                }
                record_cache_event(S::KIND, "relist", EventOutcome::Ok);
                info!(
                    listed = objs.len(),
                    skipped = skipped.len(),
                    stored = store.len(),
                    "Listing applied"
                );
                if !ready {
                    ready = true;
                    state.send_replace(SyncState::Ready);
                }
            }
            Ok(Event::Apply(obj)) => match store.on_apply(&obj) {
                Ok(()) => record_cache_event(S::KIND, "apply", EventOutcome::Ok),
                Err(e) => {
                    warn!(name = %obj.name_any(), error = %e, "Skipping watch event");
                    record_cache_event(S::KIND, "apply", EventOutcome::Skipped);
                }
            },
            Ok(Event::Delete(obj)) => {
                debug!(name = %obj.name_any(), "Deleting");
                store.on_delete(&obj);
                record_cache_event(S::KIND, "delete", EventOutcome::Ok);
            }
            Err(e) if !ready => {
                error!(error = %e, "Initial listing failed");
                fail(&state, &e.to_string());
                break;
            }
            Err(e) => {
                warn!(error = %e, "Watcher error, will retry");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(error_backoff) => {}
                }
            }
        }
    }
}

fn fail(state: &watch::Sender<SyncState>, reason: &str) {
    state.send_replace(SyncState::Failed(reason.to_string()));
}
