//! Per-account sync orchestrator.
//!
//! The orchestrator owns one session per signed-in account. A session
//! bundles a durable queue, a response handler, a dispatcher, a poller
//! and (optionally) a realtime connection, and runs a worker task that
//! drains the queue. Sessions for different accounts share nothing but the
//! collaborators passed in at construction.
//!
//! Collaborators observe progress through [`SyncNotification`]s, never
//! through raw transport errors.

mod session;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use notesync_core::{FailureKind, PauseReason, PushOutcome, SyncEvent, SyncState};
use notesync_types::{AccountId, IntentError, LocalIntent, Operation, ResourceKind};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::config::{ConfigError, SyncConfig};
use crate::credentials::CredentialProvider;
use crate::merge::MergeStrategy;
use crate::persist::PersistError;
use crate::realtime::RealtimeChannel;
use crate::store::LocalStore;
use crate::transport::TransportHandler;
use session::Session;

/// Capacity of the notification channel. Slow subscribers skip ahead.
const NOTIFICATION_CAPACITY: usize = 256;

/// Orchestrator errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The account is not signed in.
    #[error("account {0} is not signed in")]
    UnknownAccount(AccountId),

    /// The account's queue mirror could not be restored.
    #[error("queue restore failed: {0}")]
    Persist(#[from] PersistError),

    /// A local intent could not become an operation.
    #[error("invalid intent: {0}")]
    Intent(#[from] IntentError),

    /// The configuration is out of range.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// A sync-state change for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncNotification {
    /// The account.
    pub account: AccountId,
    /// What happened.
    pub kind: NotificationKind,
}

/// What a [`SyncNotification`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// The queue started draining.
    Started,
    /// The queue drained.
    Succeeded,
    /// An operation failed and will be retried.
    Failed(FailureKind),
    /// The queue is paused until remediated.
    Paused(PauseReason),
    /// A pause was lifted.
    Resumed,
    /// Local entities of a kind changed.
    EntitiesChanged(ResourceKind),
}

/// External collaborators shared by every account.
#[derive(Clone)]
pub struct Collaborators {
    /// Sends operations to the service.
    pub transport: Arc<dyn TransportHandler>,
    /// Holds entities, tokens and pre-send revisions.
    pub store: Arc<dyn LocalStore>,
    /// Merges diverged note content.
    pub merge: Arc<dyn MergeStrategy>,
    /// Supplies access tokens and hosts.
    pub credentials: Arc<dyn CredentialProvider>,
    /// Realtime change notifications, if available.
    pub realtime: Option<Arc<dyn RealtimeChannel>>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("realtime", &self.realtime.is_some())
            .finish_non_exhaustive()
    }
}

/// Per-account sync orchestrator.
pub struct Orchestrator {
    config: Arc<SyncConfig>,
    deps: Collaborators,
    sessions: DashMap<AccountId, Arc<Session>>,
    notifications: broadcast::Sender<SyncNotification>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("accounts", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator with no signed-in accounts.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Config`] if `config` fails validation.
    pub fn new(config: SyncConfig, deps: Collaborators) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            deps,
            sessions: DashMap::new(),
            notifications,
        })
    }

    /// Subscribe to sync notifications for every account.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncNotification> {
        self.notifications.subscribe()
    }

    fn session(&self, account: &AccountId) -> Result<Arc<Session>, OrchestratorError> {
        self.sessions
            .get(account)
            .map(|s| Arc::clone(s.value()))
            .ok_or_else(|| OrchestratorError::UnknownAccount(account.clone()))
    }

    /// Sign an account in, reusing its session if it already has one.
    ///
    /// Loads continuation tokens and resolves the host; once both are done
    /// the account starts polling, listening and syncing.
    pub async fn login(&self, account: AccountId) -> Result<(), OrchestratorError> {
        let session = match self.session(&account) {
            Ok(session) => session,
            Err(_) => {
                let created = Session::start(
                    account.clone(),
                    self.config.clone(),
                    self.deps.clone(),
                    self.notifications.clone(),
                )
                .await?;
                match self.sessions.entry(account.clone()) {
                    Entry::Occupied(existing) => {
                        created.stop();
                        Arc::clone(existing.get())
                    }
                    Entry::Vacant(slot) => Arc::clone(slot.insert(created).value()),
                }
            }
        };
        tracing::info!(account = %account, "Signed in");
        session.apply(SyncEvent::SignedIn).await;
        Ok(())
    }

    /// Sign an account out: stop its watchers and worker, clear its queue,
    /// tokens and entities. Responses still in flight are discarded.
    pub async fn logout(&self, account: &AccountId) -> Result<(), OrchestratorError> {
        let (_, session) = self
            .sessions
            .remove(account)
            .ok_or_else(|| OrchestratorError::UnknownAccount(account.clone()))?;
        session.handler.deactivate();
        session.stop();
        session.apply(SyncEvent::SignedOut).await;
        tracing::info!(account = %account, "Signed out");
        Ok(())
    }

    /// Enqueue a local change.
    pub async fn submit(
        &self,
        account: &AccountId,
        intent: LocalIntent,
    ) -> Result<PushOutcome, OrchestratorError> {
        let session = self.session(account)?;
        let operation = intent.into_operation()?;
        tracing::debug!(account = %account, op = operation.name(), "Submitted");
        let outcome = session.queue.push(operation).await;
        session.wake();
        Ok(outcome)
    }

    /// Report that `kind` changed remotely, enqueueing a sync.
    pub fn remote_changed(
        &self,
        account: &AccountId,
        kind: ResourceKind,
    ) -> Result<(), OrchestratorError> {
        self.session(account)?.remote_changed(kind);
        Ok(())
    }

    /// The credential provider re-authenticated the account.
    pub async fn reauthenticated(&self, account: &AccountId) -> Result<(), OrchestratorError> {
        let session = self.session(account)?;
        session.apply(SyncEvent::Reauthenticated).await;
        if session.state().authenticated && !session.state().host_resolved {
            if let Some(event) = session.resolve_host().await {
                session.apply(event).await;
            }
        }
        Ok(())
    }

    /// The user remediated a pause (quota, mailbox, upgrade).
    pub async fn resume(&self, account: &AccountId) -> Result<(), OrchestratorError> {
        self.session(account)?
            .apply(SyncEvent::ResumeRequested)
            .await;
        Ok(())
    }

    /// Switch polling between normal and fast periods.
    pub fn set_fast_mode(&self, account: &AccountId, fast: bool) -> Result<(), OrchestratorError> {
        self.session(account)?.set_fast_mode(fast);
        Ok(())
    }

    /// Current sync state of an account.
    pub fn sync_state(&self, account: &AccountId) -> Option<SyncState> {
        self.session(account).ok().map(|s| s.state())
    }

    /// Queued operations of an account, in dispatch order.
    pub async fn pending(&self, account: &AccountId) -> Option<Vec<Operation>> {
        let session = self.session(account).ok()?;
        Some(session.queue.operations().await)
    }

    /// Signed-in accounts.
    pub fn accounts(&self) -> Vec<AccountId> {
        self.sessions
            .iter()
            .map(|s| s.value().account().clone())
            .collect()
    }

    /// Stop every session without clearing any data. Queues persist in
    /// their mirrors and are restored on the next login.
    pub fn shutdown(&self) {
        for session in self.sessions.iter() {
            session.value().stop();
        }
        self.sessions.clear();
        tracing::info!("Orchestrator shut down");
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        for session in self.sessions.iter() {
            session.value().stop();
        }
    }
}
