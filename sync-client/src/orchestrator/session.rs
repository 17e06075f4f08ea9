//! One signed-in account: its queue, handler, dispatcher and watchers, plus
//! the worker task that drains the queue.

use notesync_core::{Action, FailureKind, PauseReason, SyncEvent, SyncState};
use notesync_types::{AccountId, Operation, ResourceKind};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::{Collaborators, NotificationKind, OrchestratorError, SyncNotification};
use crate::config::SyncConfig;
use crate::dispatcher::{DispatchError, Dispatcher, WorkOutcome};
use crate::durable::DurableQueue;
use crate::handler::ResponseHandler;
use crate::persist::QueueMirror;
use crate::poller::Poller;
use crate::realtime::spawn_realtime;

struct Watchers {
    poller: Poller,
    realtime: Option<JoinHandle<()>>,
}

pub(super) struct Session {
    account: AccountId,
    config: Arc<SyncConfig>,
    deps: Collaborators,
    pub(super) queue: Arc<DurableQueue>,
    pub(super) handler: Arc<ResponseHandler>,
    dispatcher: Dispatcher,
    state: Arc<Mutex<SyncState>>,
    wake: Notify,
    changes: mpsc::UnboundedSender<ResourceKind>,
    watchers: Mutex<Watchers>,
    worker: Mutex<Option<JoinHandle<()>>>,
    notifications: broadcast::Sender<SyncNotification>,
}

/// How long the worker waits before the next unit of work.
enum Wait {
    Now,
    UntilWoken,
    Until(Instant),
    /// Like `Until`, but wakes do not cut it short.
    Cooldown(Instant),
}

impl Session {
    /// Build a session and start its worker. The queue is restored from the
    /// account's mirror when a data directory is configured.
    pub(super) async fn start(
        account: AccountId,
        config: Arc<SyncConfig>,
        deps: Collaborators,
        notifications: broadcast::Sender<SyncNotification>,
    ) -> Result<Arc<Self>, OrchestratorError> {
        let queue = match &config.queue.data_dir {
            Some(dir) => DurableQueue::open(QueueMirror::for_account(dir, &account)).await?,
            None => DurableQueue::in_memory(),
        };
        let queue = Arc::new(queue);
        let handler = Arc::new(ResponseHandler::new(
            account.clone(),
            deps.store.clone(),
            deps.merge.clone(),
            config.reconcile.max_entity_bytes,
        ));
        let state = Arc::new(Mutex::new(SyncState::new()));
        let dispatcher = Dispatcher::new(
            queue.clone(),
            handler.clone(),
            deps.transport.clone(),
            deps.credentials.clone(),
            state.clone(),
            &config.dispatch,
        );
        let (changes, changes_rx) = mpsc::unbounded_channel();
        let poller = Poller::new(account.clone(), config.polling.clone(), changes.clone());

        let session = Arc::new(Self {
            account,
            config,
            deps,
            queue,
            handler,
            dispatcher,
            state,
            wake: Notify::new(),
            changes,
            watchers: Mutex::new(Watchers {
                poller,
                realtime: None,
            }),
            worker: Mutex::new(None),
            notifications,
        });

        let worker = tokio::spawn(session.clone().run(changes_rx));
        *lock(&session.worker) = Some(worker);
        Ok(session)
    }

    pub(super) fn account(&self) -> &AccountId {
        &self.account
    }

    pub(super) fn state(&self) -> SyncState {
        lock(&self.state).clone()
    }

    /// Report a remote change; the worker enqueues the sync.
    pub(super) fn remote_changed(&self, kind: ResourceKind) {
        // Fails only once the worker has stopped.
        let _ = self.changes.send(kind);
    }

    pub(super) fn wake(&self) {
        self.wake.notify_one();
    }

    pub(super) fn set_fast_mode(&self, fast: bool) {
        lock(&self.watchers).poller.set_fast_mode(fast);
    }

    fn notify(&self, kind: NotificationKind) {
        // No subscribers is fine.
        let _ = self.notifications.send(SyncNotification {
            account: self.account.clone(),
            kind,
        });
    }

    /// Feed an event to the state machine and execute the resulting
    /// actions, including actions caused by their follow-up events.
    pub(super) async fn apply(&self, event: SyncEvent) {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let actions = {
                let mut state = lock(&self.state);
                let (next, actions) = state.clone().on_event(event);
                *state = next;
                actions
            };
            for action in actions {
                if let Some(follow_up) = self.execute(action).await {
                    pending.push_back(follow_up);
                }
            }
        }
    }

    async fn execute(&self, action: Action) -> Option<SyncEvent> {
        tracing::debug!(account = %self.account, "Executing {:?}", action);
        match action {
            Action::LoadTokens => {
                if let Err(e) = self.handler.load_tokens().await {
                    tracing::warn!(account = %self.account, "Token load failed, next syncs are full: {}", e);
                }
                Some(SyncEvent::TokensLoaded)
            }
            Action::ResolveHost => self.resolve_host().await,
            Action::StartWatching => {
                self.start_watching();
                for kind in ResourceKind::ALL {
                    self.queue
                        .push(Operation::sync(kind, self.handler.token(kind)))
                        .await;
                }
                None
            }
            Action::StopWatching => {
                self.stop_watching();
                None
            }
            Action::WakeDispatcher => {
                self.wake();
                None
            }
            Action::AnnouncePause(reason) => {
                tracing::warn!(account = %self.account, "Sync paused: {}", reason);
                self.notify(NotificationKind::Paused(reason));
                None
            }
            Action::AnnounceResume => {
                tracing::info!(account = %self.account, "Sync resumed");
                self.notify(NotificationKind::Resumed);
                None
            }
            Action::ResetCache { kind } => {
                if let Err(e) = self.handler.reset_cache(kind).await {
                    tracing::warn!(account = %self.account, "Cache reset incomplete: {}", e);
                }
                self.queue
                    .map(|op| match op {
                        Operation::Sync {
                            kind: k,
                            delta_token: Some(_),
                        } if *k == kind => Some(Operation::sync(kind, None)),
                        _ => None,
                    })
                    .await;
                self.queue.push(Operation::sync(kind, None)).await;
                Some(SyncEvent::CacheReset)
            }
            Action::NotifyUnauthorized => {
                self.deps.credentials.on_unauthorized(&self.account).await;
                None
            }
            Action::ClearAccount => {
                self.queue.clear().await;
                if let Err(e) = self.handler.clear().await {
                    tracing::warn!(account = %self.account, "Failed to clear account data: {}", e);
                }
                None
            }
        }
    }

    /// Resolve the account's host. Failure leaves the account not ready and
    /// is treated as an authentication problem.
    pub(super) async fn resolve_host(&self) -> Option<SyncEvent> {
        match self.deps.credentials.resolve_host(&self.account).await {
            Ok(host) => {
                tracing::info!(account = %self.account, "Resolved host {}", host);
                Some(SyncEvent::HostResolved)
            }
            Err(e) => {
                tracing::warn!(account = %self.account, "Host resolution failed: {}", e);
                Some(SyncEvent::DispatchFailed(PauseReason::Unauthorized))
            }
        }
    }

    fn start_watching(&self) {
        let mut watchers = lock(&self.watchers);
        watchers.poller.start();
        if watchers.realtime.is_some() || !self.config.realtime.enabled {
            return;
        }
        if let Some(channel) = &self.deps.realtime {
            watchers.realtime = Some(spawn_realtime(
                self.account.clone(),
                channel.clone(),
                self.deps.credentials.clone(),
                &self.config.realtime,
                self.changes.clone(),
            ));
        }
    }

    fn stop_watching(&self) {
        let mut watchers = lock(&self.watchers);
        watchers.poller.stop();
        if let Some(handle) = watchers.realtime.take() {
            handle.abort();
        }
    }

    /// Stop watchers and the worker. Queue and store are left as they are.
    pub(super) fn stop(&self) {
        self.stop_watching();
        if let Some(worker) = lock(&self.worker).take() {
            worker.abort();
        }
    }

    async fn run(self: Arc<Self>, mut changes: mpsc::UnboundedReceiver<ResourceKind>) {
        let retry_delay = self.config.dispatch.retry_delay();
        let mut busy = false;

        loop {
            while let Ok(kind) = changes.try_recv() {
                self.enqueue_sync(kind).await;
            }
            if !busy && !self.state().is_paused() && !self.queue.is_empty().await {
                busy = true;
                self.notify(NotificationKind::Started);
            }

            let wait = match self.dispatcher.work().await {
                Ok(WorkOutcome::Idle) => {
                    if busy {
                        busy = false;
                        self.notify(NotificationKind::Succeeded);
                    }
                    Wait::UntilWoken
                }
                Ok(WorkOutcome::Paused) => {
                    busy = false;
                    Wait::UntilWoken
                }
                Ok(WorkOutcome::Succeeded { changed, .. }) => {
                    for kind in changed {
                        self.notify(NotificationKind::EntitiesChanged(kind));
                    }
                    Wait::Now
                }
                Ok(WorkOutcome::Replaced { .. }) | Ok(WorkOutcome::Dropped { .. }) => Wait::Now,
                Ok(WorkOutcome::Retry { after, failure }) => {
                    busy = false;
                    self.notify(NotificationKind::Failed(failure));
                    Wait::Until(Instant::now() + after)
                }
                Ok(WorkOutcome::Suspended(reason)) => {
                    busy = false;
                    self.apply(SyncEvent::DispatchFailed(reason)).await;
                    match reason {
                        // The reset resumes the queue locally; the service still
                        // gets the retry delay before the entry goes out again.
                        PauseReason::InvalidCache { .. } => {
                            Wait::Cooldown(Instant::now() + retry_delay)
                        }
                        _ => Wait::Now,
                    }
                }
                Err(DispatchError::BadRequest { operation }) => {
                    tracing::error!(account = %self.account, "Service rejected {} as malformed", operation);
                    self.notify(NotificationKind::Failed(FailureKind::BadRequest));
                    Wait::Now
                }
                Err(e) => {
                    tracing::error!(account = %self.account, "Dispatch failed: {}", e);
                    busy = false;
                    Wait::Until(Instant::now() + retry_delay)
                }
            };

            match wait {
                Wait::Now => {}
                Wait::UntilWoken => {
                    tokio::select! {
                        _ = self.wake.notified() => {}
                        kind = changes.recv() => match kind {
                            Some(kind) => self.enqueue_sync(kind).await,
                            None => return,
                        },
                    }
                }
                Wait::Until(deadline) => loop {
                    tokio::select! {
                        _ = sleep_until(deadline) => break,
                        _ = self.wake.notified() => break,
                        kind = changes.recv() => match kind {
                            Some(kind) => self.enqueue_sync(kind).await,
                            None => return,
                        },
                    }
                },
                Wait::Cooldown(deadline) => loop {
                    tokio::select! {
                        _ = sleep_until(deadline) => break,
                        kind = changes.recv() => match kind {
                            Some(kind) => self.enqueue_sync(kind).await,
                            None => return,
                        },
                    }
                },
            }
        }
    }

    async fn enqueue_sync(&self, kind: ResourceKind) {
        if !self.state().authenticated {
            return;
        }
        tracing::debug!(account = %self.account, "Remote change: {}", kind);
        self.queue
            .push(Operation::sync(kind, self.handler.token(kind)))
            .await;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
