//! Outbound dispatcher.
//!
//! One dispatcher per account. [`Dispatcher::work`] sends at most one
//! operation to the transport and settles it:
//!
//! ```text
//! Idle ──work()──▶ Dispatching(op) ──▶ Idle    (success, retained, dropped)
//!                                  └──▶ Paused  (gone, quota, auth, ...)
//! ```
//!
//! Invalid operations never reach the transport. They stay queued until a
//! response supplies the remote id they are waiting for.

use notesync_core::{decide, Decision, FailureKind, PauseReason, SyncState};
use notesync_types::{AccountId, Operation, ResourceKind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

use crate::config::DispatchConfig;
use crate::credentials::CredentialProvider;
use crate::durable::DurableQueue;
use crate::handler::{HandlerError, ResponseHandler};
use crate::transport::TransportHandler;

/// Dispatch errors.
///
/// Transport failures are not errors here: they are classified into a
/// [`WorkOutcome`]. These are failures the engine cannot classify away.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The service rejected a request as malformed: a client bug.
    #[error("bad request for {operation}")]
    BadRequest {
        /// Operation name.
        operation: &'static str,
    },

    /// A successful response could not be applied.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),
}

/// What one unit of work did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    /// Nothing dispatchable is queued.
    Idle,
    /// The account is paused or not ready.
    Paused,
    /// An operation succeeded.
    Succeeded {
        /// Resource kind of the operation.
        kind: ResourceKind,
        /// Collections whose local contents changed.
        changed: Vec<ResourceKind>,
    },
    /// A transient failure; the entry stays queued.
    Retry {
        /// When to call `work` again.
        after: Duration,
        /// What went wrong.
        failure: FailureKind,
    },
    /// The entry was swapped for a different operation, ready now.
    Replaced {
        /// What went wrong.
        failure: FailureKind,
    },
    /// The entry was removed without effect.
    Dropped {
        /// What went wrong.
        failure: FailureKind,
    },
    /// The queue must be paused.
    Suspended(PauseReason),
}

/// Sends queued operations for one account.
pub struct Dispatcher {
    account: AccountId,
    queue: Arc<DurableQueue>,
    handler: Arc<ResponseHandler>,
    transport: Arc<dyn TransportHandler>,
    credentials: Arc<dyn CredentialProvider>,
    state: Arc<Mutex<SyncState>>,
    retry_delay: Duration,
    strict_bad_request: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("account", &self.account)
            .field("retry_delay", &self.retry_delay)
            .field("strict_bad_request", &self.strict_bad_request)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        queue: Arc<DurableQueue>,
        handler: Arc<ResponseHandler>,
        transport: Arc<dyn TransportHandler>,
        credentials: Arc<dyn CredentialProvider>,
        state: Arc<Mutex<SyncState>>,
        config: &DispatchConfig,
    ) -> Self {
        Self {
            account: handler.account().clone(),
            queue,
            handler,
            transport,
            credentials,
            state,
            retry_delay: config.retry_delay(),
            strict_bad_request: config.strict_bad_request,
        }
    }

    fn can_dispatch(&self) -> bool {
        !self
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_paused()
    }

    /// Dispatch the next queued operation, if any, and settle it.
    ///
    /// # Errors
    ///
    /// Returns an error for a bad request in strict mode, or when a
    /// successful response could not be applied.
    pub async fn work(&self) -> Result<WorkOutcome, DispatchError> {
        if !self.can_dispatch() {
            return Ok(WorkOutcome::Paused);
        }
        let Some(entry) = self.queue.begin_next().await else {
            return Ok(WorkOutcome::Idle);
        };
        let id = entry.id;

        let operation = match self.prepare(entry.operation).await {
            Ok(op) => op,
            Err(e) => {
                self.queue.release(id).await;
                return Err(e.into());
            }
        };

        let access_token = match self.credentials.access_token(&self.account).await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(account = %self.account, "No access token: {}", e);
                self.queue.release(id).await;
                return Ok(WorkOutcome::Suspended(PauseReason::Unauthorized));
            }
        };

        tracing::debug!(account = %self.account, op = operation.name(), "Dispatching");
        let result = self
            .transport
            .handle(&self.account, &access_token, &operation)
            .await;

        match result {
            Ok(event) => match self.handler.handle(&operation, event).await {
                Ok(outcome) => {
                    self.queue.complete(id).await;
                    if !outcome.rewrites.is_empty() {
                        let rewritten = self
                            .queue
                            .map(|op| outcome.rewrites.iter().find_map(|r| r.apply(op)))
                            .await;
                        if rewritten > 0 {
                            tracing::debug!(account = %self.account, "Resolved {} queued operations", rewritten);
                        }
                    }
                    for follow_up in outcome.follow_ups {
                        self.queue.push(follow_up).await;
                    }
                    tracing::debug!(account = %self.account, op = operation.name(), "Succeeded");
                    Ok(WorkOutcome::Succeeded {
                        kind: operation.resource_kind(),
                        changed: outcome.changed,
                    })
                }
                Err(HandlerError::Store(e)) => {
                    tracing::warn!(account = %self.account, op = operation.name(), "Store rejected response: {}", e);
                    self.queue.release(id).await;
                    Err(HandlerError::Store(e).into())
                }
                Err(e) => {
                    tracing::error!(account = %self.account, op = operation.name(), "Dropping unusable response: {}", e);
                    self.queue.complete(id).await;
                    Err(e.into())
                }
            },
            Err(error) => {
                let failure = FailureKind::classify(&error);
                self.settle_failure(id, &operation, failure).await
            }
        }
    }

    /// Bring an operation up to date just before it is sent.
    async fn prepare(&self, operation: Operation) -> Result<Operation, HandlerError> {
        match operation {
            Operation::Sync { kind, .. } => {
                self.handler.capture_revisions(kind).await?;
                Ok(Operation::sync(kind, self.handler.token(kind)))
            }
            op => {
                if let Some(note) = op.sends_note_snapshot() {
                    self.handler.record_pre_send(note).await?;
                }
                Ok(op)
            }
        }
    }

    async fn settle_failure(
        &self,
        id: notesync_core::EntryId,
        operation: &Operation,
        failure: FailureKind,
    ) -> Result<WorkOutcome, DispatchError> {
        let decision = decide(operation, failure);
        tracing::info!(
            account = %self.account,
            op = operation.name(),
            "Failed ({}): {:?}",
            failure,
            decision
        );

        match decision {
            Decision::Retain => {
                self.queue.release(id).await;
                Ok(WorkOutcome::Retry {
                    after: self.retry_delay,
                    failure,
                })
            }
            Decision::Drop => {
                self.queue.complete(id).await;
                Ok(WorkOutcome::Dropped { failure })
            }
            Decision::Replace(replacement) => {
                self.queue.replace(id, replacement).await;
                Ok(WorkOutcome::Replaced { failure })
            }
            Decision::Pause(reason) => {
                self.queue.release(id).await;
                Ok(WorkOutcome::Suspended(reason))
            }
            Decision::DropBadRequest => {
                self.queue.complete(id).await;
                if self.strict_bad_request {
                    tracing::error!(account = %self.account, op = operation.name(), "Bad request");
                    return Err(DispatchError::BadRequest {
                        operation: operation.name(),
                    });
                }
                tracing::debug!(account = %self.account, op = operation.name(), "Ignoring bad request");
                Ok(WorkOutcome::Dropped { failure })
            }
        }
    }
}
