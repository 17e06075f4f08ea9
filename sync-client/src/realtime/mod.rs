//! Realtime change notifications.
//!
//! A long-lived streaming connection per account. Each frame names the
//! resource kind that changed remotely ("shoulder tap"); the loop forwards it
//! to the orchestrator, which enqueues a sync. On disconnect the loop
//! reconnects with additive backoff, reset by any data frame.
//!
//! A 401 is not handled here: it is forwarded as a change for every kind,
//! so the ordinary sync failure path pauses the account.

mod mock;

pub use mock::MockRealtimeChannel;

use async_trait::async_trait;
use notesync_core::ReconnectBackoff;
use notesync_types::{AccountId, ResourceKind};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::RealtimeConfig;
use crate::credentials::CredentialProvider;

/// Realtime channel errors.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The service rejected the access token.
    #[error("unauthorized")]
    Unauthorized,

    /// The connection could not be opened or was lost.
    #[error("disconnected: {0}")]
    Disconnected(String),

    /// A frame could not be parsed.
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Opens streaming connections.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Open a connection for `account`.
    async fn connect(
        &self,
        account: &AccountId,
        access_token: &str,
    ) -> Result<Box<dyn RealtimeConnection>, RealtimeError>;
}

/// An open streaming connection.
#[async_trait]
pub trait RealtimeConnection: Send {
    /// The next raw frame. `Ok(None)` when the service closed the stream.
    async fn next_frame(&mut self) -> Result<Option<String>, RealtimeError>;
}

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    resource: Option<ResourceKind>,
}

/// Parse a frame. `Ok(None)` for keep-alives, which carry no resource.
pub fn parse_frame(frame: &str) -> Result<Option<ResourceKind>, RealtimeError> {
    if frame.trim().is_empty() {
        return Ok(None);
    }
    let parsed: Frame =
        serde_json::from_str(frame).map_err(|e| RealtimeError::Malformed(e.to_string()))?;
    Ok(parsed.resource)
}

/// Spawn the connection loop for one account.
///
/// Changed kinds are sent on `changes`. The loop ends when `changes` is
/// closed or the returned handle is aborted.
pub fn spawn_realtime(
    account: AccountId,
    channel: Arc<dyn RealtimeChannel>,
    credentials: Arc<dyn CredentialProvider>,
    config: &RealtimeConfig,
    changes: mpsc::UnboundedSender<ResourceKind>,
) -> JoinHandle<()> {
    let mut backoff = ReconnectBackoff::new(config.backoff_step(), config.backoff_ceiling());

    tokio::spawn(async move {
        loop {
            let session = run_session(&account, &*channel, &*credentials, &changes, &mut backoff);
            if let Err(e) = session.await {
                match e {
                    RealtimeError::Unauthorized => {
                        tracing::info!(account = %account, "Realtime channel unauthorized");
                        for kind in ResourceKind::ALL {
                            if changes.send(kind).is_err() {
                                return;
                            }
                        }
                    }
                    e => tracing::debug!(account = %account, "Realtime channel down: {}", e),
                }
            }
            if changes.is_closed() {
                return;
            }

            let delay = backoff.on_failure();
            tracing::debug!(account = %account, "Reconnecting realtime in {:?}", delay);
            tokio::time::sleep(delay).await;
        }
    })
}

/// One connection, from open to disconnect.
async fn run_session(
    account: &AccountId,
    channel: &dyn RealtimeChannel,
    credentials: &dyn CredentialProvider,
    changes: &mpsc::UnboundedSender<ResourceKind>,
    backoff: &mut ReconnectBackoff,
) -> Result<(), RealtimeError> {
    let access_token = credentials
        .access_token(account)
        .await
        .map_err(|_| RealtimeError::Unauthorized)?;
    let mut connection = channel.connect(account, &access_token).await?;
    tracing::debug!(account = %account, "Realtime channel open");

    while let Some(frame) = connection.next_frame().await? {
        backoff.reset();
        match parse_frame(&frame) {
            Ok(Some(kind)) => {
                tracing::trace!(account = %account, "Remote change: {}", kind);
                if changes.send(kind).is_err() {
                    return Ok(());
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(account = %account, "Ignoring frame: {}", e),
        }
    }
    Ok(())
}
