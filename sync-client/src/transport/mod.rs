//! Transport abstraction for notesync.
//!
//! This module provides a pluggable boundary between the dispatcher and
//! the service. One call per dispatched operation; the implementation owns
//! the HTTP details and maps every outcome onto a [`ResponseEvent`] or an
//! [`ApiError`].
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! transport.queue_result(Ok(ResponseEvent::MeetingNotesFetched { notes: vec![] }));
//! let event = transport.handle(&account, "token", &Operation::FetchMeetingNotes).await?;
//! ```

mod mock;

pub use mock::MockTransport;

use async_trait::async_trait;
use notesync_types::{AccountId, ApiError, Operation, ResponseEvent};

/// Sends operations to the service.
///
/// Implementations handle the underlying protocol (HTTP, mock, etc).
/// Invalid operations are never passed in.
#[async_trait]
pub trait TransportHandler: Send + Sync {
    /// Perform `operation` on behalf of `account`.
    async fn handle(
        &self,
        account: &AccountId,
        access_token: &str,
        operation: &Operation,
    ) -> Result<ResponseEvent, ApiError>;
}
