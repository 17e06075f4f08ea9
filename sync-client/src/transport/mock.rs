//! Mock transport for testing.
//!
//! Allows queueing results and capturing handled operations for verification.

use super::TransportHandler;
use async_trait::async_trait;
use notesync_types::{AccountId, ApiError, Operation, ResponseEvent};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Mock transport for testing.
///
/// Results are returned in the order they were queued. With nothing queued,
/// `handle` fails with [`ApiError::NetworkUnavailable`]. Clones share state.
#[derive(Debug, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    handled: Arc<Notify>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    results: VecDeque<Result<ResponseEvent, ApiError>>,
    handled: Vec<(AccountId, Operation)>,
    tokens: Vec<String>,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockTransportInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue the result for the next `handle()` call.
    pub fn queue_result(&self, result: Result<ResponseEvent, ApiError>) {
        self.lock().results.push_back(result);
    }

    /// Queue a success.
    pub fn queue_ok(&self, event: ResponseEvent) {
        self.queue_result(Ok(event));
    }

    /// Queue a failure.
    pub fn queue_err(&self, error: ApiError) {
        self.queue_result(Err(error));
    }

    /// All operations handled so far, in order.
    pub fn handled(&self) -> Vec<Operation> {
        self.lock().handled.iter().map(|(_, op)| op.clone()).collect()
    }

    /// Operations handled for one account.
    pub fn handled_for(&self, account: &AccountId) -> Vec<Operation> {
        self.lock()
            .handled
            .iter()
            .filter(|(a, _)| a == account)
            .map(|(_, op)| op.clone())
            .collect()
    }

    /// Access tokens presented so far.
    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }

    /// Wait until the next operation is handled.
    pub async fn wait_handled(&self) {
        self.handled.notified().await;
    }

    /// Clear all state.
    pub fn reset(&self) {
        *self.lock() = MockTransportInner::default();
    }
}

impl Clone for MockTransport {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handled: Arc::clone(&self.handled),
        }
    }
}

#[async_trait]
impl TransportHandler for MockTransport {
    async fn handle(
        &self,
        account: &AccountId,
        access_token: &str,
        operation: &Operation,
    ) -> Result<ResponseEvent, ApiError> {
        let result = {
            let mut inner = self.lock();
            inner.handled.push((account.clone(), operation.clone()));
            inner.tokens.push(access_token.to_string());
            inner
                .results
                .pop_front()
                .unwrap_or(Err(ApiError::NetworkUnavailable))
        };
        self.handled.notify_waiters();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ===========================================
    // MockTransport Basic Tests
    // ===========================================

    #[tokio::test]
    async fn returns_queued_results_in_order() {
        let transport = MockTransport::new();
        let account = AccountId::new("a");
        transport.queue_ok(ResponseEvent::MeetingNotesFetched { notes: vec![] });
        transport.queue_err(ApiError::status(500));

        let first = transport
            .handle(&account, "t", &Operation::FetchMeetingNotes)
            .await;
        let second = transport
            .handle(&account, "t", &Operation::FetchMeetingNotes)
            .await;

        assert!(first.is_ok());
        assert_eq!(second, Err(ApiError::status(500)));
    }

    #[tokio::test]
    async fn empty_queue_is_network_unavailable() {
        let transport = MockTransport::new();
        let result = transport
            .handle(&AccountId::new("a"), "t", &Operation::FetchMeetingNotes)
            .await;
        assert_eq!(result, Err(ApiError::NetworkUnavailable));
    }

    #[tokio::test]
    async fn captures_operations_and_tokens() {
        let transport = MockTransport::new();
        let a = AccountId::new("a");
        let b = AccountId::new("b");

        let _ = transport.handle(&a, "ta", &Operation::FetchMeetingNotes).await;
        let _ = transport.handle(&b, "tb", &Operation::FetchMeetingNotes).await;

        assert_eq!(transport.handled().len(), 2);
        assert_eq!(transport.handled_for(&a).len(), 1);
        assert_eq!(transport.tokens(), vec!["ta".to_string(), "tb".to_string()]);
    }

    #[tokio::test]
    async fn clones_share_state() {
        let transport = MockTransport::new();
        let clone = transport.clone();
        clone.queue_ok(ResponseEvent::MeetingNotesFetched { notes: vec![] });

        let result = transport
            .handle(&AccountId::new("a"), "t", &Operation::FetchMeetingNotes)
            .await;

        assert!(result.is_ok());
        assert_eq!(clone.handled().len(), 1);
    }

    #[tokio::test]
    async fn reset_clears_state() {
        let transport = MockTransport::new();
        let _ = transport
            .handle(&AccountId::new("a"), "t", &Operation::FetchMeetingNotes)
            .await;

        transport.reset();

        assert!(transport.handled().is_empty());
    }
}
