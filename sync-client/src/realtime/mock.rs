//! Mock realtime channel for testing.
//!
//! Connection attempts consume scripted outcomes in order. Once the script
//! is exhausted, `connect` never completes. Clones share state.

use super::{RealtimeChannel, RealtimeConnection, RealtimeError};
use async_trait::async_trait;
use notesync_types::AccountId;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

enum Script {
    ConnectError(RealtimeError),
    Session(VecDeque<Result<String, RealtimeError>>),
}

#[derive(Default)]
struct MockRealtimeInner {
    scripts: VecDeque<Script>,
    connects: usize,
    tokens: Vec<String>,
}

/// Mock realtime channel for testing.
#[derive(Clone, Default)]
pub struct MockRealtimeChannel {
    inner: Arc<Mutex<MockRealtimeInner>>,
}

impl std::fmt::Debug for MockRealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRealtimeChannel")
            .field("connects", &self.connects())
            .finish_non_exhaustive()
    }
}

impl MockRealtimeChannel {
    /// Create a channel with nothing scripted.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockRealtimeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Next connect succeeds and yields `frames`, then the stream closes.
    pub fn script_session(&self, frames: Vec<Result<String, RealtimeError>>) {
        self.lock()
            .scripts
            .push_back(Script::Session(frames.into_iter().collect()));
    }

    /// Next connect fails with `error`.
    pub fn script_connect_error(&self, error: RealtimeError) {
        self.lock().scripts.push_back(Script::ConnectError(error));
    }

    /// Number of connection attempts so far.
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// Access tokens presented so far.
    pub fn tokens(&self) -> Vec<String> {
        self.lock().tokens.clone()
    }
}

#[async_trait]
impl RealtimeChannel for MockRealtimeChannel {
    async fn connect(
        &self,
        _account: &AccountId,
        access_token: &str,
    ) -> Result<Box<dyn RealtimeConnection>, RealtimeError> {
        let script = {
            let mut inner = self.lock();
            inner.connects += 1;
            inner.tokens.push(access_token.to_string());
            inner.scripts.pop_front()
        };
        match script {
            Some(Script::ConnectError(e)) => Err(e),
            Some(Script::Session(frames)) => Ok(Box::new(MockConnection { frames })),
            None => std::future::pending().await,
        }
    }
}

struct MockConnection {
    frames: VecDeque<Result<String, RealtimeError>>,
}

#[async_trait]
impl RealtimeConnection for MockConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, RealtimeError> {
        self.frames.pop_front().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_session_yields_frames_then_closes() {
        let channel = MockRealtimeChannel::new();
        channel.script_session(vec![Ok("a".into()), Err(RealtimeError::Disconnected("x".into()))]);

        let account = AccountId::new("user@example.com");
        let mut connection = channel.connect(&account, "t").await.unwrap();

        assert_eq!(connection.next_frame().await.unwrap(), Some("a".to_string()));
        assert!(connection.next_frame().await.is_err());
        assert_eq!(connection.next_frame().await.unwrap(), None);
        assert_eq!(channel.connects(), 1);
    }

    #[tokio::test]
    async fn clones_share_scripts() {
        let channel = MockRealtimeChannel::new();
        let clone = channel.clone();
        clone.script_connect_error(RealtimeError::Unauthorized);

        let result = channel.connect(&AccountId::new("a"), "t").await;
        assert!(matches!(result, Err(RealtimeError::Unauthorized)));
        assert_eq!(clone.connects(), 1);
    }
}
