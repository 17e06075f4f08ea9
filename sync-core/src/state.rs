//! Per-account sync state machine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! account lifecycle. It takes events as input and produces a new state plus
//! a list of actions for sync-client to execute.
//!
//! Dispatch is allowed only when the account is signed in, its continuation
//! tokens are loaded, its service host is resolved, and no pause is active.

use notesync_types::ResourceKind;

use crate::classify::PauseReason;

/// Sync state for one account - NO I/O, just state transitions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncState {
    /// Signed in with usable credentials.
    pub authenticated: bool,
    /// Continuation tokens read from the store.
    pub tokens_loaded: bool,
    /// Service host known.
    pub host_resolved: bool,
    /// Suspension raised by a dispatch failure.
    pub pause: Option<PauseReason>,
}

impl SyncState {
    /// A signed-out account.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the account has finished starting up.
    pub fn is_ready(&self) -> bool {
        self.authenticated && self.tokens_loaded && self.host_resolved
    }

    /// Whether the queue must not dispatch.
    pub fn is_paused(&self) -> bool {
        !self.is_ready() || self.pause.is_some()
    }

    /// Process an event and return the new state plus actions to execute.
    pub fn on_event(self, event: SyncEvent) -> (Self, Vec<Action>) {
        let was_ready = self.is_ready();
        let mut state = self;

        match event {
            SyncEvent::SignedIn if !state.authenticated => {
                state.authenticated = true;
                (state, vec![Action::LoadTokens, Action::ResolveHost])
            }
            SyncEvent::TokensLoaded if state.authenticated => {
                state.tokens_loaded = true;
                let actions = state.became_ready(was_ready);
                (state, actions)
            }
            SyncEvent::HostResolved if state.authenticated => {
                state.host_resolved = true;
                let actions = state.became_ready(was_ready);
                (state, actions)
            }
            SyncEvent::DispatchFailed(reason) if state.authenticated => {
                if state.pause.is_some() {
                    return (state, vec![]);
                }
                state.pause = Some(reason);
                let mut actions = vec![Action::AnnouncePause(reason)];
                match reason {
                    PauseReason::InvalidCache { kind } => actions.push(Action::ResetCache { kind }),
                    PauseReason::Unauthorized => actions.push(Action::NotifyUnauthorized),
                    _ => {}
                }
                (state, actions)
            }
            SyncEvent::CacheReset if matches!(state.pause, Some(PauseReason::InvalidCache { .. })) => {
                state.resume()
            }
            SyncEvent::Reauthenticated if state.authenticated => match state.pause {
                Some(PauseReason::Unauthorized) => state.resume(),
                _ => (state, vec![]),
            },
            SyncEvent::ResumeRequested => match state.pause {
                Some(reason) if !reason.recovers_automatically() => state.resume(),
                _ => (state, vec![]),
            },
            SyncEvent::SignedOut if state.authenticated => (
                SyncState::new(),
                vec![Action::StopWatching, Action::ClearAccount],
            ),

            // Invalid transitions - stay in current state
            _ => (state, vec![]),
        }
    }

    fn became_ready(&self, was_ready: bool) -> Vec<Action> {
        if !was_ready && self.is_ready() {
            vec![Action::StartWatching, Action::WakeDispatcher]
        } else {
            vec![]
        }
    }

    fn resume(mut self) -> (Self, Vec<Action>) {
        self.pause = None;
        let actions = if self.is_ready() {
            vec![Action::AnnounceResume, Action::WakeDispatcher]
        } else {
            vec![Action::AnnounceResume]
        };
        (self, actions)
    }
}

/// Events in an account's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// The account signed in.
    SignedIn,
    /// Continuation tokens finished loading.
    TokensLoaded,
    /// The service host was resolved.
    HostResolved,
    /// A dispatch failure requires the queue to stop.
    DispatchFailed(PauseReason),
    /// Tokens and the revision cache were reset after an invalidation.
    CacheReset,
    /// Fresh credentials are available.
    Reauthenticated,
    /// The user fixed the cause of a pause (freed quota, updated the app).
    ResumeRequested,
    /// The account signed out.
    SignedOut,
}

/// Actions for sync-client to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Read continuation tokens from the store.
    LoadTokens,
    /// Resolve the service host through the credential provider.
    ResolveHost,
    /// Start the realtime channel and poller.
    StartWatching,
    /// Stop the realtime channel and poller.
    StopWatching,
    /// Let the dispatcher pick up work.
    WakeDispatcher,
    /// Broadcast that dispatch is paused.
    AnnouncePause(PauseReason),
    /// Broadcast that dispatch resumed.
    AnnounceResume,
    /// Clear tokens and the revision cache for `kind`, then requeue a full sync.
    ResetCache {
        /// Collection whose token was rejected.
        kind: ResourceKind,
    },
    /// Tell the credential provider the token was rejected.
    NotifyUnauthorized,
    /// Drop the queue, mirror and tokens of the account.
    ClearAccount,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_state() -> SyncState {
        let (state, _) = SyncState::new().on_event(SyncEvent::SignedIn);
        let (state, _) = state.on_event(SyncEvent::TokensLoaded);
        let (state, _) = state.on_event(SyncEvent::HostResolved);
        state
    }

    // ===========================================
    // Startup Tests
    // ===========================================

    #[test]
    fn new_state_is_paused() {
        let state = SyncState::new();
        assert!(state.is_paused());
        assert!(!state.is_ready());
    }

    #[test]
    fn sign_in_loads_tokens_and_resolves_host() {
        let (state, actions) = SyncState::new().on_event(SyncEvent::SignedIn);

        assert!(state.authenticated);
        assert!(state.is_paused());
        assert_eq!(actions, vec![Action::LoadTokens, Action::ResolveHost]);
    }

    #[test]
    fn ready_after_all_three_flags() {
        let (state, _) = SyncState::new().on_event(SyncEvent::SignedIn);
        let (state, actions) = state.on_event(SyncEvent::TokensLoaded);
        assert!(state.is_paused());
        assert!(actions.is_empty());

        let (state, actions) = state.on_event(SyncEvent::HostResolved);
        assert!(!state.is_paused());
        assert_eq!(actions, vec![Action::StartWatching, Action::WakeDispatcher]);
    }

    #[test]
    fn tokens_before_sign_in_are_ignored() {
        let (state, actions) = SyncState::new().on_event(SyncEvent::TokensLoaded);
        assert_eq!(state, SyncState::new());
        assert!(actions.is_empty());
    }

    // ===========================================
    // Pause Tests
    // ===========================================

    #[test]
    fn unauthorized_pause_notifies_and_waits_for_reauth() {
        let (state, actions) = ready_state().on_event(SyncEvent::DispatchFailed(PauseReason::Unauthorized));
        assert!(state.is_paused());
        assert_eq!(
            actions,
            vec![
                Action::AnnouncePause(PauseReason::Unauthorized),
                Action::NotifyUnauthorized
            ]
        );

        let (state, actions) = state.on_event(SyncEvent::Reauthenticated);
        assert!(!state.is_paused());
        assert_eq!(actions, vec![Action::AnnounceResume, Action::WakeDispatcher]);
    }

    #[test]
    fn invalid_cache_resets_and_resumes() {
        let reason = PauseReason::InvalidCache {
            kind: ResourceKind::Notes,
        };
        let (state, actions) = ready_state().on_event(SyncEvent::DispatchFailed(reason));
        assert!(actions.contains(&Action::ResetCache {
            kind: ResourceKind::Notes
        }));

        let (state, _) = state.on_event(SyncEvent::CacheReset);
        assert!(!state.is_paused());
    }

    #[test]
    fn resume_request_does_not_clear_cache_pause() {
        let reason = PauseReason::InvalidCache {
            kind: ResourceKind::Notes,
        };
        let (state, _) = ready_state().on_event(SyncEvent::DispatchFailed(reason));
        let (state, actions) = state.on_event(SyncEvent::ResumeRequested);
        assert!(state.is_paused());
        assert!(actions.is_empty());
    }

    #[test]
    fn resume_request_clears_quota_pause() {
        let (state, _) = ready_state().on_event(SyncEvent::DispatchFailed(PauseReason::QuotaExceeded));
        let (state, _) = state.on_event(SyncEvent::ResumeRequested);
        assert!(!state.is_paused());
    }

    #[test]
    fn first_pause_reason_sticks() {
        let (state, _) = ready_state().on_event(SyncEvent::DispatchFailed(PauseReason::QuotaExceeded));
        let (state, actions) = state.on_event(SyncEvent::DispatchFailed(PauseReason::Unauthorized));
        assert_eq!(state.pause, Some(PauseReason::QuotaExceeded));
        assert!(actions.is_empty());
    }

    #[test]
    fn sign_out_clears_everything() {
        let (state, actions) = ready_state().on_event(SyncEvent::SignedOut);
        assert_eq!(state, SyncState::new());
        assert_eq!(actions, vec![Action::StopWatching, Action::ClearAccount]);
    }
}
