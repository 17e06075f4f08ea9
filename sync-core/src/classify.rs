//! Failure classification and the dispatch decision table.
//!
//! The transport reports raw [`ApiError`]s. This module folds them into a
//! small [`FailureKind`] taxonomy and decides, per operation, what the
//! dispatcher does with the queue entry.

use std::fmt;

use notesync_types::{ApiError, Operation, ResourceKind};
use serde::{Deserialize, Serialize};

/// Service error code for an exhausted storage quota (sent with 403).
pub const CODE_QUOTA_EXCEEDED: &str = "QuotaExceeded";
/// Service error code for an account without a mailbox (sent with 403 or 404).
pub const CODE_NO_MAILBOX: &str = "NoMailbox";

/// Classified transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Service unreachable.
    Network,
    /// Unparseable response.
    MalformedResponse,
    /// 5xx or 429.
    Server,
    /// 400.
    BadRequest,
    /// 401, or 403 without a more specific code.
    Unauthorized,
    /// 403 with the quota code.
    QuotaExceeded,
    /// 403/404 with the no-mailbox code.
    NoMailbox,
    /// 404.
    NotFound,
    /// 409.
    Conflict,
    /// 410: the delta token or cache is no longer valid.
    Gone,
    /// 426.
    UpgradeRequired,
    /// Any other status.
    Unknown(u16),
}

impl FailureKind {
    /// Classify a transport error.
    pub fn classify(error: &ApiError) -> Self {
        match error {
            ApiError::NetworkUnavailable => FailureKind::Network,
            ApiError::MalformedResponse(_) => FailureKind::MalformedResponse,
            ApiError::Http { status, code, .. } => {
                let code = code.as_deref();
                match *status {
                    400 => FailureKind::BadRequest,
                    401 => FailureKind::Unauthorized,
                    403 if code == Some(CODE_QUOTA_EXCEEDED) => FailureKind::QuotaExceeded,
                    403 | 404 if code == Some(CODE_NO_MAILBOX) => FailureKind::NoMailbox,
                    403 => FailureKind::Unauthorized,
                    404 => FailureKind::NotFound,
                    409 => FailureKind::Conflict,
                    410 => FailureKind::Gone,
                    426 => FailureKind::UpgradeRequired,
                    429 | 500..=599 => FailureKind::Server,
                    other => FailureKind::Unknown(other),
                }
            }
        }
    }

    /// Whether retrying the same request later may succeed.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            FailureKind::Network
                | FailureKind::MalformedResponse
                | FailureKind::Server
                | FailureKind::Conflict
                | FailureKind::Unknown(_)
        )
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Network => write!(f, "network"),
            FailureKind::MalformedResponse => write!(f, "malformed response"),
            FailureKind::Server => write!(f, "server"),
            FailureKind::BadRequest => write!(f, "bad request"),
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::QuotaExceeded => write!(f, "quota exceeded"),
            FailureKind::NoMailbox => write!(f, "no mailbox"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::Conflict => write!(f, "conflict"),
            FailureKind::Gone => write!(f, "gone"),
            FailureKind::UpgradeRequired => write!(f, "upgrade required"),
            FailureKind::Unknown(status) => write!(f, "http {}", status),
        }
    }
}

/// Why dispatch is suspended for an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum PauseReason {
    /// The service invalidated the cache for a collection; a full resync is needed.
    InvalidCache {
        /// The collection whose token was rejected.
        kind: ResourceKind,
    },
    /// Storage quota exhausted.
    QuotaExceeded,
    /// The account has no mailbox to store notes in.
    NoMailbox,
    /// The service requires a newer client.
    UpgradeRequired,
    /// Credentials rejected.
    Unauthorized,
}

impl PauseReason {
    /// Whether the engine can clear this pause on its own.
    ///
    /// Cache invalidation is recovered by resetting tokens and resyncing;
    /// everything else needs the user (sign in, free space, update the app).
    pub fn recovers_automatically(self) -> bool {
        matches!(self, PauseReason::InvalidCache { .. })
    }
}

impl fmt::Display for PauseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PauseReason::InvalidCache { kind } => write!(f, "invalid cache ({})", kind),
            PauseReason::QuotaExceeded => write!(f, "quota exceeded"),
            PauseReason::NoMailbox => write!(f, "no mailbox"),
            PauseReason::UpgradeRequired => write!(f, "upgrade required"),
            PauseReason::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// What the dispatcher does with a failed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Keep the entry where it is and retry after the fixed delay.
    Retain,
    /// Remove the entry; nothing else happens.
    Drop,
    /// Swap the entry for a different operation at the front of its class.
    Replace(Operation),
    /// Keep the entry and suspend the whole queue.
    Pause(PauseReason),
    /// Remove the entry; a client bug, loud in strict mode.
    DropBadRequest,
}

/// Decide what happens to `op` after it failed with `kind`.
pub fn decide(op: &Operation, kind: FailureKind) -> Decision {
    match kind {
        FailureKind::Network
        | FailureKind::MalformedResponse
        | FailureKind::Server
        | FailureKind::Unknown(_) => Decision::Retain,
        FailureKind::Conflict => match op {
            Operation::UpdateNote { note } => Decision::Replace(Operation::GetNoteForMerge {
                note: note.clone(),
            }),
            _ => Decision::Retain,
        },
        FailureKind::NotFound => Decision::Drop,
        FailureKind::BadRequest => Decision::DropBadRequest,
        FailureKind::Gone => Decision::Pause(PauseReason::InvalidCache {
            kind: op.resource_kind(),
        }),
        FailureKind::QuotaExceeded => Decision::Pause(PauseReason::QuotaExceeded),
        FailureKind::NoMailbox => Decision::Pause(PauseReason::NoMailbox),
        FailureKind::UpgradeRequired => Decision::Pause(PauseReason::UpgradeRequired),
        FailureKind::Unauthorized => Decision::Pause(PauseReason::Unauthorized),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::{LocalId, Note, NoteContent, RemoteData, RemoteId};

    fn remote_note() -> Note {
        let mut note = Note::new(NoteContent::text("hello"));
        note.remote_data = Some(RemoteData {
            id: RemoteId::new("r1"),
            change_key: "ck1".into(),
            last_server_version: NoteContent::text("hello"),
            last_modified_at: 0,
        });
        note
    }

    // ===========================================
    // Classification Tests
    // ===========================================

    #[test]
    fn classify_statuses() {
        let cases = [
            (ApiError::NetworkUnavailable, FailureKind::Network),
            (
                ApiError::MalformedResponse("eof".into()),
                FailureKind::MalformedResponse,
            ),
            (ApiError::status(400), FailureKind::BadRequest),
            (ApiError::status(401), FailureKind::Unauthorized),
            (ApiError::status(403), FailureKind::Unauthorized),
            (ApiError::status(404), FailureKind::NotFound),
            (ApiError::status(409), FailureKind::Conflict),
            (ApiError::status(410), FailureKind::Gone),
            (ApiError::status(426), FailureKind::UpgradeRequired),
            (ApiError::status(429), FailureKind::Server),
            (ApiError::status(503), FailureKind::Server),
            (ApiError::status(418), FailureKind::Unknown(418)),
        ];

        for (error, expected) in cases {
            assert_eq!(FailureKind::classify(&error), expected, "{:?}", error);
        }
    }

    #[test]
    fn classify_service_codes() {
        assert_eq!(
            FailureKind::classify(&ApiError::with_code(403, CODE_QUOTA_EXCEEDED)),
            FailureKind::QuotaExceeded
        );
        assert_eq!(
            FailureKind::classify(&ApiError::with_code(403, CODE_NO_MAILBOX)),
            FailureKind::NoMailbox
        );
        assert_eq!(
            FailureKind::classify(&ApiError::with_code(404, CODE_NO_MAILBOX)),
            FailureKind::NoMailbox
        );
        assert_eq!(
            FailureKind::classify(&ApiError::with_code(404, "ItemNotFound")),
            FailureKind::NotFound
        );
    }

    #[test]
    fn transient_kinds() {
        assert!(FailureKind::Network.is_transient());
        assert!(FailureKind::Conflict.is_transient());
        assert!(!FailureKind::NotFound.is_transient());
        assert!(!FailureKind::Gone.is_transient());
    }

    // ===========================================
    // Decision Tests
    // ===========================================

    #[test]
    fn conflict_on_update_becomes_merge_fetch() {
        let note = remote_note();
        let op = Operation::UpdateNote { note: note.clone() };

        let decision = decide(&op, FailureKind::Conflict);

        assert_eq!(decision, Decision::Replace(Operation::GetNoteForMerge { note }));
    }

    #[test]
    fn conflict_on_other_ops_is_retained() {
        let op = Operation::DeleteNote {
            local_id: LocalId::new(),
            remote_id: RemoteId::new("r1"),
        };
        assert_eq!(decide(&op, FailureKind::Conflict), Decision::Retain);
    }

    #[test]
    fn not_found_drops_even_creates() {
        let op = Operation::CreateNote {
            note: Note::new(NoteContent::text("x")),
        };
        assert_eq!(decide(&op, FailureKind::NotFound), Decision::Drop);
    }

    #[test]
    fn gone_pauses_with_invalid_cache_for_kind() {
        let op = Operation::Sync {
            kind: ResourceKind::SecondaryNotes,
            delta_token: None,
        };
        assert_eq!(
            decide(&op, FailureKind::Gone),
            Decision::Pause(PauseReason::InvalidCache {
                kind: ResourceKind::SecondaryNotes
            })
        );
    }

    #[test]
    fn auth_failures_pause() {
        let op = Operation::FetchMeetingNotes;
        assert_eq!(
            decide(&op, FailureKind::Unauthorized),
            Decision::Pause(PauseReason::Unauthorized)
        );
        assert_eq!(
            decide(&op, FailureKind::QuotaExceeded),
            Decision::Pause(PauseReason::QuotaExceeded)
        );
        assert_eq!(
            decide(&op, FailureKind::UpgradeRequired),
            Decision::Pause(PauseReason::UpgradeRequired)
        );
    }

    #[test]
    fn transient_failures_retain() {
        let op = Operation::FetchMeetingNotes;
        assert_eq!(decide(&op, FailureKind::Server), Decision::Retain);
        assert_eq!(decide(&op, FailureKind::Unknown(418)), Decision::Retain);
    }

    #[test]
    fn bad_request_is_flagged() {
        let op = Operation::FetchMeetingNotes;
        assert_eq!(decide(&op, FailureKind::BadRequest), Decision::DropBadRequest);
    }

    #[test]
    fn only_cache_invalidation_recovers_automatically() {
        assert!(PauseReason::InvalidCache {
            kind: ResourceKind::Notes
        }
        .recovers_automatically());
        assert!(!PauseReason::Unauthorized.recovers_automatically());
    }
}
