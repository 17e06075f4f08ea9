//! # sync-core
//!
//! Pure logic for notesync (no I/O, instant tests).
//!
//! This crate implements the queue, reconciliation and state machines of
//! the sync engine without any network or disk I/O, enabling fast unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. This enables:
//! - Instant unit tests (no mocks, no async)
//! - Deterministic behavior (same input → same output)
//! - Easy reasoning about state transitions
//!
//! The actual I/O (transport, storage, the queue mirror) is performed by
//! `sync-client`, which interprets the decisions and actions produced here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod classify;
pub mod conflict;
pub mod migration;
pub mod queue;
pub mod reconcile;
pub mod state;

pub use backoff::ReconnectBackoff;
pub use classify::{decide, Decision, FailureKind, PauseReason};
pub use conflict::{MergeRequest, Resolution, Sent};
pub use migration::{migrate, MigrationError, CURRENT_SCHEMA_VERSION};
pub use queue::{EntryId, PriorityClass, PriorityQueue, PushOutcome, QueueEntry};
pub use reconcile::{CapturedRevisions, ChangeSet, LocalEntity, RemoteEntity, Replacement};
pub use state::{Action, SyncEvent, SyncState};
