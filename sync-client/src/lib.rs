//! # sync-client
//!
//! Offline-first sync engine for notesync.
//!
//! Applications submit local changes and receive reconciled entity
//! collections; this crate keeps the two sides of an account converged.
//!
//! ## Features
//!
//! - **Durable Queue**: Priority-ordered operations mirrored to disk per account
//! - **Serialized Dispatch**: At most one operation in flight per account
//! - **Reconciliation**: Full and delta syncs turned into atomic change sets
//! - **Conflict Handling**: Revision-checked responses with three-way merges
//! - **Remote Change Detection**: Realtime channel plus periodic polling
//! - **Pure State Machine**: Uses sync-core for side-effect-free logic
//!
//! ## Example
//!
//! ```ignore
//! use notesync_client::{Collaborators, Orchestrator, SyncConfig};
//!
//! let orchestrator = Orchestrator::new(SyncConfig::default(), collaborators)?;
//! let mut notifications = orchestrator.subscribe();
//!
//! orchestrator.login(account.clone()).await?;
//! orchestrator.submit(&account, LocalIntent::CreateNote(note)).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod durable;
pub mod handler;
pub mod merge;
pub mod orchestrator;
pub mod persist;
pub mod poller;
pub mod realtime;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use config::{ConfigError, SyncConfig};
pub use credentials::{CredentialError, CredentialProvider, StaticCredentials};
pub use dispatcher::{DispatchError, Dispatcher, WorkOutcome};
pub use durable::DurableQueue;
pub use handler::{HandlerError, HandlerOutcome, ResponseHandler, Rewrite};
pub use merge::{FieldMerge, MergeError, MergeOutcome, MergeStrategy};
pub use orchestrator::{
    Collaborators, NotificationKind, Orchestrator, OrchestratorError, SyncNotification,
};
pub use persist::{LoadedMirror, PersistError, QueueMirror};
pub use poller::Poller;
pub use realtime::{MockRealtimeChannel, RealtimeChannel, RealtimeConnection, RealtimeError};
pub use scheduler::RepeatingTask;
pub use store::{LocalStore, MemoryStore, StoreError};
pub use transport::{MockTransport, TransportHandler};
