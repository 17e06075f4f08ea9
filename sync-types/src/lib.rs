//! # sync-types
//!
//! Data model for the notesync offline-first sync engine.
//!
//! This crate provides the foundational types used across all notesync crates:
//! - [`AccountId`], [`LocalId`], [`RemoteId`] - Identity types
//! - [`ResourceKind`], [`DeltaToken`], [`DeltaTokens`] - Collections and resume points
//! - [`Note`], [`NoteReference`], [`MeetingNote`] and remote counterparts - Entity snapshots
//! - [`Operation`] - Queued intents, each with a valid and an invalid form
//! - [`ResponseEvent`] - Successful transport results
//! - [`ApiError`] - Transport failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod ids;
mod intent;
mod note;
mod operation;
mod resource;
mod response;

pub use error::{ApiError, IntentError};
pub use ids::{AccountId, LocalId, RemoteId};
pub use intent::LocalIntent;
pub use note::{
    Color, Media, MeetingNote, Note, NoteContent, NoteReference, RemoteData, RemoteNote,
    RemoteNoteReference,
};
pub use operation::Operation;
pub use resource::{DeltaToken, DeltaTokens, ResourceKind};
pub use response::{ResponseEvent, SyncDelta};
