//! Local entity store abstraction.
//!
//! The store owns note entities, continuation tokens and the pre-send
//! revision map. The sync engine only reads from it and hands it change
//! sets; it never edits entities in place.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use notesync_core::ChangeSet;
use notesync_types::{AccountId, DeltaTokens, LocalId, MeetingNote, Note, NoteReference, ResourceKind};
use thiserror::Error;

/// Store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing storage could not be read or written.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A note-holding call was made for a kind that does not hold notes.
    #[error("{0} does not hold notes")]
    WrongKind(ResourceKind),
}

/// Trait for local entity storage backends.
///
/// Every `apply_*` call must be atomic: either the whole change set is
/// visible afterwards or none of it is.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// All notes of `kind` (`Notes` or `SecondaryNotes`).
    async fn notes(&self, account: &AccountId, kind: ResourceKind) -> Result<Vec<Note>, StoreError>;

    /// A single note of any note-holding kind.
    async fn note(&self, account: &AccountId, local_id: &LocalId) -> Result<Option<Note>, StoreError>;

    /// Apply a change set to the notes of `kind`.
    ///
    /// A replacement only overwrites content if the stored note is still at
    /// `base_revision`; otherwise only its remote state is refreshed, so a
    /// local edit made during the round trip survives.
    async fn apply_note_changes(
        &self,
        account: &AccountId,
        kind: ResourceKind,
        changes: ChangeSet<Note>,
    ) -> Result<(), StoreError>;

    /// All note references.
    async fn note_references(&self, account: &AccountId) -> Result<Vec<NoteReference>, StoreError>;

    /// Apply a change set to note references.
    async fn apply_note_reference_changes(
        &self,
        account: &AccountId,
        changes: ChangeSet<NoteReference>,
    ) -> Result<(), StoreError>;

    /// Current meeting notes.
    async fn meeting_notes(&self, account: &AccountId) -> Result<Vec<MeetingNote>, StoreError>;

    /// Replace the meeting-note list wholesale.
    async fn replace_meeting_notes(
        &self,
        account: &AccountId,
        notes: Vec<MeetingNote>,
    ) -> Result<(), StoreError>;

    /// Read persisted continuation tokens. Empty for a new account.
    async fn load_tokens(&self, account: &AccountId) -> Result<DeltaTokens, StoreError>;

    /// Persist continuation tokens.
    async fn save_tokens(&self, account: &AccountId, tokens: &DeltaTokens) -> Result<(), StoreError>;

    /// The revision a note had when it was last sent.
    async fn pre_send_revision(
        &self,
        account: &AccountId,
        local_id: &LocalId,
    ) -> Result<Option<u64>, StoreError>;

    /// Record the revision of a note about to be sent.
    async fn record_pre_send_revision(
        &self,
        account: &AccountId,
        local_id: &LocalId,
        revision: u64,
    ) -> Result<(), StoreError>;

    /// Forget every recorded pre-send revision.
    async fn clear_pre_send_revisions(&self, account: &AccountId) -> Result<(), StoreError>;

    /// Remove everything held for `account`.
    async fn clear_account(&self, account: &AccountId) -> Result<(), StoreError>;
}
