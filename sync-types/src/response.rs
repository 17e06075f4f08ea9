//! Successful transport results.

use serde::{Deserialize, Serialize};

use crate::{
    DeltaToken, LocalId, MeetingNote, RemoteId, RemoteNote, RemoteNoteReference, ResourceKind,
};

/// Payload of a sync response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncDelta<T> {
    /// The complete remote collection. Anything absent was deleted remotely.
    Full(Vec<T>),
    /// Changes since the previous token.
    Delta {
        /// Entities created or modified remotely.
        upserts: Vec<T>,
        /// Explicit remote deletions.
        deleted: Vec<RemoteId>,
    },
}

impl<T> SyncDelta<T> {
    /// Whether this payload is a full snapshot.
    pub fn is_full(&self) -> bool {
        matches!(self, SyncDelta::Full(_))
    }
}

/// What the transport returns for a successfully handled operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseEvent {
    /// `CreateNote` succeeded.
    NoteCreated {
        /// The created note, device-side.
        local_id: LocalId,
        /// The service's version.
        remote: RemoteNote,
    },
    /// `UpdateNote` succeeded.
    NoteUpdated {
        /// The note, device-side.
        local_id: LocalId,
        /// The service's version after the update.
        remote: RemoteNote,
    },
    /// `DeleteNote` succeeded.
    NoteDeleted {
        /// The note, device-side.
        local_id: LocalId,
    },
    /// `GetNoteForMerge` succeeded.
    NoteFetchedForMerge {
        /// The note, device-side.
        local_id: LocalId,
        /// The current service version.
        remote: RemoteNote,
    },
    /// `UploadMedia` succeeded.
    MediaUploaded {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Image id assigned by the service.
        media_remote_id: RemoteId,
        /// The note's new change key.
        change_key: String,
    },
    /// `DownloadMedia` succeeded.
    MediaDownloaded {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Image, service-side.
        media_remote_id: RemoteId,
        /// Where the bytes were written.
        local_url: String,
    },
    /// `DeleteMedia` succeeded.
    MediaDeleted {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// The note's new change key.
        change_key: String,
    },
    /// `UpdateMediaAltText` succeeded.
    MediaAltTextUpdated {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// The note's new change key.
        change_key: String,
    },
    /// `Sync` of a note collection succeeded.
    NotesSynced {
        /// [`ResourceKind::Notes`] or [`ResourceKind::SecondaryNotes`].
        kind: ResourceKind,
        /// Token to resume from next time.
        token: DeltaToken,
        /// Remote changes.
        delta: SyncDelta<RemoteNote>,
    },
    /// `Sync` of note references succeeded.
    NoteReferencesSynced {
        /// Token to resume from next time.
        token: DeltaToken,
        /// Remote changes.
        delta: SyncDelta<RemoteNoteReference>,
    },
    /// `FetchMeetingNotes` succeeded.
    MeetingNotesFetched {
        /// The complete list.
        notes: Vec<MeetingNote>,
    },
}

impl ResponseEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            ResponseEvent::NoteCreated { .. } => "note_created",
            ResponseEvent::NoteUpdated { .. } => "note_updated",
            ResponseEvent::NoteDeleted { .. } => "note_deleted",
            ResponseEvent::NoteFetchedForMerge { .. } => "note_fetched_for_merge",
            ResponseEvent::MediaUploaded { .. } => "media_uploaded",
            ResponseEvent::MediaDownloaded { .. } => "media_downloaded",
            ResponseEvent::MediaDeleted { .. } => "media_deleted",
            ResponseEvent::MediaAltTextUpdated { .. } => "media_alt_text_updated",
            ResponseEvent::NotesSynced { .. } => "notes_synced",
            ResponseEvent::NoteReferencesSynced { .. } => "note_references_synced",
            ResponseEvent::MeetingNotesFetched { .. } => "meeting_notes_fetched",
        }
    }
}
