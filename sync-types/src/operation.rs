//! Queued intents to mutate or query remote state.
//!
//! Every remote-mutating operation has a valid form, which carries the remote
//! ids the service needs, and an `Invalid*` form for when those ids are not
//! known yet (typically because the note's create has not been acknowledged).
//! Invalid operations are never dispatched; they wait in the queue until a
//! response supplies the missing ids and they are rewritten to the valid form.

use serde::{Deserialize, Serialize};

use crate::{DeltaToken, LocalId, Note, RemoteData, RemoteId, ResourceKind};

/// A queued intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Operation {
    /// Create a note remotely.
    CreateNote {
        /// Snapshot to create.
        note: Note,
    },
    /// Update a note that exists remotely.
    UpdateNote {
        /// Snapshot to send; `remote_data` is always present.
        note: Note,
    },
    /// Update of a note whose remote id is not yet known.
    InvalidUpdateNote {
        /// Snapshot to send once the note exists remotely.
        note: Note,
    },
    /// Delete a note remotely.
    DeleteNote {
        /// Device-side id.
        local_id: LocalId,
        /// Service id.
        remote_id: RemoteId,
    },
    /// Delete of a note whose remote id is not yet known.
    InvalidDeleteNote {
        /// Device-side id.
        local_id: LocalId,
    },
    /// Fetch the current remote version of a note so a local edit can be
    /// merged into it (issued after an update conflicts).
    GetNoteForMerge {
        /// The local snapshot whose update conflicted.
        note: Note,
    },
    /// Upload an image attached to a note that exists remotely.
    UploadMedia {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Owning note, service-side.
        note_remote_id: RemoteId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Location of the image bytes on the device.
        local_url: String,
        /// MIME type.
        mime_type: String,
    },
    /// Upload for a note whose remote id is not yet known.
    InvalidUploadMedia {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Location of the image bytes on the device.
        local_url: String,
        /// MIME type.
        mime_type: String,
    },
    /// Download an image's bytes.
    DownloadMedia {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Owning note, service-side.
        note_remote_id: RemoteId,
        /// Image, service-side.
        media_remote_id: RemoteId,
        /// MIME type.
        mime_type: String,
    },
    /// Download for a note whose remote id is not yet known.
    InvalidDownloadMedia {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Image, service-side.
        media_remote_id: RemoteId,
        /// MIME type.
        mime_type: String,
    },
    /// Delete an uploaded image.
    DeleteMedia {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Owning note, service-side.
        note_remote_id: RemoteId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Image, service-side.
        media_remote_id: RemoteId,
    },
    /// Delete of an image whose note or image remote id is not yet known.
    InvalidDeleteMedia {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Owning note, service-side, if known.
        note_remote_id: Option<RemoteId>,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Image, service-side, if known.
        media_remote_id: Option<RemoteId>,
    },
    /// Change an uploaded image's alt text.
    UpdateMediaAltText {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Owning note, service-side.
        note_remote_id: RemoteId,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Image, service-side.
        media_remote_id: RemoteId,
        /// New alt text; `None` clears it.
        alt_text: Option<String>,
    },
    /// Alt-text change whose note or image remote id is not yet known.
    InvalidUpdateMediaAltText {
        /// Owning note, device-side.
        note_local_id: LocalId,
        /// Owning note, service-side, if known.
        note_remote_id: Option<RemoteId>,
        /// Image, device-side.
        media_local_id: LocalId,
        /// Image, service-side, if known.
        media_remote_id: Option<RemoteId>,
        /// New alt text; `None` clears it.
        alt_text: Option<String>,
    },
    /// Full (no token) or delta sync of one resource kind.
    Sync {
        /// Collection to sync.
        kind: ResourceKind,
        /// Resume point; `None` requests a full sync.
        delta_token: Option<DeltaToken>,
    },
    /// Refresh the meeting-note list.
    FetchMeetingNotes,
}

impl Operation {
    /// Update for `note`, valid when the note exists remotely.
    pub fn update_note(note: Note) -> Self {
        if note.remote_data.is_some() {
            Operation::UpdateNote { note }
        } else {
            Operation::InvalidUpdateNote { note }
        }
    }

    /// Delete for a note, valid when its remote id is known.
    pub fn delete_note(local_id: LocalId, remote_id: Option<RemoteId>) -> Self {
        match remote_id {
            Some(remote_id) => Operation::DeleteNote {
                local_id,
                remote_id,
            },
            None => Operation::InvalidDeleteNote { local_id },
        }
    }

    /// Sync request for `kind`. Meeting notes map to [`Operation::FetchMeetingNotes`].
    pub fn sync(kind: ResourceKind, delta_token: Option<DeltaToken>) -> Self {
        match kind {
            ResourceKind::MeetingNotes => Operation::FetchMeetingNotes,
            kind => Operation::Sync { kind, delta_token },
        }
    }

    /// Whether this operation may be handed to the transport.
    pub fn is_valid(&self) -> bool {
        !matches!(
            self,
            Operation::InvalidUpdateNote { .. }
                | Operation::InvalidDeleteNote { .. }
                | Operation::InvalidUploadMedia { .. }
                | Operation::InvalidDownloadMedia { .. }
                | Operation::InvalidDeleteMedia { .. }
                | Operation::InvalidUpdateMediaAltText { .. }
        )
    }

    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateNote { .. } => "create_note",
            Operation::UpdateNote { .. } => "update_note",
            Operation::InvalidUpdateNote { .. } => "invalid_update_note",
            Operation::DeleteNote { .. } => "delete_note",
            Operation::InvalidDeleteNote { .. } => "invalid_delete_note",
            Operation::GetNoteForMerge { .. } => "get_note_for_merge",
            Operation::UploadMedia { .. } => "upload_media",
            Operation::InvalidUploadMedia { .. } => "invalid_upload_media",
            Operation::DownloadMedia { .. } => "download_media",
            Operation::InvalidDownloadMedia { .. } => "invalid_download_media",
            Operation::DeleteMedia { .. } => "delete_media",
            Operation::InvalidDeleteMedia { .. } => "invalid_delete_media",
            Operation::UpdateMediaAltText { .. } => "update_media_alt_text",
            Operation::InvalidUpdateMediaAltText { .. } => "invalid_update_media_alt_text",
            Operation::Sync { .. } => "sync",
            Operation::FetchMeetingNotes => "fetch_meeting_notes",
        }
    }

    /// The collection this operation reads or writes.
    pub fn resource_kind(&self) -> ResourceKind {
        match self {
            Operation::Sync { kind, .. } => *kind,
            Operation::FetchMeetingNotes => ResourceKind::MeetingNotes,
            _ => ResourceKind::Notes,
        }
    }

    /// The note this operation targets, device-side.
    pub fn note_local_id(&self) -> Option<&LocalId> {
        match self {
            Operation::CreateNote { note }
            | Operation::UpdateNote { note }
            | Operation::InvalidUpdateNote { note }
            | Operation::GetNoteForMerge { note } => Some(&note.local_id),
            Operation::DeleteNote { local_id, .. } | Operation::InvalidDeleteNote { local_id } => {
                Some(local_id)
            }
            Operation::UploadMedia { note_local_id, .. }
            | Operation::InvalidUploadMedia { note_local_id, .. }
            | Operation::DownloadMedia { note_local_id, .. }
            | Operation::InvalidDownloadMedia { note_local_id, .. }
            | Operation::DeleteMedia { note_local_id, .. }
            | Operation::InvalidDeleteMedia { note_local_id, .. }
            | Operation::UpdateMediaAltText { note_local_id, .. }
            | Operation::InvalidUpdateMediaAltText { note_local_id, .. } => Some(note_local_id),
            Operation::Sync { .. } | Operation::FetchMeetingNotes => None,
        }
    }

    /// The image this operation targets, device-side.
    pub fn media_local_id(&self) -> Option<&LocalId> {
        match self {
            Operation::UploadMedia { media_local_id, .. }
            | Operation::InvalidUploadMedia { media_local_id, .. }
            | Operation::DeleteMedia { media_local_id, .. }
            | Operation::InvalidDeleteMedia { media_local_id, .. }
            | Operation::UpdateMediaAltText { media_local_id, .. }
            | Operation::InvalidUpdateMediaAltText { media_local_id, .. } => Some(media_local_id),
            _ => None,
        }
    }

    /// Whether this operation carries a note snapshot whose revision is
    /// tracked for conflict detection.
    pub fn sends_note_snapshot(&self) -> Option<&Note> {
        match self {
            Operation::CreateNote { note } | Operation::UpdateNote { note } => Some(note),
            _ => None,
        }
    }

    /// Rewrite for a note that just learned its service state.
    ///
    /// Invalid operations targeting `local_id` become valid where the note's
    /// remote id was the only thing missing; a queued valid update picks up the
    /// fresh change key so it is not rejected as stale. Returns `None` when
    /// the operation is unaffected.
    pub fn resolve_note(&self, local_id: &LocalId, remote: &RemoteData) -> Option<Operation> {
        if self.note_local_id() != Some(local_id) {
            return None;
        }
        let remote_id = remote.id.clone();
        let resolved = match self.clone() {
            Operation::InvalidUpdateNote { mut note } | Operation::UpdateNote { mut note } => {
                note.remote_data = Some(remote.clone());
                Operation::UpdateNote { note }
            }
            Operation::InvalidDeleteNote { local_id } => Operation::DeleteNote {
                local_id,
                remote_id,
            },
            Operation::InvalidUploadMedia {
                note_local_id,
                media_local_id,
                local_url,
                mime_type,
            } => Operation::UploadMedia {
                note_local_id,
                note_remote_id: remote_id,
                media_local_id,
                local_url,
                mime_type,
            },
            Operation::InvalidDownloadMedia {
                note_local_id,
                media_remote_id,
                mime_type,
            } => Operation::DownloadMedia {
                note_local_id,
                note_remote_id: remote_id,
                media_remote_id,
                mime_type,
            },
            Operation::InvalidDeleteMedia {
                note_local_id,
                media_local_id,
                media_remote_id,
                ..
            } => Self::delete_media(note_local_id, Some(remote_id), media_local_id, media_remote_id),
            Operation::InvalidUpdateMediaAltText {
                note_local_id,
                media_local_id,
                media_remote_id,
                alt_text,
                ..
            } => Self::update_media_alt_text(
                note_local_id,
                Some(remote_id),
                media_local_id,
                media_remote_id,
                alt_text,
            ),
            _ => return None,
        };
        Some(resolved)
    }

    /// Rewrite for an image that was just uploaded and assigned `media_remote_id`.
    pub fn resolve_media(&self, media_local_id: &LocalId, media_remote_id: &RemoteId) -> Option<Operation> {
        if self.media_local_id() != Some(media_local_id) {
            return None;
        }
        let resolved = match self.clone() {
            Operation::InvalidDeleteMedia {
                note_local_id,
                note_remote_id,
                media_local_id,
                ..
            } => Self::delete_media(
                note_local_id,
                note_remote_id,
                media_local_id,
                Some(media_remote_id.clone()),
            ),
            Operation::InvalidUpdateMediaAltText {
                note_local_id,
                note_remote_id,
                media_local_id,
                alt_text,
                ..
            } => Self::update_media_alt_text(
                note_local_id,
                note_remote_id,
                media_local_id,
                Some(media_remote_id.clone()),
                alt_text,
            ),
            _ => return None,
        };
        Some(resolved)
    }

    /// Delete-media operation, valid when both remote ids are known.
    pub fn delete_media(
        note_local_id: LocalId,
        note_remote_id: Option<RemoteId>,
        media_local_id: LocalId,
        media_remote_id: Option<RemoteId>,
    ) -> Self {
        match (note_remote_id, media_remote_id) {
            (Some(note_remote_id), Some(media_remote_id)) => Operation::DeleteMedia {
                note_local_id,
                note_remote_id,
                media_local_id,
                media_remote_id,
            },
            (note_remote_id, media_remote_id) => Operation::InvalidDeleteMedia {
                note_local_id,
                note_remote_id,
                media_local_id,
                media_remote_id,
            },
        }
    }

    /// Alt-text operation, valid when both remote ids are known.
    pub fn update_media_alt_text(
        note_local_id: LocalId,
        note_remote_id: Option<RemoteId>,
        media_local_id: LocalId,
        media_remote_id: Option<RemoteId>,
        alt_text: Option<String>,
    ) -> Self {
        match (note_remote_id, media_remote_id) {
            (Some(note_remote_id), Some(media_remote_id)) => Operation::UpdateMediaAltText {
                note_local_id,
                note_remote_id,
                media_local_id,
                media_remote_id,
                alt_text,
            },
            (note_remote_id, media_remote_id) => Operation::InvalidUpdateMediaAltText {
                note_local_id,
                note_remote_id,
                media_local_id,
                media_remote_id,
                alt_text,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NoteContent;

    fn remote_data(id: &str) -> RemoteData {
        RemoteData {
            id: RemoteId::new(id),
            change_key: "ck".into(),
            last_server_version: NoteContent::text("server"),
            last_modified_at: 0,
        }
    }

    #[test]
    fn update_without_remote_id_is_invalid() {
        let note = Note::new(NoteContent::text("a"));
        let op = Operation::update_note(note);
        assert!(matches!(op, Operation::InvalidUpdateNote { .. }));
        assert!(!op.is_valid());
    }

    #[test]
    fn update_with_remote_id_is_valid() {
        let mut note = Note::new(NoteContent::text("a"));
        note.remote_data = Some(remote_data("r1"));
        let op = Operation::update_note(note);
        assert!(matches!(op, Operation::UpdateNote { .. }));
        assert!(op.is_valid());
    }

    #[test]
    fn sync_for_meeting_notes_is_fetch() {
        assert_eq!(
            Operation::sync(ResourceKind::MeetingNotes, None),
            Operation::FetchMeetingNotes
        );
        assert_eq!(
            Operation::sync(ResourceKind::Notes, None).resource_kind(),
            ResourceKind::Notes
        );
    }

    #[test]
    fn resolve_note_turns_invalid_delete_valid() {
        let local_id = LocalId::new();
        let op = Operation::InvalidDeleteNote {
            local_id: local_id.clone(),
        };

        let resolved = op.resolve_note(&local_id, &remote_data("r9")).unwrap();

        assert_eq!(
            resolved,
            Operation::DeleteNote {
                local_id,
                remote_id: RemoteId::new("r9")
            }
        );
    }

    #[test]
    fn resolve_note_ignores_other_notes() {
        let op = Operation::InvalidDeleteNote {
            local_id: LocalId::new(),
        };
        assert!(op.resolve_note(&LocalId::new(), &remote_data("r")).is_none());
    }

    #[test]
    fn invalid_media_delete_needs_both_ids() {
        let note_id = LocalId::new();
        let media_id = LocalId::new();
        let op = Operation::delete_media(note_id.clone(), None, media_id.clone(), None);

        let half = op.resolve_note(&note_id, &remote_data("n1")).unwrap();
        assert!(!half.is_valid());

        let full = half.resolve_media(&media_id, &RemoteId::new("m1")).unwrap();
        assert!(full.is_valid());
        assert!(matches!(full, Operation::DeleteMedia { .. }));
    }

    #[test]
    fn serialized_form_is_tagged() {
        let op = Operation::Sync {
            kind: ResourceKind::Notes,
            delta_token: Some(DeltaToken::new("T1")),
        };
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["type"], "sync");
        assert_eq!(value["data"]["kind"], "notes");
        assert_eq!(value["data"]["delta_token"], "T1");

        let restored: Operation = serde_json::from_value(value).unwrap();
        assert_eq!(restored, op);
    }

    #[test]
    fn fetch_meeting_notes_serializes_without_data() {
        let value = serde_json::to_value(Operation::FetchMeetingNotes).unwrap();
        assert_eq!(value["type"], "fetch_meeting_notes");
    }
}
