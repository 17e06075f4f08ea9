//! Intents submitted by UI and local collaborators.

use serde::{Deserialize, Serialize};

use crate::{IntentError, LocalId, Media, Note, Operation, RemoteId};

/// A user-originated change that must reach the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LocalIntent {
    /// A note was created on this device.
    CreateNote(Note),
    /// A note was edited on this device.
    UpdateNote(Note),
    /// A note was deleted on this device.
    DeleteNote {
        /// Device-side id.
        local_id: LocalId,
        /// Service id, if the note had been created remotely.
        remote_id: Option<RemoteId>,
    },
    /// An image was attached to `note`.
    UploadMedia {
        /// Owning note, current snapshot.
        note: Note,
        /// The attached image.
        media_local_id: LocalId,
    },
    /// An image's bytes are needed on this device.
    DownloadMedia {
        /// Owning note, current snapshot.
        note: Note,
        /// The image to fetch.
        media_local_id: LocalId,
    },
    /// An image was removed from `note`.
    DeleteMedia {
        /// Owning note, current snapshot.
        note: Note,
        /// The removed image (no longer present in `note`).
        media: Media,
    },
    /// An image's alt text changed.
    UpdateMediaAltText {
        /// Owning note, current snapshot.
        note: Note,
        /// The image.
        media_local_id: LocalId,
        /// New alt text.
        alt_text: Option<String>,
    },
}

impl LocalIntent {
    /// Convert into the operation to enqueue.
    ///
    /// Picks the `Invalid*` variant when a required remote id is not known.
    pub fn into_operation(self) -> Result<Operation, IntentError> {
        let op = match self {
            LocalIntent::CreateNote(note) => Operation::CreateNote { note },
            LocalIntent::UpdateNote(note) => Operation::update_note(note),
            LocalIntent::DeleteNote {
                local_id,
                remote_id,
            } => Operation::delete_note(local_id, remote_id),
            LocalIntent::UploadMedia {
                note,
                media_local_id,
            } => {
                let media = find_media(&note, &media_local_id)?;
                let local_url = media
                    .local_url
                    .clone()
                    .ok_or_else(|| IntentError::MediaNotOnDevice(media_local_id.clone()))?;
                let mime_type = media.mime_type.clone();
                match note.remote_id() {
                    Some(note_remote_id) => Operation::UploadMedia {
                        note_local_id: note.local_id.clone(),
                        note_remote_id: note_remote_id.clone(),
                        media_local_id,
                        local_url,
                        mime_type,
                    },
                    None => Operation::InvalidUploadMedia {
                        note_local_id: note.local_id.clone(),
                        media_local_id,
                        local_url,
                        mime_type,
                    },
                }
            }
            LocalIntent::DownloadMedia {
                note,
                media_local_id,
            } => {
                let media = find_media(&note, &media_local_id)?;
                let media_remote_id = media
                    .remote_id
                    .clone()
                    .ok_or_else(|| IntentError::MediaNotUploaded(media_local_id.clone()))?;
                let mime_type = media.mime_type.clone();
                match note.remote_id() {
                    Some(note_remote_id) => Operation::DownloadMedia {
                        note_local_id: note.local_id.clone(),
                        note_remote_id: note_remote_id.clone(),
                        media_remote_id,
                        mime_type,
                    },
                    None => Operation::InvalidDownloadMedia {
                        note_local_id: note.local_id.clone(),
                        media_remote_id,
                        mime_type,
                    },
                }
            }
            LocalIntent::DeleteMedia { note, media } => Operation::delete_media(
                note.local_id.clone(),
                note.remote_id().cloned(),
                media.local_id,
                media.remote_id,
            ),
            LocalIntent::UpdateMediaAltText {
                note,
                media_local_id,
                alt_text,
            } => {
                let media_remote_id = find_media(&note, &media_local_id)?.remote_id.clone();
                Operation::update_media_alt_text(
                    note.local_id.clone(),
                    note.remote_id().cloned(),
                    media_local_id,
                    media_remote_id,
                    alt_text,
                )
            }
        };
        Ok(op)
    }
}

fn find_media<'a>(note: &'a Note, media_local_id: &LocalId) -> Result<&'a Media, IntentError> {
    note.content
        .media(media_local_id)
        .ok_or_else(|| IntentError::UnknownMedia {
            note: note.local_id.clone(),
            media: media_local_id.clone(),
        })
}
