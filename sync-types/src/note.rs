//! Entity snapshots: what the device knows, and what the service returns.
//!
//! Local snapshots (`Note`, `NoteReference`) are owned by the storage
//! collaborator. Remote snapshots (`RemoteNote`, `RemoteNoteReference`,
//! `MeetingNote`) are produced by the transport from service payloads.

use serde::{Deserialize, Serialize};

use crate::{LocalId, RemoteId};

/// Note color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    /// The default yellow.
    #[default]
    Yellow,
    /// Green.
    Green,
    /// Pink.
    Pink,
    /// Purple.
    Purple,
    /// Blue.
    Blue,
    /// Grey.
    Grey,
    /// Charcoal.
    Charcoal,
}

/// An image attached to a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    /// Device-side id.
    pub local_id: LocalId,
    /// Service id, once uploaded.
    #[serde(default)]
    pub remote_id: Option<RemoteId>,
    /// Where the bytes live on the device, if downloaded or captured here.
    #[serde(default)]
    pub local_url: Option<String>,
    /// MIME type of the image.
    pub mime_type: String,
    /// Accessibility description.
    #[serde(default)]
    pub alt_text: Option<String>,
}

impl Media {
    /// A freshly captured image, not yet uploaded.
    pub fn captured(local_url: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            local_id: LocalId::new(),
            remote_id: None,
            local_url: Some(local_url.into()),
            mime_type: mime_type.into(),
            alt_text: None,
        }
    }
}

/// The editable body of a note.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NoteContent {
    /// Document text (serialized rich text).
    pub text: String,
    /// Note color.
    #[serde(default)]
    pub color: Color,
    /// Attached images.
    #[serde(default)]
    pub media: Vec<Media>,
}

impl NoteContent {
    /// Plain-text content with the default color.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    /// Approximate stored size, used by the reconciliation size policy.
    pub fn size_bytes(&self) -> usize {
        self.text.len()
            + self
                .media
                .iter()
                .map(|m| {
                    m.mime_type.len()
                        + m.alt_text.as_ref().map_or(0, String::len)
                        + m.local_url.as_ref().map_or(0, String::len)
                })
                .sum::<usize>()
    }

    /// Carry device-side media identity over from `existing`.
    ///
    /// Service payloads only know media by remote id; images already present
    /// locally keep their local id and downloaded file.
    pub fn adopt_local_media(&mut self, existing: &NoteContent) {
        for media in &mut self.media {
            let Some(remote_id) = media.remote_id.as_ref() else {
                continue;
            };
            if let Some(known) = existing
                .media
                .iter()
                .find(|m| m.remote_id.as_ref() == Some(remote_id))
            {
                media.local_id = known.local_id.clone();
                if media.local_url.is_none() {
                    media.local_url = known.local_url.clone();
                }
            }
        }
    }

    /// Find an attached image by local id.
    pub fn media(&self, local_id: &LocalId) -> Option<&Media> {
        self.media.iter().find(|m| &m.local_id == local_id)
    }

    /// Mutable access to an attached image by local id.
    pub fn media_mut(&mut self, local_id: &LocalId) -> Option<&mut Media> {
        self.media.iter_mut().find(|m| &m.local_id == local_id)
    }
}

/// What the device last learned from the service about a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteData {
    /// Service id.
    pub id: RemoteId,
    /// Service version stamp; sent back on update for optimistic concurrency.
    pub change_key: String,
    /// The content as the service last returned it. Base of three-way merges.
    pub last_server_version: NoteContent,
    /// Service-side modification time (epoch millis).
    pub last_modified_at: u64,
}

/// A note as known locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    /// Device-side id.
    pub local_id: LocalId,
    /// Service state, absent until the create has been acknowledged.
    #[serde(default)]
    pub remote_data: Option<RemoteData>,
    /// Current content, including unsent local edits.
    pub content: NoteContent,
    /// Monotonic counter bumped on every local edit.
    #[serde(default)]
    pub local_revision: u64,
    /// Creation time (epoch millis).
    #[serde(default)]
    pub created_at: u64,
    /// Last local modification time (epoch millis).
    #[serde(default)]
    pub last_modified_at: u64,
}

impl Note {
    /// A brand-new local note.
    pub fn new(content: NoteContent) -> Self {
        Self {
            local_id: LocalId::new(),
            remote_data: None,
            content,
            local_revision: 0,
            created_at: 0,
            last_modified_at: 0,
        }
    }

    /// Service id, if the note exists remotely.
    pub fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_data.as_ref().map(|r| &r.id)
    }

    /// Apply a local edit, bumping the revision.
    pub fn edit(&mut self, content: NoteContent) {
        self.content = content;
        self.local_revision = self.local_revision.saturating_add(1);
    }
}

/// A note as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNote {
    /// Service id.
    pub id: RemoteId,
    /// Service version stamp.
    pub change_key: String,
    /// The local id the creating client attached, when created by a client.
    #[serde(default)]
    pub created_with_local_id: Option<LocalId>,
    /// Content.
    pub content: NoteContent,
    /// Creation time (epoch millis).
    #[serde(default)]
    pub created_at: u64,
    /// Service-side modification time (epoch millis).
    #[serde(default)]
    pub last_modified_at: u64,
}

impl RemoteNote {
    /// The [`RemoteData`] a local note should carry after adopting this version.
    pub fn remote_data(&self) -> RemoteData {
        RemoteData {
            id: self.id.clone(),
            change_key: self.change_key.clone(),
            last_server_version: self.content.clone(),
            last_modified_at: self.last_modified_at,
        }
    }
}

/// A reference to a page held in another notebook service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteReference {
    /// Device-side id.
    pub local_id: LocalId,
    /// Service id.
    #[serde(default)]
    pub remote_id: Option<RemoteId>,
    /// Service version stamp last seen.
    #[serde(default)]
    pub change_key: Option<String>,
    /// Page title.
    pub title: String,
    /// Preview snippet.
    #[serde(default)]
    pub preview: String,
    /// Link to open the page.
    #[serde(default)]
    pub web_url: Option<String>,
    /// Monotonic local revision.
    #[serde(default)]
    pub local_revision: u64,
    /// Service-side modification time (epoch millis).
    #[serde(default)]
    pub last_modified_at: u64,
}

/// A note reference as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteNoteReference {
    /// Service id.
    pub id: RemoteId,
    /// Service version stamp.
    pub change_key: String,
    /// The local id attached by the creating client, if any.
    #[serde(default)]
    pub created_with_local_id: Option<LocalId>,
    /// Page title.
    pub title: String,
    /// Preview snippet.
    #[serde(default)]
    pub preview: String,
    /// Link to open the page.
    #[serde(default)]
    pub web_url: Option<String>,
    /// Service-side modification time (epoch millis).
    #[serde(default)]
    pub last_modified_at: u64,
}

/// A meeting note. Read-only; refreshed wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingNote {
    /// Service id.
    pub id: RemoteId,
    /// Title.
    pub title: String,
    /// Subject of the meeting the note belongs to.
    #[serde(default)]
    pub meeting_subject: Option<String>,
    /// Link to open the note.
    #[serde(default)]
    pub web_url: Option<String>,
    /// Service-side modification time (epoch millis).
    #[serde(default)]
    pub last_modified_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uploaded_media(remote: &str) -> Media {
        Media {
            local_id: LocalId::new(),
            remote_id: Some(RemoteId::new(remote)),
            local_url: None,
            mime_type: "image/png".into(),
            alt_text: None,
        }
    }

    #[test]
    fn edit_bumps_revision() {
        let mut note = Note::new(NoteContent::text("a"));
        assert_eq!(note.local_revision, 0);

        note.edit(NoteContent::text("ab"));

        assert_eq!(note.local_revision, 1);
        assert_eq!(note.content.text, "ab");
    }

    #[test]
    fn remote_id_comes_from_remote_data() {
        let mut note = Note::new(NoteContent::text("a"));
        assert!(note.remote_id().is_none());

        let remote = RemoteNote {
            id: RemoteId::new("r1"),
            change_key: "ck1".into(),
            created_with_local_id: Some(note.local_id.clone()),
            content: NoteContent::text("a"),
            created_at: 1,
            last_modified_at: 2,
        };
        note.remote_data = Some(remote.remote_data());

        assert_eq!(note.remote_id(), Some(&RemoteId::new("r1")));
    }

    #[test]
    fn adopt_local_media_keeps_device_identity() {
        let mut existing = NoteContent::text("x");
        let mut local = uploaded_media("m1");
        local.local_url = Some("file:///m1.png".into());
        existing.media.push(local.clone());

        let mut incoming = NoteContent::text("x");
        incoming.media.push(uploaded_media("m1"));
        incoming.media.push(uploaded_media("m2"));

        incoming.adopt_local_media(&existing);

        assert_eq!(incoming.media[0].local_id, local.local_id);
        assert_eq!(incoming.media[0].local_url.as_deref(), Some("file:///m1.png"));
        assert!(incoming.media[1].local_url.is_none());
    }

    #[test]
    fn size_counts_text_and_media_metadata() {
        let mut content = NoteContent::text("hello");
        content.media.push(Media::captured("u", "image/png"));
        assert_eq!(content.size_bytes(), 5 + "image/png".len() + 1);
    }

    #[test]
    fn note_deserializes_with_defaults() {
        let json = r#"{"local_id":"l1","content":{"text":"hi"}}"#;
        let note: Note = serde_json::from_str(json).unwrap();
        assert_eq!(note.local_revision, 0);
        assert_eq!(note.content.color, Color::Yellow);
        assert!(note.remote_data.is_none());
    }
}
