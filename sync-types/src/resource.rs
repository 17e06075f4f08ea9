//! Resource kinds and their continuation tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The bounded set of remote collections an account synchronizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Notes authored in this app.
    Notes,
    /// References to pages held in another notebook service.
    NoteReferences,
    /// Notes originating from a secondary note source (synced read/write).
    SecondaryNotes,
    /// Meeting notes (fetched wholesale, no continuation token).
    MeetingNotes,
}

impl ResourceKind {
    /// Every kind, in the order initial syncs are requested.
    pub const ALL: [ResourceKind; 4] = [
        ResourceKind::Notes,
        ResourceKind::NoteReferences,
        ResourceKind::SecondaryNotes,
        ResourceKind::MeetingNotes,
    ];

    /// Whether this kind resumes from a continuation token.
    pub fn uses_delta_token(self) -> bool {
        !matches!(self, ResourceKind::MeetingNotes)
    }

    /// Whether entities of this kind are [`crate::Note`]s.
    pub fn holds_notes(self) -> bool {
        matches!(self, ResourceKind::Notes | ResourceKind::SecondaryNotes)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Notes => "notes",
            ResourceKind::NoteReferences => "note_references",
            ResourceKind::SecondaryNotes => "secondary_notes",
            ResourceKind::MeetingNotes => "meeting_notes",
        };
        f.write_str(name)
    }
}

/// Opaque service cursor marking where the next delta sync resumes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeltaToken(String);

impl DeltaToken {
    /// Wrap a token returned by the service.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Borrow the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeltaToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeltaToken({})", self.0)
    }
}

/// Per-account continuation tokens, one slot per tokenized [`ResourceKind`].
///
/// An empty slot means the next sync for that kind is a full sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaTokens {
    /// Token for [`ResourceKind::Notes`].
    #[serde(default)]
    pub notes: Option<DeltaToken>,
    /// Token for [`ResourceKind::NoteReferences`].
    #[serde(default)]
    pub note_references: Option<DeltaToken>,
    /// Token for [`ResourceKind::SecondaryNotes`].
    #[serde(default)]
    pub secondary_notes: Option<DeltaToken>,
}

impl DeltaTokens {
    /// Token for `kind`, if any. Always `None` for untokenized kinds.
    pub fn get(&self, kind: ResourceKind) -> Option<&DeltaToken> {
        match kind {
            ResourceKind::Notes => self.notes.as_ref(),
            ResourceKind::NoteReferences => self.note_references.as_ref(),
            ResourceKind::SecondaryNotes => self.secondary_notes.as_ref(),
            ResourceKind::MeetingNotes => None,
        }
    }

    /// Replace the token for `kind`. Ignored for untokenized kinds.
    pub fn set(&mut self, kind: ResourceKind, token: Option<DeltaToken>) {
        match kind {
            ResourceKind::Notes => self.notes = token,
            ResourceKind::NoteReferences => self.note_references = token,
            ResourceKind::SecondaryNotes => self.secondary_notes = token,
            ResourceKind::MeetingNotes => {}
        }
    }

    /// Forget every token, forcing full syncs.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True when no kind has a token.
    pub fn is_empty(&self) -> bool {
        self.notes.is_none() && self.note_references.is_none() && self.secondary_notes.is_none()
    }
}
