//! Three-way merge collaborator.
//!
//! The engine decides *when* a merge is needed (see
//! `notesync_core::conflict`); a [`MergeStrategy`] decides *how*.

use notesync_types::NoteContent;
use thiserror::Error;

/// Merge errors.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The strategy failed outright.
    #[error("merge failed: {0}")]
    Failed(String),
}

/// Result of a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Both sides combined.
    Merged(NoteContent),
    /// The versions cannot be merged; the remote version wins.
    Incompatible,
}

/// Merges diverged note content.
pub trait MergeStrategy: Send + Sync {
    /// Merge `local` and `remote`, both derived from `base`.
    fn merge(
        &self,
        base: &NoteContent,
        local: &NoteContent,
        remote: &NoteContent,
    ) -> Result<MergeOutcome, MergeError>;
}

/// Line placed between the remote and local text when both sides edited it.
pub const CONFLICT_SEPARATOR: &str = "\n\n---- local edit ----\n\n";

/// Field-level merge: a field changed on one side only takes that side's
/// value. Text changed differently on both sides keeps both, remote first,
/// split by [`CONFLICT_SEPARATOR`]. Media lists are unioned by local id,
/// remote first.
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldMerge;

impl MergeStrategy for FieldMerge {
    fn merge(
        &self,
        base: &NoteContent,
        local: &NoteContent,
        remote: &NoteContent,
    ) -> Result<MergeOutcome, MergeError> {
        let text = match (local.text != base.text, remote.text != base.text) {
            (true, true) if local.text != remote.text => {
                format!("{}{}{}", remote.text, CONFLICT_SEPARATOR, local.text)
            }
            (true, _) => local.text.clone(),
            _ => remote.text.clone(),
        };
        let color = if local.color != base.color {
            local.color
        } else {
            remote.color
        };

        let mut media = remote.media.clone();
        for attached in &local.media {
            let known = media.iter().any(|m| {
                m.local_id == attached.local_id
                    || (m.remote_id.is_some() && m.remote_id == attached.remote_id)
            });
            let removed_remotely = base.media.iter().any(|m| m.local_id == attached.local_id);
            if !known && !removed_remotely {
                media.push(attached.clone());
            }
        }

        Ok(MergeOutcome::Merged(NoteContent { text, color, media }))
    }
}
