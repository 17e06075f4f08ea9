//! Per-note conflict resolution for create/update/merge-fetch responses.
//!
//! When a write comes back, the note may have been edited again while the
//! request was in flight. The revision recorded when the request was sent is
//! compared with the note's current revision: unchanged means the remote
//! version can be adopted as-is, changed means a three-way merge.

use notesync_types::{Note, NoteContent, RemoteNote};

/// The request a response belongs to.
#[derive(Debug, Clone, Copy)]
pub enum Sent<'a> {
    /// A create or update carrying `snapshot`.
    Write {
        /// The note as sent.
        snapshot: &'a Note,
        /// The revision recorded at send time, if it was recorded.
        pre_send_revision: Option<u64>,
    },
    /// A fetch issued after the service rejected an update as stale.
    MergeFetch {
        /// The note as it was when the update was rejected.
        snapshot: &'a Note,
    },
}

/// Inputs for a three-way merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequest {
    /// Common ancestor.
    pub base: NoteContent,
    /// The note as it is locally now.
    pub local: Note,
    /// The service's version.
    pub remote: RemoteNote,
}

impl MergeRequest {
    /// The note after adopting `merged` content on top of the remote version.
    ///
    /// The revision is bumped so the merged content is pushed back.
    pub fn merged(&self, merged: NoteContent) -> Note {
        let mut note = adopt(&self.local, &self.remote);
        note.content = merged;
        note.local_revision = self.local.local_revision.saturating_add(1);
        note
    }

    /// The note after discarding local changes in favour of the remote version.
    pub fn remote_wins(&self) -> Note {
        adopt(&self.local, &self.remote)
    }
}

/// What to do with a note response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Store this note; no local edit was lost.
    ApplyRemote(Note),
    /// Local edits raced the request; merge before storing.
    Merge(MergeRequest),
    /// The note was deleted locally meanwhile; nothing to store.
    Missing,
}

/// Resolve a response carrying `remote` for a note currently stored as `current`.
pub fn resolve(current: Option<&Note>, sent: Sent<'_>, remote: &RemoteNote) -> Resolution {
    let Some(current) = current else {
        return Resolution::Missing;
    };

    match sent {
        Sent::Write {
            snapshot,
            pre_send_revision,
        } => {
            let sent_revision = pre_send_revision.unwrap_or(snapshot.local_revision);
            if current.local_revision == sent_revision {
                Resolution::ApplyRemote(adopt(current, remote))
            } else {
                Resolution::Merge(MergeRequest {
                    base: snapshot.content.clone(),
                    local: current.clone(),
                    remote: remote.clone(),
                })
            }
        }
        Sent::MergeFetch { snapshot } => {
            let base = snapshot
                .remote_data
                .as_ref()
                .map(|r| r.last_server_version.clone())
                .unwrap_or_default();
            Resolution::Merge(MergeRequest {
                base,
                local: current.clone(),
                remote: remote.clone(),
            })
        }
    }
}

/// `local` with the remote version adopted, keeping device-side identity.
fn adopt(local: &Note, remote: &RemoteNote) -> Note {
    let mut content = remote.content.clone();
    content.adopt_local_media(&local.content);
    Note {
        local_id: local.local_id.clone(),
        remote_data: Some(remote.remote_data()),
        content,
        local_revision: local.local_revision,
        created_at: local.created_at,
        last_modified_at: remote.last_modified_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::{RemoteData, RemoteId};

    fn synced_note(text: &str) -> Note {
        let mut note = Note::new(NoteContent::text(text));
        note.remote_data = Some(RemoteData {
            id: RemoteId::new("r1"),
            change_key: "ck1".into(),
            last_server_version: NoteContent::text(text),
            last_modified_at: 1,
        });
        note
    }

    fn remote_version(text: &str, change_key: &str) -> RemoteNote {
        RemoteNote {
            id: RemoteId::new("r1"),
            change_key: change_key.into(),
            created_with_local_id: None,
            content: NoteContent::text(text),
            created_at: 0,
            last_modified_at: 5,
        }
    }

    #[test]
    fn unchanged_local_applies_remote() {
        let mut note = synced_note("v1");
        note.edit(NoteContent::text("v2"));
        let sent = note.clone();
        let remote = remote_version("v2", "ck2");

        let resolution = resolve(
            Some(&note),
            Sent::Write {
                snapshot: &sent,
                pre_send_revision: Some(note.local_revision),
            },
            &remote,
        );

        match resolution {
            Resolution::ApplyRemote(applied) => {
                assert_eq!(applied.local_id, note.local_id);
                assert_eq!(applied.remote_data.unwrap().change_key, "ck2");
                assert_eq!(applied.local_revision, note.local_revision);
            }
            other => panic!("Expected ApplyRemote, got {:?}", other),
        }
    }

    #[test]
    fn edit_during_round_trip_requests_merge() {
        let mut note = synced_note("v1");
        note.edit(NoteContent::text("v2"));
        let sent = note.clone();
        note.edit(NoteContent::text("v3"));

        let resolution = resolve(
            Some(&note),
            Sent::Write {
                snapshot: &sent,
                pre_send_revision: Some(sent.local_revision),
            },
            &remote_version("v2", "ck2"),
        );

        match resolution {
            Resolution::Merge(request) => {
                assert_eq!(request.base.text, "v2");
                assert_eq!(request.local.content.text, "v3");
                assert_eq!(request.remote.content.text, "v2");
            }
            other => panic!("Expected Merge, got {:?}", other),
        }
    }

    #[test]
    fn merge_fetch_always_merges_from_last_server_version() {
        let mut note = synced_note("base");
        note.edit(NoteContent::text("local"));

        let resolution = resolve(
            Some(&note),
            Sent::MergeFetch { snapshot: &note },
            &remote_version("theirs", "ck9"),
        );

        match resolution {
            Resolution::Merge(request) => assert_eq!(request.base.text, "base"),
            other => panic!("Expected Merge, got {:?}", other),
        }
    }

    #[test]
    fn deleted_locally_is_missing() {
        let note = synced_note("v1");
        let resolution = resolve(
            None,
            Sent::Write {
                snapshot: &note,
                pre_send_revision: None,
            },
            &remote_version("v1", "ck2"),
        );
        assert_eq!(resolution, Resolution::Missing);
    }

    #[test]
    fn merged_note_bumps_revision() {
        let mut note = synced_note("base");
        note.edit(NoteContent::text("local"));
        let request = MergeRequest {
            base: NoteContent::text("base"),
            local: note.clone(),
            remote: remote_version("theirs", "ck9"),
        };

        let merged = request.merged(NoteContent::text("local+theirs"));
        let lost = request.remote_wins();

        assert_eq!(merged.local_revision, note.local_revision + 1);
        assert_eq!(merged.remote_data.unwrap().change_key, "ck9");
        assert_eq!(lost.content.text, "theirs");
        assert_eq!(lost.local_revision, note.local_revision);
    }
}
