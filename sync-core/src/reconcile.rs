//! Change-set computation for full and delta sync payloads.
//!
//! Reconciliation never touches storage. It reads the local collection and
//! the revisions captured before the sync request went out, and produces a
//! [`ChangeSet`] the store applies atomically.
//!
//! Matching, per remote entity:
//! 1. a local entity with the same remote id
//! 2. otherwise a local entity whose local id the creating client attached
//!    (`created_with_local_id`), provided it has no remote id of its own yet
//!
//! A match becomes a replace, but only when the change key moved; an
//! unchanged entity produces nothing, which is what makes re-applying a full
//! payload a no-op.

use std::collections::{HashMap, HashSet};

use notesync_types::{
    LocalId, Note, NoteReference, RemoteId, RemoteNote, RemoteNoteReference, SyncDelta,
};

/// Revisions captured before a sync request was sent, keyed by local id.
pub type CapturedRevisions = HashMap<LocalId, u64>;

/// A locally stored entity that reconciliation can match and replace.
pub trait LocalEntity: Clone {
    /// Device-side id.
    fn local_id(&self) -> &LocalId;
    /// Service id, once known.
    fn remote_id(&self) -> Option<&RemoteId>;
    /// Service version stamp last adopted.
    fn change_key(&self) -> Option<&str>;
    /// Monotonic local edit counter.
    fn local_revision(&self) -> u64;
    /// Approximate stored size.
    fn size_bytes(&self) -> usize;
}

/// A service-side entity that maps onto a [`LocalEntity`].
pub trait RemoteEntity {
    /// The local form.
    type Local: LocalEntity;

    /// Service id.
    fn remote_id(&self) -> &RemoteId;
    /// Service version stamp.
    fn change_key(&self) -> &str;
    /// Local id attached by the creating client.
    fn created_with_local_id(&self) -> Option<&LocalId>;
    /// Build the local entity adopting this version.
    ///
    /// `existing` is the matched local entity for replaces; its device-only
    /// state (media files, creation time) carries over.
    fn to_local(&self, local_id: LocalId, revision: u64, existing: Option<&Self::Local>) -> Self::Local;
}

/// A local entity to overwrite with a remote version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement<L> {
    /// The revision captured before the request went out. The store only
    /// overwrites content if the entity is still at this revision.
    pub base_revision: u64,
    /// The replacement.
    pub entity: L,
}

/// Creates, replaces and deletes for one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet<L> {
    /// Remote entities unknown locally.
    pub to_create: Vec<L>,
    /// Local entities with a newer remote version.
    pub to_replace: Vec<Replacement<L>>,
    /// Local entities deleted remotely.
    pub to_delete: Vec<LocalId>,
}

impl<L> Default for ChangeSet<L> {
    fn default() -> Self {
        Self {
            to_create: Vec::new(),
            to_replace: Vec::new(),
            to_delete: Vec::new(),
        }
    }
}

impl<L: LocalEntity> ChangeSet<L> {
    /// Check if there is nothing to apply.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_replace.is_empty() && self.to_delete.is_empty()
    }

    /// Total number of changes.
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_replace.len() + self.to_delete.len()
    }

    /// Remove creates and replaces larger than `limit` bytes.
    ///
    /// Returns the local ids that were filtered out.
    pub fn filter_oversized(&mut self, limit: usize) -> Vec<LocalId> {
        let mut skipped = Vec::new();
        self.to_create.retain(|e| {
            let keep = e.size_bytes() <= limit;
            if !keep {
                skipped.push(e.local_id().clone());
            }
            keep
        });
        self.to_replace.retain(|r| {
            let keep = r.entity.size_bytes() <= limit;
            if !keep {
                skipped.push(r.entity.local_id().clone());
            }
            keep
        });
        skipped
    }
}

/// Compute the change set for either payload shape.
pub fn compute<R: RemoteEntity>(
    locals: &[R::Local],
    delta: &SyncDelta<R>,
    captured: &CapturedRevisions,
) -> ChangeSet<R::Local> {
    match delta {
        SyncDelta::Full(remotes) => compute_full(locals, remotes, captured),
        SyncDelta::Delta { upserts, deleted } => compute_delta(locals, upserts, deleted, captured),
    }
}

/// Reconcile a complete remote collection. Local entities with a remote id
/// that the payload does not mention are deleted.
pub fn compute_full<R: RemoteEntity>(
    locals: &[R::Local],
    remotes: &[R],
    captured: &CapturedRevisions,
) -> ChangeSet<R::Local> {
    let index = Index::new(locals);
    let mut changes = ChangeSet::default();
    let mut visited = HashSet::new();

    for remote in remotes {
        upsert(&index, remote, captured, &mut visited, &mut changes);
    }

    changes.to_delete = locals
        .iter()
        .filter(|l| l.remote_id().is_some() && !visited.contains(l.local_id()))
        .map(|l| l.local_id().clone())
        .collect();
    changes
}

/// Reconcile incremental changes. Only explicit markers delete.
pub fn compute_delta<R: RemoteEntity>(
    locals: &[R::Local],
    upserts: &[R],
    deleted: &[RemoteId],
    captured: &CapturedRevisions,
) -> ChangeSet<R::Local> {
    let index = Index::new(locals);
    let mut changes = ChangeSet::default();
    let mut visited = HashSet::new();

    for remote in upserts {
        upsert(&index, remote, captured, &mut visited, &mut changes);
    }
    // A deletion marker wins over an upsert of the same entity.
    for remote_id in deleted {
        if let Some(local) = index.by_remote.get(remote_id) {
            let local_id = local.local_id();
            changes.to_replace.retain(|r| r.entity.local_id() != local_id);
            if !changes.to_delete.contains(local_id) {
                changes.to_delete.push(local_id.clone());
            }
        }
    }
    changes
}

struct Index<'a, L> {
    by_remote: HashMap<&'a RemoteId, &'a L>,
    by_local: HashMap<&'a LocalId, &'a L>,
}

impl<'a, L: LocalEntity> Index<'a, L> {
    fn new(locals: &'a [L]) -> Self {
        let mut by_remote = HashMap::new();
        let mut by_local = HashMap::new();
        for local in locals {
            if let Some(remote_id) = local.remote_id() {
                by_remote.insert(remote_id, local);
            }
            by_local.insert(local.local_id(), local);
        }
        Self {
            by_remote,
            by_local,
        }
    }

    fn find(&self, remote_id: &RemoteId, created_with: Option<&LocalId>) -> Option<&'a L> {
        if let Some(local) = self.by_remote.get(remote_id) {
            return Some(*local);
        }
        created_with
            .and_then(|id| self.by_local.get(id))
            .copied()
            .filter(|l| l.remote_id().is_none())
    }
}

fn upsert<R: RemoteEntity>(
    index: &Index<'_, R::Local>,
    remote: &R,
    captured: &CapturedRevisions,
    visited: &mut HashSet<LocalId>,
    changes: &mut ChangeSet<R::Local>,
) {
    match index.find(remote.remote_id(), remote.created_with_local_id()) {
        Some(local) => {
            if !visited.insert(local.local_id().clone()) {
                return;
            }
            if local.change_key() == Some(remote.change_key()) {
                return;
            }
            let base_revision = captured
                .get(local.local_id())
                .copied()
                .unwrap_or_else(|| local.local_revision());
            changes.to_replace.push(Replacement {
                base_revision,
                entity: remote.to_local(local.local_id().clone(), base_revision, Some(local)),
            });
        }
        None => {
            changes.to_create.push(remote.to_local(LocalId::new(), 0, None));
        }
    }
}

// ===========================================
// Entity bindings
// ===========================================

impl LocalEntity for Note {
    fn local_id(&self) -> &LocalId {
        &self.local_id
    }

    fn remote_id(&self) -> Option<&RemoteId> {
        Note::remote_id(self)
    }

    fn change_key(&self) -> Option<&str> {
        self.remote_data.as_ref().map(|r| r.change_key.as_str())
    }

    fn local_revision(&self) -> u64 {
        self.local_revision
    }

    fn size_bytes(&self) -> usize {
        self.content.size_bytes()
    }
}

impl RemoteEntity for RemoteNote {
    type Local = Note;

    fn remote_id(&self) -> &RemoteId {
        &self.id
    }

    fn change_key(&self) -> &str {
        &self.change_key
    }

    fn created_with_local_id(&self) -> Option<&LocalId> {
        self.created_with_local_id.as_ref()
    }

    fn to_local(&self, local_id: LocalId, revision: u64, existing: Option<&Note>) -> Note {
        let mut content = self.content.clone();
        if let Some(existing) = existing {
            content.adopt_local_media(&existing.content);
        }
        Note {
            local_id,
            remote_data: Some(self.remote_data()),
            content,
            local_revision: revision,
            created_at: existing.map_or(self.created_at, |e| e.created_at),
            last_modified_at: self.last_modified_at,
        }
    }
}

impl LocalEntity for NoteReference {
    fn local_id(&self) -> &LocalId {
        &self.local_id
    }

    fn remote_id(&self) -> Option<&RemoteId> {
        self.remote_id.as_ref()
    }

    fn change_key(&self) -> Option<&str> {
        self.change_key.as_deref()
    }

    fn local_revision(&self) -> u64 {
        self.local_revision
    }

    fn size_bytes(&self) -> usize {
        self.title.len() + self.preview.len() + self.web_url.as_ref().map_or(0, String::len)
    }
}

impl RemoteEntity for RemoteNoteReference {
    type Local = NoteReference;

    fn remote_id(&self) -> &RemoteId {
        &self.id
    }

    fn change_key(&self) -> &str {
        &self.change_key
    }

    fn created_with_local_id(&self) -> Option<&LocalId> {
        self.created_with_local_id.as_ref()
    }

    fn to_local(&self, local_id: LocalId, revision: u64, _existing: Option<&NoteReference>) -> NoteReference {
        NoteReference {
            local_id,
            remote_id: Some(self.id.clone()),
            change_key: Some(self.change_key.clone()),
            title: self.title.clone(),
            preview: self.preview.clone(),
            web_url: self.web_url.clone(),
            local_revision: revision,
            last_modified_at: self.last_modified_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::NoteContent;

    fn remote(id: &str, change_key: &str, text: &str) -> RemoteNote {
        RemoteNote {
            id: RemoteId::new(id),
            change_key: change_key.into(),
            created_with_local_id: None,
            content: NoteContent::text(text),
            created_at: 1,
            last_modified_at: 2,
        }
    }

    /// Apply a change set the way a store would, ignoring revision checks.
    fn apply(locals: &mut Vec<Note>, changes: ChangeSet<Note>) {
        locals.retain(|n| !changes.to_delete.contains(&n.local_id));
        for replacement in changes.to_replace {
            if let Some(slot) = locals
                .iter_mut()
                .find(|n| n.local_id == replacement.entity.local_id)
            {
                *slot = replacement.entity;
            }
        }
        locals.extend(changes.to_create);
    }

    // ===========================================
    // Full Sync Tests
    // ===========================================

    #[test]
    fn first_full_sync_creates_everything() {
        let changes = compute_full::<RemoteNote>(&[], &[remote("123", "a", "hi")], &HashMap::new());

        assert_eq!(changes.to_create.len(), 1);
        assert_eq!(changes.to_create[0].remote_id(), Some(&RemoteId::new("123")));
        assert!(changes.to_replace.is_empty());
        assert!(changes.to_delete.is_empty());
    }

    #[test]
    fn full_sync_is_idempotent() {
        let payload = vec![remote("1", "a", "one"), remote("2", "b", "two")];
        let mut locals: Vec<Note> = Vec::new();

        let first = compute_full(&locals, &payload, &HashMap::new());
        apply(&mut locals, first);
        let second = compute_full(&locals, &payload, &HashMap::new());

        assert!(second.is_empty(), "{:?}", second);
    }

    #[test]
    fn full_sync_deletes_absent_remote_entities() {
        let mut locals: Vec<Note> = Vec::new();
        let initial = compute_full(
            &locals,
            &[remote("1", "a", "one"), remote("2", "b", "two")],
            &HashMap::new(),
        );
        apply(&mut locals, initial);
        let gone = locals
            .iter()
            .find(|n| n.remote_id() == Some(&RemoteId::new("2")))
            .unwrap()
            .local_id
            .clone();

        let changes = compute_full(&locals, &[remote("1", "a", "one")], &HashMap::new());

        assert_eq!(changes.to_delete, vec![gone]);
    }

    #[test]
    fn full_sync_keeps_never_uploaded_notes() {
        let pending = Note::new(NoteContent::text("draft"));
        let changes = compute_full::<RemoteNote>(&[pending], &[], &HashMap::new());
        assert!(changes.is_empty());
    }

    #[test]
    fn changed_key_replaces_with_captured_revision() {
        let mut locals: Vec<Note> = Vec::new();
        let initial = compute_full(&locals, &[remote("1", "a", "one")], &HashMap::new());
        apply(&mut locals, initial);
        let local_id = locals[0].local_id.clone();
        let captured = HashMap::from([(local_id.clone(), 7)]);

        let changes = compute_full(&locals, &[remote("1", "b", "edited")], &captured);

        assert_eq!(changes.to_replace.len(), 1);
        let replacement = &changes.to_replace[0];
        assert_eq!(replacement.base_revision, 7);
        assert_eq!(replacement.entity.local_id, local_id);
        assert_eq!(replacement.entity.content.text, "edited");
    }

    #[test]
    fn created_with_marker_matches_unacknowledged_create() {
        let local = Note::new(NoteContent::text("mine"));
        let mut echoed = remote("9", "a", "mine");
        echoed.created_with_local_id = Some(local.local_id.clone());

        let changes = compute_full(&[local.clone()], &[echoed], &HashMap::new());

        assert!(changes.to_create.is_empty());
        assert_eq!(changes.to_replace.len(), 1);
        assert_eq!(changes.to_replace[0].entity.local_id, local.local_id);
        assert_eq!(
            changes.to_replace[0].entity.remote_id(),
            Some(&RemoteId::new("9"))
        );
    }

    // ===========================================
    // Delta Sync Tests
    // ===========================================

    #[test]
    fn delta_never_deletes_by_absence() {
        let mut locals: Vec<Note> = Vec::new();
        let initial = compute_full(
            &locals,
            &[remote("1", "a", "one"), remote("2", "b", "two")],
            &HashMap::new(),
        );
        apply(&mut locals, initial);

        let changes = compute_delta(&locals, &[remote("1", "c", "new")], &[], &HashMap::new());

        assert!(changes.to_delete.is_empty());
        assert_eq!(changes.to_replace.len(), 1);
    }

    #[test]
    fn delta_deletes_by_marker() {
        let mut locals: Vec<Note> = Vec::new();
        let initial = compute_full(&locals, &[remote("1", "a", "one")], &HashMap::new());
        apply(&mut locals, initial);

        let changes = compute_delta::<RemoteNote>(
            &locals,
            &[],
            &[RemoteId::new("1"), RemoteId::new("unknown")],
            &HashMap::new(),
        );

        assert_eq!(changes.to_delete, vec![locals[0].local_id.clone()]);
    }

    #[test]
    fn compute_dispatches_on_payload_shape() {
        let delta = SyncDelta::Delta {
            upserts: vec![remote("1", "a", "one")],
            deleted: vec![],
        };
        let changes = compute(&[], &delta, &HashMap::new());
        assert_eq!(changes.to_create.len(), 1);
    }

    // ===========================================
    // Size Policy Tests
    // ===========================================

    #[test]
    fn oversized_entities_are_filtered() {
        let mut changes = compute_full::<RemoteNote>(
            &[],
            &[remote("1", "a", "small"), remote("2", "b", &"x".repeat(64))],
            &HashMap::new(),
        );

        let skipped = changes.filter_oversized(16);

        assert_eq!(skipped.len(), 1);
        assert_eq!(changes.to_create.len(), 1);
        assert_eq!(changes.to_create[0].content.text, "small");
    }

    // ===========================================
    // Note Reference Tests
    // ===========================================

    #[test]
    fn note_references_reconcile() {
        let reference = RemoteNoteReference {
            id: RemoteId::new("p1"),
            change_key: "a".into(),
            created_with_local_id: None,
            title: "Page".into(),
            preview: "preview".into(),
            web_url: None,
            last_modified_at: 0,
        };

        let changes = compute_full(&[], &[reference.clone()], &HashMap::new());
        assert_eq!(changes.to_create.len(), 1);

        let locals = changes.to_create;
        let again = compute_full(&locals, &[reference], &HashMap::new());
        assert!(again.is_empty());
    }
}
