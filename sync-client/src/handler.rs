//! Response event handler.
//!
//! Turns successful transport results into store updates:
//! - sync payloads are reconciled into change sets (full or delta) and the
//!   continuation token is committed only after the store accepted them
//! - create/update/merge-fetch responses go through per-note conflict
//!   resolution, with a three-way merge when a local edit raced the request
//! - media responses patch the owning note
//!
//! The handler also reports what the dispatcher must do to the rest of the
//! queue: rewrite `Invalid*` operations that just learned a remote id, and
//! enqueue follow-ups (the merged note, media downloads).

use notesync_core::conflict::{self, Resolution, Sent};
use notesync_core::reconcile::{self, CapturedRevisions};
use notesync_core::{ChangeSet, Replacement};
use notesync_types::{
    AccountId, DeltaToken, DeltaTokens, LocalId, Note, Operation, RemoteData, RemoteId,
    ResourceKind, ResponseEvent,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::merge::{MergeError, MergeOutcome, MergeStrategy};
use crate::store::{LocalStore, StoreError};

/// Handler errors.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Merge error.
    #[error("merge error: {0}")]
    Merge(#[from] MergeError),

    /// The transport answered an operation with an unrelated event.
    #[error("{event} is not a response to {operation}")]
    Mismatch {
        /// Operation name.
        operation: &'static str,
        /// Event name.
        event: &'static str,
    },
}

/// A queue rewrite made possible by a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewrite {
    /// A note learned (or refreshed) its service state.
    Note {
        /// The note.
        local_id: LocalId,
        /// Its service state.
        remote: RemoteData,
    },
    /// An image learned its service id.
    Media {
        /// The image.
        media_local_id: LocalId,
        /// Its service id.
        media_remote_id: RemoteId,
    },
}

impl Rewrite {
    /// The rewritten form of `op`, or `None` if unaffected.
    pub fn apply(&self, op: &Operation) -> Option<Operation> {
        match self {
            Rewrite::Note { local_id, remote } => op.resolve_note(local_id, remote),
            Rewrite::Media {
                media_local_id,
                media_remote_id,
            } => op.resolve_media(media_local_id, media_remote_id),
        }
    }
}

/// What a handled response means for the queue and for observers.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    /// Rewrites to apply to queued operations.
    pub rewrites: Vec<Rewrite>,
    /// Operations to enqueue.
    pub follow_ups: Vec<Operation>,
    /// Collections whose local contents changed.
    pub changed: Vec<ResourceKind>,
}

impl HandlerOutcome {
    fn changed(&mut self, kind: ResourceKind) {
        if !self.changed.contains(&kind) {
            self.changed.push(kind);
        }
    }
}

/// Response event handler for one account.
pub struct ResponseHandler {
    account: AccountId,
    store: Arc<dyn LocalStore>,
    merge: Arc<dyn MergeStrategy>,
    max_entity_bytes: usize,
    tokens: Mutex<DeltaTokens>,
    captured: Mutex<HashMap<ResourceKind, CapturedRevisions>>,
    active: AtomicBool,
}

impl std::fmt::Debug for ResponseHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseHandler")
            .field("account", &self.account)
            .field("max_entity_bytes", &self.max_entity_bytes)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl ResponseHandler {
    /// Create a handler. Tokens start empty until [`load_tokens`](Self::load_tokens).
    pub fn new(
        account: AccountId,
        store: Arc<dyn LocalStore>,
        merge: Arc<dyn MergeStrategy>,
        max_entity_bytes: usize,
    ) -> Self {
        Self {
            account,
            store,
            merge,
            max_entity_bytes,
            tokens: Mutex::new(DeltaTokens::default()),
            captured: Mutex::new(HashMap::new()),
            active: AtomicBool::new(true),
        }
    }

    /// The account this handler serves.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    fn tokens_lock(&self) -> MutexGuard<'_, DeltaTokens> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn captured_lock(&self) -> MutexGuard<'_, HashMap<ResourceKind, CapturedRevisions>> {
        self.captured.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read persisted continuation tokens from the store.
    pub async fn load_tokens(&self) -> Result<(), HandlerError> {
        let tokens = self.store.load_tokens(&self.account).await?;
        tracing::debug!(account = %self.account, "Loaded tokens: {:?}", tokens);
        *self.tokens_lock() = tokens;
        Ok(())
    }

    /// Current token for `kind`.
    pub fn token(&self, kind: ResourceKind) -> Option<DeltaToken> {
        self.tokens_lock().get(kind).cloned()
    }

    /// All current tokens.
    pub fn tokens(&self) -> DeltaTokens {
        self.tokens_lock().clone()
    }

    /// Record local revisions of `kind` before a sync request goes out.
    pub async fn capture_revisions(&self, kind: ResourceKind) -> Result<(), HandlerError> {
        let revisions: CapturedRevisions = match kind {
            ResourceKind::Notes | ResourceKind::SecondaryNotes => self
                .store
                .notes(&self.account, kind)
                .await?
                .into_iter()
                .map(|n| (n.local_id, n.local_revision))
                .collect(),
            ResourceKind::NoteReferences => self
                .store
                .note_references(&self.account)
                .await?
                .into_iter()
                .map(|r| (r.local_id, r.local_revision))
                .collect(),
            ResourceKind::MeetingNotes => return Ok(()),
        };
        self.captured_lock().insert(kind, revisions);
        Ok(())
    }

    /// Record the revision of a note about to be sent.
    pub async fn record_pre_send(&self, note: &Note) -> Result<(), HandlerError> {
        self.store
            .record_pre_send_revision(&self.account, &note.local_id, note.local_revision)
            .await?;
        Ok(())
    }

    /// Forget the token for `kind` and every cached revision, so the next
    /// sync for `kind` is a full one.
    pub async fn reset_cache(&self, kind: ResourceKind) -> Result<(), HandlerError> {
        let tokens = {
            let mut tokens = self.tokens_lock();
            tokens.set(kind, None);
            tokens.clone()
        };
        self.captured_lock().clear();
        self.store.save_tokens(&self.account, &tokens).await?;
        self.store.clear_pre_send_revisions(&self.account).await?;
        tracing::info!(account = %self.account, "Cache reset for {}", kind);
        Ok(())
    }

    /// Stop accepting responses. Results arriving afterwards are dropped.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Whether responses are still accepted.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Forget tokens and cached revisions, and clear the account's store.
    pub async fn clear(&self) -> Result<(), HandlerError> {
        self.tokens_lock().clear();
        self.captured_lock().clear();
        self.store.clear_account(&self.account).await?;
        Ok(())
    }

    /// Handle the successful result of `op`.
    pub async fn handle(
        &self,
        op: &Operation,
        event: ResponseEvent,
    ) -> Result<HandlerOutcome, HandlerError> {
        let mut outcome = HandlerOutcome::default();
        if !self.is_active() {
            tracing::debug!(account = %self.account, "Dropping {} after sign-out", event.name());
            return Ok(outcome);
        }

        let mismatch = HandlerError::Mismatch {
            operation: op.name(),
            event: event.name(),
        };

        match event {
            ResponseEvent::NoteCreated { local_id, remote }
            | ResponseEvent::NoteUpdated { local_id, remote } => {
                let snapshot = op.sends_note_snapshot().ok_or(mismatch)?;
                let pre_send_revision = self.store.pre_send_revision(&self.account, &local_id).await?;
                let current = self.store.note(&self.account, &local_id).await?;
                let resolution = conflict::resolve(
                    current.as_ref(),
                    Sent::Write {
                        snapshot,
                        pre_send_revision,
                    },
                    &remote,
                );
                self.settle(resolution, &mut outcome).await?;
                outcome.rewrites.push(Rewrite::Note {
                    local_id,
                    remote: remote.remote_data(),
                });
            }
            ResponseEvent::NoteFetchedForMerge { local_id, remote } => {
                let Operation::GetNoteForMerge { note: snapshot } = op else {
                    return Err(mismatch);
                };
                let current = self.store.note(&self.account, &local_id).await?;
                let resolution =
                    conflict::resolve(current.as_ref(), Sent::MergeFetch { snapshot }, &remote);
                self.settle(resolution, &mut outcome).await?;
                outcome.rewrites.push(Rewrite::Note {
                    local_id,
                    remote: remote.remote_data(),
                });
            }
            ResponseEvent::NoteDeleted { local_id } => {
                let changes = ChangeSet {
                    to_delete: vec![local_id],
                    ..ChangeSet::default()
                };
                self.store
                    .apply_note_changes(&self.account, ResourceKind::Notes, changes)
                    .await?;
                outcome.changed(ResourceKind::Notes);
            }
            ResponseEvent::MediaUploaded {
                note_local_id,
                media_local_id,
                media_remote_id,
                change_key,
            } => {
                let remote_id = media_remote_id.clone();
                let target = media_local_id.clone();
                self.patch_note(&note_local_id, &change_key, &mut outcome, |note| {
                    if let Some(media) = note.content.media_mut(&target) {
                        media.remote_id = Some(remote_id);
                    }
                })
                .await?;
                outcome.rewrites.push(Rewrite::Media {
                    media_local_id,
                    media_remote_id,
                });
            }
            ResponseEvent::MediaDownloaded {
                note_local_id,
                media_remote_id,
                local_url,
            } => {
                let Some(mut note) = self.store.note(&self.account, &note_local_id).await? else {
                    return Ok(outcome);
                };
                let base_revision = note.local_revision;
                if let Some(media) = note
                    .content
                    .media
                    .iter_mut()
                    .find(|m| m.remote_id.as_ref() == Some(&media_remote_id))
                {
                    media.local_url = Some(local_url);
                }
                self.replace_note(note, base_revision).await?;
                outcome.changed(ResourceKind::Notes);
            }
            ResponseEvent::MediaDeleted {
                note_local_id,
                change_key,
                ..
            }
            | ResponseEvent::MediaAltTextUpdated {
                note_local_id,
                change_key,
                ..
            } => {
                self.patch_note(&note_local_id, &change_key, &mut outcome, |_| {})
                    .await?;
            }
            ResponseEvent::NotesSynced { kind, token, delta } => {
                if !matches!(op, Operation::Sync { kind: k, .. } if *k == kind) {
                    return Err(mismatch);
                }
                let locals = self.store.notes(&self.account, kind).await?;
                let captured = self.take_captured(kind);
                let mut changes = reconcile::compute(&locals, &delta, &captured);
                self.filter_oversized(kind, &mut changes);
                let applied = changes.len();
                outcome.follow_ups.extend(missing_media_downloads(&changes));
                self.store.apply_note_changes(&self.account, kind, changes).await?;
                self.commit_token(kind, token).await?;
                tracing::info!(
                    account = %self.account,
                    "Synced {} ({}): {} changes",
                    kind,
                    if delta.is_full() { "full" } else { "delta" },
                    applied
                );
                if applied > 0 {
                    outcome.changed(kind);
                }
            }
            ResponseEvent::NoteReferencesSynced { token, delta } => {
                let kind = ResourceKind::NoteReferences;
                let locals = self.store.note_references(&self.account).await?;
                let captured = self.take_captured(kind);
                let mut changes = reconcile::compute(&locals, &delta, &captured);
                self.filter_oversized(kind, &mut changes);
                let applied = changes.len();
                self.store
                    .apply_note_reference_changes(&self.account, changes)
                    .await?;
                self.commit_token(kind, token).await?;
                tracing::info!(account = %self.account, "Synced {}: {} changes", kind, applied);
                if applied > 0 {
                    outcome.changed(kind);
                }
            }
            ResponseEvent::MeetingNotesFetched { notes } => {
                tracing::info!(account = %self.account, "Fetched {} meeting notes", notes.len());
                self.store.replace_meeting_notes(&self.account, notes).await?;
                outcome.changed(ResourceKind::MeetingNotes);
            }
        }
        Ok(outcome)
    }

    async fn settle(
        &self,
        resolution: Resolution,
        outcome: &mut HandlerOutcome,
    ) -> Result<(), HandlerError> {
        match resolution {
            Resolution::ApplyRemote(note) => {
                let base_revision = note.local_revision;
                self.replace_note(note, base_revision).await?;
            }
            Resolution::Merge(request) => {
                let base_revision = request.local.local_revision;
                let merged = self.merge.merge(
                    &request.base,
                    &request.local.content,
                    &request.remote.content,
                )?;
                match merged {
                    MergeOutcome::Merged(content) if content == request.remote.content => {
                        self.replace_note(request.remote_wins(), base_revision).await?;
                    }
                    MergeOutcome::Merged(content) => {
                        let note = request.merged(content);
                        tracing::debug!(account = %self.account, "Merged note {}", note.local_id);
                        self.replace_note(note.clone(), base_revision).await?;
                        outcome.follow_ups.push(Operation::update_note(note));
                    }
                    MergeOutcome::Incompatible => {
                        tracing::info!(
                            account = %self.account,
                            "Note {} cannot be merged, keeping remote version",
                            request.local.local_id
                        );
                        self.replace_note(request.remote_wins(), base_revision).await?;
                    }
                }
            }
            Resolution::Missing => return Ok(()),
        }
        outcome.changed(ResourceKind::Notes);
        Ok(())
    }

    /// Update a note's change key (and anything else `edit` touches) after a
    /// media response.
    async fn patch_note<F>(
        &self,
        note_local_id: &LocalId,
        change_key: &str,
        outcome: &mut HandlerOutcome,
        edit: F,
    ) -> Result<(), HandlerError>
    where
        F: FnOnce(&mut Note) + Send,
    {
        let Some(mut note) = self.store.note(&self.account, note_local_id).await? else {
            return Ok(());
        };
        let base_revision = note.local_revision;
        edit(&mut note);
        if let Some(remote) = note.remote_data.as_mut() {
            remote.change_key = change_key.to_string();
        }
        if let Some(remote) = note.remote_data.clone() {
            outcome.rewrites.push(Rewrite::Note {
                local_id: note.local_id.clone(),
                remote,
            });
        }
        self.replace_note(note, base_revision).await?;
        outcome.changed(ResourceKind::Notes);
        Ok(())
    }

    async fn replace_note(&self, note: Note, base_revision: u64) -> Result<(), HandlerError> {
        let changes = ChangeSet {
            to_replace: vec![Replacement {
                base_revision,
                entity: note,
            }],
            ..ChangeSet::default()
        };
        self.store
            .apply_note_changes(&self.account, ResourceKind::Notes, changes)
            .await?;
        Ok(())
    }

    fn take_captured(&self, kind: ResourceKind) -> CapturedRevisions {
        self.captured_lock().remove(&kind).unwrap_or_default()
    }

    fn filter_oversized<L: notesync_core::LocalEntity>(&self, kind: ResourceKind, changes: &mut ChangeSet<L>) {
        let skipped = changes.filter_oversized(self.max_entity_bytes);
        if !skipped.is_empty() {
            tracing::warn!(
                account = %self.account,
                "Skipped {} {} over {} bytes",
                skipped.len(),
                kind,
                self.max_entity_bytes
            );
        }
    }

    async fn commit_token(&self, kind: ResourceKind, token: DeltaToken) -> Result<(), HandlerError> {
        let tokens = {
            let mut tokens = self.tokens_lock();
            tokens.set(kind, Some(token));
            tokens.clone()
        };
        self.store.save_tokens(&self.account, &tokens).await?;
        Ok(())
    }
}

/// Downloads for images that arrived with a note but have no local file.
fn missing_media_downloads(changes: &ChangeSet<Note>) -> Vec<Operation> {
    let created = changes.to_create.iter();
    let replaced = changes.to_replace.iter().map(|r| &r.entity);
    created
        .chain(replaced)
        .filter_map(|note| note.remote_id().map(|remote_id| (note, remote_id)))
        .flat_map(|(note, note_remote_id)| {
            note.content
                .media
                .iter()
                .filter(|m| m.local_url.is_none())
                .filter_map(move |m| {
                    m.remote_id.as_ref().map(|media_remote_id| Operation::DownloadMedia {
                        note_local_id: note.local_id.clone(),
                        note_remote_id: note_remote_id.clone(),
                        media_remote_id: media_remote_id.clone(),
                        mime_type: m.mime_type.clone(),
                    })
                })
        })
        .collect()
}
