//! In-memory [`LocalStore`], for tests and tooling.

use super::{LocalStore, StoreError};
use async_trait::async_trait;
use notesync_core::{ChangeSet, LocalEntity};
use notesync_types::{
    AccountId, DeltaTokens, LocalId, MeetingNote, Note, NoteReference, ResourceKind,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, PoisonError};

/// In-memory store. Clones share state.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    accounts: Arc<RwLock<HashMap<AccountId, AccountRecord>>>,
    fail_writes: Arc<AtomicBool>,
}

#[derive(Debug, Default, Clone)]
struct AccountRecord {
    notes: HashMap<ResourceKind, Vec<Note>>,
    references: Vec<NoteReference>,
    meeting_notes: Vec<MeetingNote>,
    tokens: DeltaTokens,
    pre_send: HashMap<LocalId, u64>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<AccountId, AccountRecord>> {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<AccountId, AccountRecord>>, StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".into()));
        }
        Ok(self.accounts.write().unwrap_or_else(PoisonError::into_inner))
    }

    /// Make every subsequent write fail (or succeed again).
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert or overwrite a note, as a local edit would.
    pub fn put_note(&self, account: &AccountId, kind: ResourceKind, note: Note) {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        let notes = accounts
            .entry(account.clone())
            .or_default()
            .notes
            .entry(kind)
            .or_default();
        match notes.iter_mut().find(|n| n.local_id == note.local_id) {
            Some(slot) => *slot = note,
            None => notes.push(note),
        }
    }

    /// Remove a note, as a local delete would.
    pub fn remove_note(&self, account: &AccountId, local_id: &LocalId) {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = accounts.get_mut(account) {
            for notes in record.notes.values_mut() {
                notes.retain(|n| &n.local_id != local_id);
            }
        }
    }

    /// Whether anything is held for `account`.
    pub fn has_account(&self, account: &AccountId) -> bool {
        self.read().contains_key(account)
    }
}

fn check_note_kind(kind: ResourceKind) -> Result<(), StoreError> {
    if kind.holds_notes() {
        Ok(())
    } else {
        Err(StoreError::WrongKind(kind))
    }
}

/// Apply a change set to a collection; `refresh` merges remote state into a
/// locally edited entity whose revision moved past the replacement's base.
fn apply_changes<L, F>(entities: &mut Vec<L>, changes: ChangeSet<L>, refresh: F)
where
    L: LocalEntity,
    F: Fn(&mut L, L),
{
    entities.retain(|e| !changes.to_delete.contains(e.local_id()));
    for replacement in changes.to_replace {
        let Some(slot) = entities
            .iter_mut()
            .find(|e| e.local_id() == replacement.entity.local_id())
        else {
            continue;
        };
        if slot.local_revision() == replacement.base_revision {
            *slot = replacement.entity;
        } else {
            refresh(slot, replacement.entity);
        }
    }
    for created in changes.to_create {
        if !entities.iter().any(|e| e.local_id() == created.local_id()) {
            entities.push(created);
        }
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn notes(&self, account: &AccountId, kind: ResourceKind) -> Result<Vec<Note>, StoreError> {
        check_note_kind(kind)?;
        Ok(self
            .read()
            .get(account)
            .and_then(|r| r.notes.get(&kind))
            .cloned()
            .unwrap_or_default())
    }

    async fn note(&self, account: &AccountId, local_id: &LocalId) -> Result<Option<Note>, StoreError> {
        Ok(self.read().get(account).and_then(|r| {
            r.notes
                .values()
                .flat_map(|notes| notes.iter())
                .find(|n| &n.local_id == local_id)
                .cloned()
        }))
    }

    async fn apply_note_changes(
        &self,
        account: &AccountId,
        kind: ResourceKind,
        changes: ChangeSet<Note>,
    ) -> Result<(), StoreError> {
        check_note_kind(kind)?;
        let mut accounts = self.write()?;
        let notes = accounts
            .entry(account.clone())
            .or_default()
            .notes
            .entry(kind)
            .or_default();
        apply_changes(notes, changes, |local, remote| {
            local.remote_data = remote.remote_data;
        });
        Ok(())
    }

    async fn note_references(&self, account: &AccountId) -> Result<Vec<NoteReference>, StoreError> {
        Ok(self
            .read()
            .get(account)
            .map(|r| r.references.clone())
            .unwrap_or_default())
    }

    async fn apply_note_reference_changes(
        &self,
        account: &AccountId,
        changes: ChangeSet<NoteReference>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.write()?;
        let references = &mut accounts.entry(account.clone()).or_default().references;
        apply_changes(references, changes, |local, remote| {
            local.remote_id = remote.remote_id;
            local.change_key = remote.change_key;
        });
        Ok(())
    }

    async fn meeting_notes(&self, account: &AccountId) -> Result<Vec<MeetingNote>, StoreError> {
        Ok(self
            .read()
            .get(account)
            .map(|r| r.meeting_notes.clone())
            .unwrap_or_default())
    }

    async fn replace_meeting_notes(
        &self,
        account: &AccountId,
        notes: Vec<MeetingNote>,
    ) -> Result<(), StoreError> {
        self.write()?.entry(account.clone()).or_default().meeting_notes = notes;
        Ok(())
    }

    async fn load_tokens(&self, account: &AccountId) -> Result<DeltaTokens, StoreError> {
        Ok(self
            .read()
            .get(account)
            .map(|r| r.tokens.clone())
            .unwrap_or_default())
    }

    async fn save_tokens(&self, account: &AccountId, tokens: &DeltaTokens) -> Result<(), StoreError> {
        self.write()?.entry(account.clone()).or_default().tokens = tokens.clone();
        Ok(())
    }

    async fn pre_send_revision(
        &self,
        account: &AccountId,
        local_id: &LocalId,
    ) -> Result<Option<u64>, StoreError> {
        Ok(self
            .read()
            .get(account)
            .and_then(|r| r.pre_send.get(local_id).copied()))
    }

    async fn record_pre_send_revision(
        &self,
        account: &AccountId,
        local_id: &LocalId,
        revision: u64,
    ) -> Result<(), StoreError> {
        self.write()?
            .entry(account.clone())
            .or_default()
            .pre_send
            .insert(local_id.clone(), revision);
        Ok(())
    }

    async fn clear_pre_send_revisions(&self, account: &AccountId) -> Result<(), StoreError> {
        if let Some(record) = self.write()?.get_mut(account) {
            record.pre_send.clear();
        }
        Ok(())
    }

    async fn clear_account(&self, account: &AccountId) -> Result<(), StoreError> {
        self.write()?.remove(account);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::Replacement;
    use notesync_types::{DeltaToken, NoteContent, RemoteData, RemoteId};

    fn account() -> AccountId {
        AccountId::new("user@example.com")
    }

    fn synced(text: &str, change_key: &str) -> Note {
        let mut note = Note::new(NoteContent::text(text));
        note.remote_data = Some(RemoteData {
            id: RemoteId::new("r1"),
            change_key: change_key.into(),
            last_server_version: NoteContent::text(text),
            last_modified_at: 0,
        });
        note
    }

    #[tokio::test]
    async fn replacement_at_base_revision_overwrites() {
        let store = MemoryStore::new();
        let note = synced("old", "ck1");
        store.put_note(&account(), ResourceKind::Notes, note.clone());

        let mut newer = synced("new", "ck2");
        newer.local_id = note.local_id.clone();
        let changes = ChangeSet {
            to_replace: vec![Replacement {
                base_revision: note.local_revision,
                entity: newer,
            }],
            ..ChangeSet::default()
        };
        store
            .apply_note_changes(&account(), ResourceKind::Notes, changes)
            .await
            .unwrap();

        let stored = store.note(&account(), &note.local_id).await.unwrap().unwrap();
        assert_eq!(stored.content.text, "new");
    }

    #[tokio::test]
    async fn replacement_keeps_newer_local_edit() {
        let store = MemoryStore::new();
        let mut note = synced("old", "ck1");
        let base = note.local_revision;
        note.edit(NoteContent::text("edited during sync"));
        store.put_note(&account(), ResourceKind::Notes, note.clone());

        let mut newer = synced("remote", "ck2");
        newer.local_id = note.local_id.clone();
        let changes = ChangeSet {
            to_replace: vec![Replacement {
                base_revision: base,
                entity: newer,
            }],
            ..ChangeSet::default()
        };
        store
            .apply_note_changes(&account(), ResourceKind::Notes, changes)
            .await
            .unwrap();

        let stored = store.note(&account(), &note.local_id).await.unwrap().unwrap();
        assert_eq!(stored.content.text, "edited during sync");
        assert_eq!(stored.remote_data.unwrap().change_key, "ck2");
    }

    #[tokio::test]
    async fn tokens_round_trip_per_account() {
        let store = MemoryStore::new();
        let mut tokens = DeltaTokens::default();
        tokens.set(ResourceKind::Notes, Some(DeltaToken::new("T1")));

        store.save_tokens(&account(), &tokens).await.unwrap();

        assert_eq!(store.load_tokens(&account()).await.unwrap(), tokens);
        assert!(store
            .load_tokens(&AccountId::new("other"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn meeting_notes_kind_rejected_for_notes() {
        let store = MemoryStore::new();
        let result = store.notes(&account(), ResourceKind::MeetingNotes).await;
        assert!(matches!(result, Err(StoreError::WrongKind(_))));
    }

    #[tokio::test]
    async fn failing_writes_surface_errors() {
        let store = MemoryStore::new();
        store.fail_writes(true);

        let result = store.save_tokens(&account(), &DeltaTokens::default()).await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn clear_account_forgets_everything() {
        let store = MemoryStore::new();
        store.put_note(&account(), ResourceKind::Notes, synced("a", "ck"));
        store
            .record_pre_send_revision(&account(), &LocalId::new(), 3)
            .await
            .unwrap();

        store.clear_account(&account()).await.unwrap();

        assert!(!store.has_account(&account()));
    }
}
