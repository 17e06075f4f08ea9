//! Durable priority queue.
//!
//! Wraps [`PriorityQueue`] in a single critical section shared by the
//! enqueue path and the dispatcher, and mirrors it to disk after every
//! mutation. The in-memory queue is authoritative: a failed mirror write is
//! logged and otherwise ignored.

use notesync_core::{EntryId, PriorityQueue, PushOutcome, QueueEntry};
use notesync_types::Operation;
use tokio::sync::Mutex;

use crate::persist::{PersistError, QueueMirror};

/// An account's queue plus its on-disk mirror.
#[derive(Debug)]
pub struct DurableQueue {
    queue: Mutex<PriorityQueue>,
    mirror: Option<QueueMirror>,
}

impl DurableQueue {
    /// A queue that is never persisted.
    pub fn in_memory() -> Self {
        Self {
            queue: Mutex::new(PriorityQueue::new()),
            mirror: None,
        }
    }

    /// Rebuild a queue from its mirror.
    ///
    /// A missing mirror is an empty queue. An unreadable one is an error:
    /// silently starting empty would lose queued user changes.
    pub async fn open(mirror: QueueMirror) -> Result<Self, PersistError> {
        let loaded = mirror.load().await?;
        let restored = loaded.operations.len();
        if restored > 0 {
            tracing::info!(
                "Restored {} queued operations from {}",
                restored,
                mirror.path().display()
            );
        }
        let queue = Self {
            queue: Mutex::new(PriorityQueue::from_operations(loaded.operations)),
            mirror: Some(mirror),
        };
        if loaded.stored_version != notesync_core::CURRENT_SCHEMA_VERSION {
            let guard = queue.queue.lock().await;
            queue.persist(&guard).await;
            drop(guard);
        }
        Ok(queue)
    }

    /// Enqueue an operation.
    pub async fn push(&self, op: Operation) -> PushOutcome {
        let mut queue = self.queue.lock().await;
        let name = op.name();
        let outcome = queue.push(op);
        tracing::debug!("Queued {} ({:?}, {} pending)", name, outcome, queue.len());
        self.persist(&queue).await;
        outcome
    }

    /// Enqueue at the front of the operation's class.
    pub async fn push_front(&self, op: Operation) -> EntryId {
        let mut queue = self.queue.lock().await;
        let id = queue.push_front(op);
        self.persist(&queue).await;
        id
    }

    /// Take the next dispatchable entry and mark it in flight.
    pub async fn begin_next(&self) -> Option<QueueEntry> {
        let mut queue = self.queue.lock().await;
        let entry = queue.next_dispatchable()?.clone();
        queue.begin(entry.id).then_some(entry)
    }

    /// Remove a settled entry.
    pub async fn complete(&self, id: EntryId) -> Option<QueueEntry> {
        let mut queue = self.queue.lock().await;
        let removed = queue.complete(id);
        self.persist(&queue).await;
        removed
    }

    /// Return an in-flight entry for a later retry.
    pub async fn release(&self, id: EntryId) {
        self.queue.lock().await.release(id);
    }

    /// Swap an entry for `op` at the front of its class.
    pub async fn replace(&self, id: EntryId, op: Operation) -> Option<EntryId> {
        let mut queue = self.queue.lock().await;
        let replaced = queue.replace(id, op);
        self.persist(&queue).await;
        replaced
    }

    /// Remove entries matching `predicate`.
    pub async fn remove<F>(&self, predicate: F) -> usize
    where
        F: FnMut(&Operation) -> bool,
    {
        let mut queue = self.queue.lock().await;
        let removed = queue.remove(predicate);
        if removed > 0 {
            self.persist(&queue).await;
        }
        removed
    }

    /// Rewrite unsent entries.
    pub async fn map<F>(&self, transform: F) -> usize
    where
        F: FnMut(&Operation) -> Option<Operation>,
    {
        let mut queue = self.queue.lock().await;
        let rewritten = queue.map(transform);
        if rewritten > 0 {
            self.persist(&queue).await;
        }
        rewritten
    }

    /// Number of queued entries, including the in-flight one.
    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    /// Check if nothing is queued.
    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    /// Snapshot of queued operations in dispatch order.
    pub async fn operations(&self) -> Vec<Operation> {
        self.queue.lock().await.operations()
    }

    /// Empty the queue and delete its mirror.
    pub async fn clear(&self) {
        let mut queue = self.queue.lock().await;
        queue.clear();
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.remove().await {
                tracing::warn!("Failed to remove queue mirror: {}", e);
            }
        }
    }

    async fn persist(&self, queue: &PriorityQueue) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        if let Err(e) = mirror.save(&queue.operations()).await {
            tracing::warn!("Queue mirror write failed (continuing in memory): {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_types::{AccountId, Note, NoteContent, ResourceKind};
    use tempfile::TempDir;

    fn mirror_in(dir: &TempDir) -> QueueMirror {
        QueueMirror::for_account(dir.path(), &AccountId::new("a"))
    }

    #[tokio::test]
    async fn survives_restart() {
        let dir = TempDir::new().unwrap();
        let create = Operation::CreateNote {
            note: Note::new(NoteContent::text("hello")),
        };
        {
            let queue = DurableQueue::open(mirror_in(&dir)).await.unwrap();
            queue.push(create.clone()).await;
            queue.push(Operation::sync(ResourceKind::Notes, None)).await;
        }

        let reopened = DurableQueue::open(mirror_in(&dir)).await.unwrap();

        assert_eq!(
            reopened.operations().await,
            vec![Operation::sync(ResourceKind::Notes, None), create]
        );
    }

    #[tokio::test]
    async fn in_flight_entry_stays_queued_until_complete() {
        let dir = TempDir::new().unwrap();
        let queue = DurableQueue::open(mirror_in(&dir)).await.unwrap();
        queue.push(Operation::FetchMeetingNotes).await;

        let entry = queue.begin_next().await.unwrap();
        assert!(queue.begin_next().await.is_none());

        let reopened = DurableQueue::open(mirror_in(&dir)).await.unwrap();
        assert_eq!(reopened.len().await, 1);

        queue.complete(entry.id).await;
        let reopened = DurableQueue::open(mirror_in(&dir)).await.unwrap();
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn mirror_failure_keeps_memory_authoritative() {
        let dir = TempDir::new().unwrap();
        // A directory where the mirror file should be makes every write fail.
        let blocked = dir.path().join("blocked");
        std::fs::create_dir_all(blocked.join("queue.json")).unwrap();
        let queue = DurableQueue::open(QueueMirror::new(blocked.join("queue.json")))
            .await
            .err();
        assert!(queue.is_some());

        let queue = DurableQueue {
            queue: Mutex::new(PriorityQueue::new()),
            mirror: Some(QueueMirror::new(blocked.join("queue.json"))),
        };
        queue.push(Operation::FetchMeetingNotes).await;

        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn clear_removes_mirror() {
        let dir = TempDir::new().unwrap();
        let mirror = mirror_in(&dir);
        let queue = DurableQueue::open(mirror.clone()).await.unwrap();
        queue.push(Operation::FetchMeetingNotes).await;

        queue.clear().await;

        assert!(queue.is_empty().await);
        assert!(!mirror.path().exists());
    }

    #[tokio::test]
    async fn open_rewrites_old_schema() {
        let dir = TempDir::new().unwrap();
        let mirror = mirror_in(&dir);
        std::fs::write(
            mirror.path(),
            r#"{"schema_version": 2, "operations": [{"type": "fetch_meeting_notes"}]}"#,
        )
        .unwrap();

        DurableQueue::open(mirror.clone()).await.unwrap();

        let loaded = mirror.load().await.unwrap();
        assert_eq!(loaded.stored_version, notesync_core::CURRENT_SCHEMA_VERSION);
    }
}
