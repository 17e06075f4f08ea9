//! Priority queue of pending operations.
//!
//! This module provides the in-memory half of the durable queue:
//! - Priority classes (sync/read, then mutations, then media) with FIFO
//!   order inside a class
//! - Supersession: a newer intent for the same target collapses into the
//!   older unsent entry instead of stacking behind it
//! - In-flight tracking: at most one entry is being dispatched at a time and
//!   it is never rewritten or collapsed while the transport holds it
//!
//! Persistence is layered on top by sync-client; this type never does I/O.

use notesync_types::Operation;

/// Dispatch priority. Lower classes are dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PriorityClass {
    /// Sync and read operations.
    Sync,
    /// Note create/update/delete, and merge fetches.
    Mutation,
    /// Image upload/download/delete and alt text.
    Media,
}

impl PriorityClass {
    /// The class an operation is queued under.
    pub fn of(op: &Operation) -> Self {
        match op {
            Operation::Sync { .. } | Operation::FetchMeetingNotes => PriorityClass::Sync,
            Operation::CreateNote { .. }
            | Operation::UpdateNote { .. }
            | Operation::InvalidUpdateNote { .. }
            | Operation::DeleteNote { .. }
            | Operation::InvalidDeleteNote { .. }
            | Operation::GetNoteForMerge { .. } => PriorityClass::Mutation,
            Operation::UploadMedia { .. }
            | Operation::InvalidUploadMedia { .. }
            | Operation::DownloadMedia { .. }
            | Operation::InvalidDownloadMedia { .. }
            | Operation::DeleteMedia { .. }
            | Operation::InvalidDeleteMedia { .. }
            | Operation::UpdateMediaAltText { .. }
            | Operation::InvalidUpdateMediaAltText { .. } => PriorityClass::Media,
        }
    }
}

/// Stable handle to a queue entry, valid until the entry leaves the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(u64);

/// A queued operation with its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    /// Handle for in-flight tracking and replacement.
    pub id: EntryId,
    /// Priority class of `operation`.
    pub priority: PriorityClass,
    /// Position inside the class; front insertions go negative.
    order: i64,
    /// The operation.
    pub operation: Operation,
}

/// What `push` did with an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Appended as a new entry.
    Inserted(EntryId),
    /// Folded into an existing unsent entry, which keeps its position.
    Superseded(EntryId),
    /// Cancelled out an unsent entry (e.g. delete of a never-sent create);
    /// nothing was inserted.
    Annihilated,
    /// An identical unsent entry is already queued.
    Duplicate(EntryId),
}

/// Ordered, deduplicating queue of pending operations.
///
/// Entries flow through the queue in this order:
/// 1. `push()` - insert (or collapse into an existing entry)
/// 2. `begin()` - mark the head dispatchable entry in flight
/// 3. `complete()` / `release()` / `replace()` - settle the in-flight entry
#[derive(Debug, Default)]
pub struct PriorityQueue {
    /// Sorted by (priority, order).
    entries: Vec<QueueEntry>,
    next_back: i64,
    next_front: i64,
    next_id: u64,
    in_flight: Option<EntryId>,
}

impl PriorityQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            next_front: -1,
            ..Self::default()
        }
    }

    /// Rebuild a queue from persisted operations, preserving their order.
    ///
    /// No supersession is applied: the mirror already holds the collapsed
    /// queue as it was.
    pub fn from_operations(operations: impl IntoIterator<Item = Operation>) -> Self {
        let mut queue = Self::new();
        for op in operations {
            queue.insert_back(op);
        }
        queue
    }

    /// Insert an operation, collapsing it into unsent entries for the same target.
    pub fn push(&mut self, op: Operation) -> PushOutcome {
        if let Some(existing) = self.unsent().find(|e| e.operation == op) {
            return PushOutcome::Duplicate(existing.id);
        }

        match &op {
            Operation::UpdateNote { note } | Operation::InvalidUpdateNote { note } => {
                let target = note.local_id.clone();
                let found = self.unsent_position(|o| match o {
                    Operation::UpdateNote { note } | Operation::InvalidUpdateNote { note } => {
                        note.local_id == target
                    }
                    _ => false,
                });
                if let Some(index) = found {
                    self.entries[index].operation = op;
                    return PushOutcome::Superseded(self.entries[index].id);
                }
                let pending_create = self.unsent_position(
                    |o| matches!(o, Operation::CreateNote { note } if note.local_id == target),
                );
                if let Some(index) = pending_create {
                    // The create has not left the device: send the newest content with it.
                    if let Operation::UpdateNote { note } | Operation::InvalidUpdateNote { note } = op {
                        self.entries[index].operation = Operation::CreateNote { note };
                    }
                    return PushOutcome::Superseded(self.entries[index].id);
                }
            }
            Operation::DeleteNote { local_id, .. } | Operation::InvalidDeleteNote { local_id } => {
                let target = local_id.clone();
                let in_flight_for_note = self
                    .in_flight_entry()
                    .is_some_and(|e| e.operation.note_local_id() == Some(&target));
                let before = self.entries.len();
                let mut dropped_create = false;
                let in_flight = self.in_flight;
                self.entries.retain(|e| {
                    let doomed = Some(e.id) != in_flight
                        && e.operation.note_local_id() == Some(&target);
                    if doomed && matches!(e.operation, Operation::CreateNote { .. }) {
                        dropped_create = true;
                    }
                    !doomed
                });
                if dropped_create && !in_flight_for_note && before != self.entries.len() {
                    return PushOutcome::Annihilated;
                }
            }
            Operation::Sync { kind, .. } => {
                let kind = *kind;
                let found =
                    self.unsent_position(|o| matches!(o, Operation::Sync { kind: k, .. } if *k == kind));
                if let Some(index) = found {
                    self.entries[index].operation = op;
                    return PushOutcome::Superseded(self.entries[index].id);
                }
            }
            Operation::UpdateMediaAltText { media_local_id, .. }
            | Operation::InvalidUpdateMediaAltText { media_local_id, .. } => {
                let target = media_local_id.clone();
                let found = self.unsent_position(|o| {
                    matches!(
                        o,
                        Operation::UpdateMediaAltText { .. } | Operation::InvalidUpdateMediaAltText { .. }
                    ) && o.media_local_id() == Some(&target)
                });
                if let Some(index) = found {
                    self.entries[index].operation = op;
                    return PushOutcome::Superseded(self.entries[index].id);
                }
            }
            Operation::DeleteMedia { media_local_id, .. }
            | Operation::InvalidDeleteMedia { media_local_id, .. } => {
                let target = media_local_id.clone();
                let in_flight = self.in_flight;
                let mut dropped_upload = false;
                self.entries.retain(|e| {
                    let doomed =
                        Some(e.id) != in_flight && e.operation.media_local_id() == Some(&target);
                    if doomed
                        && matches!(
                            e.operation,
                            Operation::UploadMedia { .. } | Operation::InvalidUploadMedia { .. }
                        )
                    {
                        dropped_upload = true;
                    }
                    !doomed
                });
                if dropped_upload {
                    return PushOutcome::Annihilated;
                }
            }
            _ => {}
        }

        PushOutcome::Inserted(self.insert_back(op))
    }

    /// Insert at the front of the operation's priority class.
    pub fn push_front(&mut self, op: Operation) -> EntryId {
        let order = self.next_front;
        self.next_front -= 1;
        self.insert(op, order)
    }

    /// The highest-priority entry, dispatchable or not.
    pub fn peek(&self) -> Option<&QueueEntry> {
        self.entries.first()
    }

    /// Remove and return the highest-priority entry.
    pub fn pop(&mut self) -> Option<QueueEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let entry = self.entries.remove(0);
        if self.in_flight == Some(entry.id) {
            self.in_flight = None;
        }
        Some(entry)
    }

    /// The first entry that may be handed to the transport: valid and not
    /// already in flight. `None` while another entry is in flight.
    pub fn next_dispatchable(&self) -> Option<&QueueEntry> {
        if self.in_flight.is_some() {
            return None;
        }
        self.entries.iter().find(|e| e.operation.is_valid())
    }

    /// Mark an entry in flight. Fails if another entry already is.
    pub fn begin(&mut self, id: EntryId) -> bool {
        if self.in_flight.is_some() || self.get(id).is_none() {
            return false;
        }
        self.in_flight = Some(id);
        true
    }

    /// The entry currently being dispatched.
    pub fn in_flight_entry(&self) -> Option<&QueueEntry> {
        self.in_flight.and_then(|id| self.get(id))
    }

    /// Remove a settled entry. Clears in-flight if it was the one.
    pub fn complete(&mut self, id: EntryId) -> Option<QueueEntry> {
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
        let index = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(index))
    }

    /// Return an in-flight entry to the queue untouched, for a later retry.
    pub fn release(&mut self, id: EntryId) {
        if self.in_flight == Some(id) {
            self.in_flight = None;
        }
    }

    /// Swap an entry for a different operation at the front of that
    /// operation's class. Queue length is unchanged.
    pub fn replace(&mut self, id: EntryId, op: Operation) -> Option<EntryId> {
        self.complete(id)?;
        Some(self.push_front(op))
    }

    /// Remove every entry matching `predicate`, in flight or not.
    pub fn remove<F>(&mut self, mut predicate: F) -> usize
    where
        F: FnMut(&Operation) -> bool,
    {
        let before = self.entries.len();
        let in_flight = self.in_flight;
        let mut removed_in_flight = false;
        self.entries.retain(|e| {
            let remove = predicate(&e.operation);
            if remove && Some(e.id) == in_flight {
                removed_in_flight = true;
            }
            !remove
        });
        if removed_in_flight {
            self.in_flight = None;
        }
        before - self.entries.len()
    }

    /// Rewrite unsent entries. `transform` returns `Some(new)` to replace an
    /// operation or `None` to leave it. Returns the number rewritten.
    pub fn map<F>(&mut self, mut transform: F) -> usize
    where
        F: FnMut(&Operation) -> Option<Operation>,
    {
        let in_flight = self.in_flight;
        let mut rewritten = 0;
        for entry in self.entries.iter_mut().filter(|e| Some(e.id) != in_flight) {
            if let Some(op) = transform(&entry.operation) {
                entry.priority = PriorityClass::of(&op);
                entry.operation = op;
                rewritten += 1;
            }
        }
        if rewritten > 0 {
            self.sort();
        }
        rewritten
    }

    /// Number of entries, including the in-flight one.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    /// Snapshot of the operations in dispatch order, for persistence.
    pub fn operations(&self) -> Vec<Operation> {
        self.entries.iter().map(|e| e.operation.clone()).collect()
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.in_flight = None;
    }

    fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    fn unsent(&self) -> impl Iterator<Item = &QueueEntry> {
        let in_flight = self.in_flight;
        self.entries.iter().filter(move |e| Some(e.id) != in_flight)
    }

    fn unsent_position<F>(&self, predicate: F) -> Option<usize>
    where
        F: Fn(&Operation) -> bool,
    {
        self.entries
            .iter()
            .position(|e| Some(e.id) != self.in_flight && predicate(&e.operation))
    }

    fn insert_back(&mut self, op: Operation) -> EntryId {
        let order = self.next_back;
        self.next_back += 1;
        self.insert(op, order)
    }

    fn insert(&mut self, op: Operation, order: i64) -> EntryId {
        let id = EntryId(self.next_id);
        self.next_id += 1;
        let priority = PriorityClass::of(&op);
        let index = self
            .entries
            .partition_point(|e| (e.priority, e.order) < (priority, order));
        self.entries.insert(
            index,
            QueueEntry {
                id,
                priority,
                order,
                operation: op,
            },
        );
        id
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(|e| (e.priority, e.order));
    }
}
