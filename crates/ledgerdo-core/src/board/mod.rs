//! The interface-facing task list and its speculative edits.
//!
//! [`TaskBoard`] starts from a reconstructed [`Snapshot`] and layers
//! optimistic edits on top. Every method is synchronous so an edit is
//! visible as soon as it is requested. The async side (submitting to the
//! ledger, refreshing) lives in [`crate::session`].
//!
//! # Invariants
//!
//! - A task id that a snapshot reported deleted, or whose removal the ledger
//!   confirmed, is tombstoned and never shown again.
//! - Per `(task, kind)` only the latest request decides the visible value.
//!   Answers to older requests are [`Settlement::Stale`].
//! - Installing a snapshot keeps in-flight edits applied over the new
//!   baseline, and snapshots are installed in the order they were requested.

pub mod edit;

pub use edit::{EditIntent, EditKind, EditState, EditTicket, Resolution, Settlement};

use edit::PendingEdit;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::model::{Task, TaskId};
use crate::reconstruct::{Scope, Snapshot};
use crate::view::{ViewFilter, derive_view};

/// A confirmed completion change that snapshots requested before the
/// confirmation may not reflect yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CommitMark {
    /// Highest refresh sequence issued when the write was confirmed.
    issued_refresh: u64,
    completed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TaskBoard {
    tasks: BTreeMap<TaskId, Task>,
    pending: HashMap<(TaskId, EditKind), PendingEdit>,
    tombstones: BTreeSet<TaskId>,
    commits: HashMap<TaskId, CommitMark>,
    /// Scope of the installed baseline.
    scope: Scope,
    next_generation: u64,
    issued_refresh: u64,
    installed_refresh: u64,
}

impl TaskBoard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A board seeded from `snapshot`.
    #[must_use]
    pub fn with_snapshot(snapshot: Snapshot) -> Self {
        let mut board = Self::new();
        let seq = board.begin_refresh();
        board.install_snapshot(seq, snapshot);
        board
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    #[must_use]
    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    /// Visible tasks in id order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    #[must_use]
    pub fn is_tombstoned(&self, id: TaskId) -> bool {
        self.tombstones.contains(&id)
    }

    /// Number of edits still waiting for the ledger.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn edit_state(&self, id: TaskId) -> EditState {
        let pending_completion = match self.pending.get(&(id, EditKind::Completion)) {
            Some(PendingEdit::Toggle { intended, .. }) => Some(*intended),
            _ => None,
        };
        EditState {
            pending_completion,
            pending_removal: self.pending.contains_key(&(id, EditKind::Removal)),
        }
    }

    /// Filtered, sorted copy of the visible list.
    #[must_use]
    pub fn derive_view(&self, filter: &ViewFilter) -> Vec<Task> {
        derive_view(self.tasks.values(), filter)
    }

    // -----------------------------------------------------------------------
    // Raw optimistic primitives
    // -----------------------------------------------------------------------

    /// Overwrite `completed` and return the previous value. `None` when the
    /// task is not visible.
    pub fn apply_optimistic_toggle(&mut self, id: TaskId, completed: bool) -> Option<bool> {
        let task = self.tasks.get_mut(&id)?;
        Some(std::mem::replace(&mut task.completed, completed))
    }

    /// Restore `completed`. No-op when the task is gone from the list; a
    /// record held by a pending removal is updated instead so a later
    /// reinsertion carries the restored value.
    pub fn rollback_toggle(&mut self, id: TaskId, previous: bool) {
        if let Some(task) = self.tasks.get_mut(&id) {
            task.completed = previous;
        }
        if let Some(PendingEdit::Removal { prior, .. }) =
            self.pending.get_mut(&(id, EditKind::Removal))
        {
            prior.completed = previous;
        }
    }

    /// Take the task out of the list. Calling it again returns `None`.
    pub fn apply_optimistic_removal(&mut self, id: TaskId) -> Option<Task> {
        self.tasks.remove(&id)
    }

    /// Put a removed record back. Returns whether it was reinserted: a task
    /// already present (a refresh brought it back), known deleted, or outside
    /// the installed scope is left alone.
    pub fn rollback_removal(&mut self, record: Option<Task>) -> bool {
        let Some(task) = record else {
            return false;
        };
        if self.tombstones.contains(&task.id) || self.tasks.contains_key(&task.id) {
            return false;
        }
        if !self.scope.includes(&task) {
            tracing::debug!(task_id = %task.id, "removed task is outside the current scope");
            return false;
        }
        self.tasks.insert(task.id, task);
        true
    }

    // -----------------------------------------------------------------------
    // Tracked edits
    // -----------------------------------------------------------------------

    const fn next_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Start a completion edit. A request superseding a pending one keeps the
    /// original pre-edit value so a rollback lands on what the ledger holds.
    pub fn begin_toggle(&mut self, id: TaskId, completed: bool) -> Option<EditTicket> {
        let previous = self.apply_optimistic_toggle(id, completed)?;
        let generation = self.next_generation();
        let key = (id, EditKind::Completion);
        let prior = match self.pending.get(&key) {
            Some(PendingEdit::Toggle { prior, .. }) => *prior,
            _ => previous,
        };
        self.pending.insert(
            key,
            PendingEdit::Toggle {
                generation,
                prior,
                intended: completed,
            },
        );
        tracing::debug!(task_id = %id, completed, generation, "optimistic completion applied");
        Some(EditTicket {
            task_id: id,
            intent: EditIntent::SetCompleted(completed),
            generation,
        })
    }

    /// Start a removal edit. Repeating a pending removal issues a fresh
    /// ticket for the same cached record.
    pub fn begin_removal(&mut self, id: TaskId) -> Option<EditTicket> {
        let key = (id, EditKind::Removal);
        let prior = match self.pending.remove(&key) {
            Some(PendingEdit::Removal { prior, .. }) => prior,
            _ => Box::new(self.apply_optimistic_removal(id)?),
        };
        let generation = self.next_generation();
        self.pending
            .insert(key, PendingEdit::Removal { generation, prior });
        tracing::debug!(task_id = %id, generation, "optimistic removal applied");
        Some(EditTicket {
            task_id: id,
            intent: EditIntent::Remove,
            generation,
        })
    }

    /// Apply the ledger's answer for `ticket`.
    pub fn settle(&mut self, ticket: EditTicket, resolution: Resolution) -> Settlement {
        let key = (ticket.task_id, ticket.kind());
        let current = self
            .pending
            .get(&key)
            .is_some_and(|edit| edit.generation() == ticket.generation);
        if !current {
            self.settle_stale(ticket, resolution);
            return Settlement::Stale;
        }
        let Some(edit) = self.pending.remove(&key) else {
            return Settlement::Stale;
        };

        match (edit, resolution) {
            (PendingEdit::Toggle { intended, .. }, Resolution::Confirmed) => {
                self.commits.insert(
                    ticket.task_id,
                    CommitMark {
                        issued_refresh: self.issued_refresh,
                        completed: intended,
                    },
                );
                Settlement::Committed
            }
            (PendingEdit::Toggle { prior, .. }, Resolution::Failed) => {
                self.rollback_toggle(ticket.task_id, prior);
                tracing::debug!(task_id = %ticket.task_id, restored = prior, "completion rolled back");
                Settlement::RolledBack
            }
            (PendingEdit::Removal { .. }, Resolution::Confirmed) => {
                self.bury(ticket.task_id);
                Settlement::Committed
            }
            (PendingEdit::Removal { prior, .. }, Resolution::Failed) => {
                let restored = self.rollback_removal(Some(*prior));
                tracing::debug!(task_id = %ticket.task_id, restored, "removal rolled back");
                Settlement::RolledBack
            }
        }
    }

    /// An older request answered after a newer one took over its pair. A
    /// failure changes nothing. A success means the ledger now holds the old
    /// request's value, so the winner's rollback target moves to it.
    fn settle_stale(&mut self, ticket: EditTicket, resolution: Resolution) {
        tracing::debug!(
            ticket = %ticket,
            confirmed = resolution == Resolution::Confirmed,
            "discarding stale edit result"
        );
        if resolution == Resolution::Failed {
            return;
        }
        match ticket.intent {
            EditIntent::SetCompleted(completed) => {
                if let Some(PendingEdit::Toggle { prior, .. }) =
                    self.pending.get_mut(&(ticket.task_id, EditKind::Completion))
                {
                    *prior = completed;
                }
            }
            EditIntent::Remove => self.bury(ticket.task_id),
        }
    }

    fn bury(&mut self, id: TaskId) {
        self.tombstones.insert(id);
        self.tasks.remove(&id);
        self.commits.remove(&id);
    }

    // -----------------------------------------------------------------------
    // Snapshots
    // -----------------------------------------------------------------------

    /// Reserve a sequence number for a refresh about to start.
    pub const fn begin_refresh(&mut self) -> u64 {
        self.issued_refresh += 1;
        self.issued_refresh
    }

    /// Highest refresh sequence installed so far.
    #[must_use]
    pub const fn installed_refresh(&self) -> u64 {
        self.installed_refresh
    }

    /// Replace the baseline with `snapshot`, keeping in-flight edits.
    ///
    /// Returns `false` (and changes nothing) when a refresh requested later
    /// than `seq` has already been installed.
    pub fn install_snapshot(&mut self, seq: u64, snapshot: Snapshot) -> bool {
        if seq <= self.installed_refresh {
            tracing::debug!(
                seq,
                installed = self.installed_refresh,
                "discarding out-of-order snapshot"
            );
            return false;
        }
        self.installed_refresh = seq;
        self.scope = snapshot.scope;
        self.tombstones.extend(snapshot.deleted.iter().copied());

        let tombstones = &self.tombstones;
        self.tasks = snapshot
            .tasks
            .into_iter()
            .filter(|(id, _)| !tombstones.contains(id))
            .collect();

        // Confirmed writes the snapshot may predate.
        self.commits.retain(|_, mark| mark.issued_refresh >= seq);
        for (id, mark) in &self.commits {
            if let Some(task) = self.tasks.get_mut(id) {
                task.completed = mark.completed;
            }
        }

        // In-flight edits ride on top of the new baseline.
        let mut overlaid = 0_usize;
        for ((id, _), edit) in &mut self.pending {
            match edit {
                PendingEdit::Toggle {
                    prior, intended, ..
                } => {
                    if let Some(task) = self.tasks.get_mut(id) {
                        *prior = std::mem::replace(&mut task.completed, *intended);
                        overlaid += 1;
                    }
                }
                PendingEdit::Removal { prior, .. } => {
                    if let Some(task) = self.tasks.remove(id) {
                        **prior = task;
                        overlaid += 1;
                    }
                }
            }
        }

        tracing::debug!(
            seq,
            tasks = self.tasks.len(),
            pending = self.pending.len(),
            overlaid,
            "installed snapshot"
        );
        true
    }
}
