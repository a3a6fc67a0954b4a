use std::fmt;

use crate::model::{Task, TaskId};

/// The two kinds of speculative edit. At most one edit per
/// `(task, EditKind)` is live; a newer request replaces the older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EditKind {
    Completion,
    Removal,
}

impl fmt::Display for EditKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion => f.write_str("completion"),
            Self::Removal => f.write_str("removal"),
        }
    }
}

/// What an edit asks the ledger to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditIntent {
    SetCompleted(bool),
    Remove,
}

impl EditIntent {
    #[must_use]
    pub const fn kind(self) -> EditKind {
        match self {
            Self::SetCompleted(_) => EditKind::Completion,
            Self::Remove => EditKind::Removal,
        }
    }
}

/// Handle for one optimistic edit, returned when the edit is applied and
/// handed back when the ledger answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditTicket {
    pub task_id: TaskId,
    pub intent: EditIntent,
    /// Distinguishes this request from earlier and later ones on the same
    /// `(task, kind)` pair.
    pub generation: u64,
}

impl EditTicket {
    #[must_use]
    pub const fn kind(&self) -> EditKind {
        self.intent.kind()
    }
}

impl fmt::Display for EditTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} g{}", self.task_id, self.kind(), self.generation)
    }
}

/// How the ledger answered a submitted edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Confirmed,
    Failed,
}

/// What settling a ticket did to the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// The optimistic value is now the stable value.
    Committed,
    /// The pre-edit value was restored.
    RolledBack,
    /// A newer request owns the pair; the visible list was left alone.
    Stale,
}

/// Pending-edit bookkeeping for one task, as reported to the interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditState {
    /// Value a pending completion edit is trying to set.
    pub pending_completion: Option<bool>,
    pub pending_removal: bool,
}

impl EditState {
    #[must_use]
    pub const fn is_stable(&self) -> bool {
        self.pending_completion.is_none() && !self.pending_removal
    }
}

/// Stored per `(task, kind)` while the ledger has not answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PendingEdit {
    Toggle {
        generation: u64,
        /// Value to restore on failure.
        prior: bool,
        intended: bool,
    },
    Removal {
        generation: u64,
        /// Record to reinsert on failure.
        prior: Box<Task>,
    },
}

impl PendingEdit {
    pub(crate) const fn generation(&self) -> u64 {
        match self {
            Self::Toggle { generation, .. } | Self::Removal { generation, .. } => *generation,
        }
    }
}
