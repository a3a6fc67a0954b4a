//! Event data model for the task contract's log.
//!
//! The contract emits three events: `Created`, `Updated` and `Deleted`. Each
//! carries an [`OrderingKey`] (block height + log index) that totally orders
//! the log independent of the order in which a query returns it.
//!
//! Completion, reward-claim and assignment state are *not* in the log; they
//! are read per task from the contract (see [`crate::ledger::CanonicalTask`]).

pub mod codec;
pub mod kind;

pub use codec::{CodecError, parse_lines, write_line, write_lines};
pub use kind::{EventKind, UnknownEventKind};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::{Address, Priority, Task, TaskId};

/// Position of an event in the ledger: block height, then log index.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct OrderingKey {
    pub block: u64,
    pub index: u32,
}

impl OrderingKey {
    #[must_use]
    pub const fn new(block: u64, index: u32) -> Self {
        Self { block, index }
    }
}

impl fmt::Display for OrderingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.block, self.index)
    }
}

/// A single immutable entry of the task log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub key: OrderingKey,
    pub task_id: TaskId,
    pub data: EventData,
}

impl LedgerEvent {
    #[must_use]
    pub const fn created(key: OrderingKey, task_id: TaskId, data: CreatedData) -> Self {
        Self {
            key,
            task_id,
            data: EventData::Created(data),
        }
    }

    #[must_use]
    pub const fn updated(key: OrderingKey, task_id: TaskId, data: UpdatedData) -> Self {
        Self {
            key,
            task_id,
            data: EventData::Updated(data),
        }
    }

    #[must_use]
    pub const fn deleted(key: OrderingKey, task_id: TaskId) -> Self {
        Self {
            key,
            task_id,
            data: EventData::Deleted,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self.data {
            EventData::Created(_) => EventKind::Created,
            EventData::Updated(_) => EventKind::Updated,
            EventData::Deleted => EventKind::Deleted,
        }
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.key, self.kind(), self.task_id)?;
        match &self.data {
            EventData::Created(d) => write!(f, "\t{}", d.title),
            EventData::Updated(d) => match &d.title {
                Some(title) => write!(f, "\ttitle={title}"),
                None => Ok(()),
            },
            EventData::Deleted => Ok(()),
        }
    }
}

/// Typed payload per event kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventData {
    Created(CreatedData),
    Updated(UpdatedData),
    Deleted,
}

/// Fields recorded at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatedData {
    pub owner: Address,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub reward: u128,
    pub created_at: DateTime<Utc>,
}

/// An update carries only the fields it overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdatedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reward: Option<u128>,
}

impl UpdatedData {
    /// Overwrite the fields this update carries. Completion, claim and
    /// assignment are never touched.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(category) = &self.category {
            task.category.clone_from(category);
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(deadline) = self.deadline {
            task.deadline = deadline;
        }
        if let Some(reward) = self.reward {
            task.reward = reward;
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.priority.is_none()
            && self.deadline.is_none()
            && self.reward.is_none()
    }
}
