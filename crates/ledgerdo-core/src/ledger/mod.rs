//! The narrow interface to the external ledger (the task contract).
//!
//! Wallet handling, signing, gas and confirmation waiting all live behind
//! [`Ledger`]; this crate only sees the three capabilities below and the
//! pass/fail result of each write.

pub mod memory;

pub use memory::{MemoryLedger, MutationGate};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ErrorCode;
use crate::event::{EventKind, LedgerEvent, UpdatedData};
use crate::model::{Address, Priority, TaskId};

/// How far back an event query reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeHint {
    /// Only the most recent `blocks` blocks.
    Recent { blocks: u64 },
    /// The full history.
    All,
}

impl fmt::Display for RangeHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recent { blocks } => write!(f, "last {blocks} blocks"),
            Self::All => f.write_str("all blocks"),
        }
    }
}

/// Fields the contract holds out-of-band from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CanonicalTask {
    pub completed: bool,
    pub reward_claimed: bool,
    pub assignee: Option<Address>,
}

/// Input for creating a task. The owner is the submitting account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    pub reward: u128,
}

/// A ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutation {
    Create(NewTask),
    Update { id: TaskId, changes: UpdatedData },
    SetCompleted { id: TaskId, completed: bool },
    Delete { id: TaskId },
    Assign { id: TaskId, assignee: Address },
    AddReward { id: TaskId, amount: u128 },
    ClaimReward { id: TaskId },
}

impl Mutation {
    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        match self {
            Self::Create(_) => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::SetCompleted { .. } => MutationKind::SetCompleted,
            Self::Delete { .. } => MutationKind::Delete,
            Self::Assign { .. } => MutationKind::Assign,
            Self::AddReward { .. } => MutationKind::AddReward,
            Self::ClaimReward { .. } => MutationKind::ClaimReward,
        }
    }

    /// The task this write targets; `None` for creation.
    #[must_use]
    pub const fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::Create(_) => None,
            Self::Update { id, .. }
            | Self::SetCompleted { id, .. }
            | Self::Delete { id }
            | Self::Assign { id, .. }
            | Self::AddReward { id, .. }
            | Self::ClaimReward { id } => Some(*id),
        }
    }
}

/// Discriminant of [`Mutation`], used in notices and errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    SetCompleted,
    Delete,
    Assign,
    AddReward,
    ClaimReward,
}

impl MutationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::SetCompleted => "set_completed",
            Self::Delete => "delete",
            Self::Assign => "assign",
            Self::AddReward => "add_reward",
            Self::ClaimReward => "claim_reward",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Confirmation of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    /// Block the write was included in.
    pub block: u64,
    /// The affected task; for creation, the newly assigned id.
    pub task_id: Option<TaskId>,
}

/// Failures reported by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The RPC endpoint could not be reached or timed out.
    #[error("ledger transport failure: {0}")]
    Transport(String),

    /// The task does not exist (or was deleted).
    #[error("task {0} not found on the ledger")]
    NotFound(TaskId),

    /// The contract refused the write.
    #[error("ledger rejected {kind}: {reason}")]
    Rejected { kind: MutationKind, reason: String },

    /// The user declined to sign the transaction.
    #[error("transaction was declined by the user")]
    Declined,

    /// The transaction was mined but reverted.
    #[error("transaction reverted: {0}")]
    Reverted(String),
}

impl LedgerError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport(_) => ErrorCode::LedgerUnavailable,
            Self::NotFound(_) => ErrorCode::TaskNotFound,
            Self::Rejected { .. } => ErrorCode::MutationRejected,
            Self::Declined => ErrorCode::MutationDeclined,
            Self::Reverted(_) => ErrorCode::MutationReverted,
        }
    }

    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Capabilities consumed from the ledger.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Events of one kind within `range`, in ledger order.
    async fn query_events(
        &self,
        kind: EventKind,
        range: RangeHint,
    ) -> Result<Vec<LedgerEvent>, LedgerError>;

    /// Point-in-time read of the fields not trusted from events.
    async fn get_task(&self, id: TaskId) -> Result<CanonicalTask, LedgerError>;

    /// Submit a write and wait for its confirmation. May take seconds.
    async fn submit_mutation(&self, mutation: Mutation) -> Result<Receipt, LedgerError>;
}
