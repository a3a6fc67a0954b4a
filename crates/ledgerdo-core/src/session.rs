//! Async driver tying the board to a ledger.
//!
//! [`TaskSession`] owns the ledger handle, the reconstructor and the board.
//! Optimistic edits are applied to the board before the write is submitted
//! and settled when the ledger answers. Confirmed writes trigger a refresh.
//! The board lock is only taken for synchronous sections, never across an
//! `.await`.
//!
//! Every outcome the user should hear about is published as a [`Notice`] on
//! a broadcast channel. Sending never waits; notices are dropped when no one
//! is subscribed.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::board::{EditTicket, Resolution, Settlement, TaskBoard};
use crate::config::{LedgerdoConfig, SessionConfig};
use crate::error::ErrorCode;
use crate::event::UpdatedData;
use crate::ledger::{Ledger, LedgerError, Mutation, MutationKind, NewTask, Receipt};
use crate::model::{Address, Task, TaskId};
use crate::reconstruct::{ReconstructError, Reconstruction, Reconstructor, SnapshotRequest};
use crate::stats::TaskStats;
use crate::view::ViewFilter;

const NOTICE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Notices and errors
// ---------------------------------------------------------------------------

/// User-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Confirmed {
        kind: MutationKind,
        task_id: Option<TaskId>,
    },
    /// The write failed. Optimistic edits have been rolled back.
    MutationFailed {
        kind: MutationKind,
        task_id: Option<TaskId>,
        code: ErrorCode,
        reason: String,
    },
    /// A newer request on the same task took over; this answer was ignored.
    Superseded { kind: MutationKind, task_id: TaskId },
    RefreshFailed { code: ErrorCode, reason: String },
    /// The ledger reported no tasks although some were expected.
    Inconclusive { attempts: u32 },
    /// Tasks left out of the last snapshot because their state was unreadable.
    Dropped { ids: Vec<TaskId> },
}

impl Notice {
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Confirmed { .. } | Self::Dropped { .. } => None,
            Self::MutationFailed { code, .. } | Self::RefreshFailed { code, .. } => Some(*code),
            Self::Superseded { .. } => Some(ErrorCode::SupersededResult),
            Self::Inconclusive { .. } => Some(ErrorCode::InconclusiveSnapshot),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MutationError {
    /// The task is not on the board, so there is nothing to edit.
    #[error("task {0} is not on the board")]
    UnknownTask(TaskId),

    #[error("{kind} failed: {source}")]
    Ledger {
        kind: MutationKind,
        #[source]
        source: LedgerError,
    },
}

impl MutationError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownTask(_) => ErrorCode::TaskNotFound,
            Self::Ledger { source, .. } => source.code(),
        }
    }
}

/// Result of [`TaskSession::refresh`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Installed { tasks: usize, dropped: Vec<TaskId> },
    /// A refresh requested later finished first; this one was discarded.
    Superseded,
    /// The board was left untouched.
    Inconclusive { attempts: u32 },
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

pub struct TaskSession<L: Ledger + ?Sized> {
    ledger: Arc<L>,
    reconstructor: Reconstructor<L>,
    board: Mutex<TaskBoard>,
    request: Mutex<SnapshotRequest>,
    notices: broadcast::Sender<Notice>,
    config: SessionConfig,
}

impl<L: Ledger + ?Sized> TaskSession<L> {
    #[must_use]
    pub fn new(ledger: Arc<L>, config: LedgerdoConfig) -> Self {
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);
        Self {
            reconstructor: Reconstructor::new(Arc::clone(&ledger), config.reconstruct),
            ledger,
            board: Mutex::new(TaskBoard::new()),
            request: Mutex::new(SnapshotRequest::default()),
            notices,
            config: config.session,
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine.
        let _ = self.notices.send(notice);
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Run `f` against the board under its lock.
    pub fn with_board<R>(&self, f: impl FnOnce(&TaskBoard) -> R) -> R {
        f(&self.board.lock())
    }

    #[must_use]
    pub fn view(&self, filter: &ViewFilter) -> Vec<Task> {
        self.board.lock().derive_view(filter)
    }

    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> TaskStats {
        let board = self.board.lock();
        TaskStats::compute(board.tasks(), now, self.config.urgent_window())
    }

    /// The request the last refresh ran with.
    #[must_use]
    pub fn current_request(&self) -> SnapshotRequest {
        self.request.lock().clone()
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    /// Reconstruct with `request` and install the result.
    ///
    /// The request is remembered for refreshes triggered by confirmed writes.
    ///
    /// # Errors
    ///
    /// Returns the reconstructor's error when an event query fails; the
    /// board is left as it was.
    pub async fn refresh(
        &self,
        request: SnapshotRequest,
    ) -> Result<RefreshOutcome, ReconstructError> {
        self.request.lock().clone_from(&request);
        self.run_refresh(&request).await
    }

    /// Refresh with the last request.
    ///
    /// # Errors
    ///
    /// See [`TaskSession::refresh`].
    pub async fn refresh_current(&self) -> Result<RefreshOutcome, ReconstructError> {
        let request = self.current_request();
        self.run_refresh(&request).await
    }

    async fn run_refresh(
        &self,
        request: &SnapshotRequest,
    ) -> Result<RefreshOutcome, ReconstructError> {
        let seq = self.board.lock().begin_refresh();
        let result = self.reconstructor.reconstruct(request).await;

        match result {
            Err(err) => {
                tracing::warn!(seq, code = %err.code(), error = %err, "refresh failed");
                self.notify(Notice::RefreshFailed {
                    code: err.code(),
                    reason: err.to_string(),
                });
                Err(err)
            }
            Ok(Reconstruction::Inconclusive { attempts }) => {
                self.notify(Notice::Inconclusive { attempts });
                Ok(RefreshOutcome::Inconclusive { attempts })
            }
            Ok(Reconstruction::Ready(snapshot)) => {
                let dropped = snapshot.dropped.clone();
                let installed = {
                    let mut board = self.board.lock();
                    board
                        .install_snapshot(seq, snapshot)
                        .then(|| board.len())
                };
                let Some(tasks) = installed else {
                    return Ok(RefreshOutcome::Superseded);
                };
                if !dropped.is_empty() {
                    self.notify(Notice::Dropped {
                        ids: dropped.clone(),
                    });
                }
                Ok(RefreshOutcome::Installed { tasks, dropped })
            }
        }
    }

    async fn refresh_after_confirm(&self, expect_tasks: bool) {
        if !self.config.refresh_on_confirm {
            return;
        }
        let mut request = self.current_request();
        request.expect_non_empty |= expect_tasks;
        // Failures were already published by run_refresh.
        if let Err(err) = self.run_refresh(&request).await {
            tracing::debug!(error = %err, "post-confirmation refresh failed");
        }
    }

    // -----------------------------------------------------------------------
    // Optimistic writes
    // -----------------------------------------------------------------------

    /// Flip completion now, then confirm with the ledger.
    ///
    /// Returns [`Settlement::Stale`] when a newer request for the same task
    /// took over while this one was in flight; its outcome is then ignored
    /// for display purposes.
    ///
    /// # Errors
    ///
    /// [`MutationError::UnknownTask`] when the task is not visible, or the
    /// ledger's error after the edit has been rolled back.
    pub async fn set_completed(
        &self,
        id: TaskId,
        completed: bool,
    ) -> Result<Settlement, MutationError> {
        let ticket = self
            .board
            .lock()
            .begin_toggle(id, completed)
            .ok_or(MutationError::UnknownTask(id))?;
        let result = self
            .ledger
            .submit_mutation(Mutation::SetCompleted { id, completed })
            .await;
        self.finish_edit(ticket, MutationKind::SetCompleted, result)
            .await
    }

    /// Hide the task now, then confirm the deletion with the ledger.
    ///
    /// # Errors
    ///
    /// As for [`TaskSession::set_completed`].
    pub async fn delete(&self, id: TaskId) -> Result<Settlement, MutationError> {
        let ticket = self
            .board
            .lock()
            .begin_removal(id)
            .ok_or(MutationError::UnknownTask(id))?;
        let result = self.ledger.submit_mutation(Mutation::Delete { id }).await;
        self.finish_edit(ticket, MutationKind::Delete, result).await
    }

    async fn finish_edit(
        &self,
        ticket: EditTicket,
        kind: MutationKind,
        result: Result<Receipt, LedgerError>,
    ) -> Result<Settlement, MutationError> {
        let resolution = if result.is_ok() {
            Resolution::Confirmed
        } else {
            Resolution::Failed
        };
        let settlement = self.board.lock().settle(ticket, resolution);
        let task_id = ticket.task_id;

        match result {
            Ok(receipt) => {
                tracing::info!(%kind, task_id = %task_id, block = receipt.block, ?settlement, "edit confirmed");
                if settlement == Settlement::Stale {
                    self.notify(Notice::Superseded { kind, task_id });
                } else {
                    self.notify(Notice::Confirmed {
                        kind,
                        task_id: Some(task_id),
                    });
                }
                self.refresh_after_confirm(false).await;
                Ok(settlement)
            }
            Err(source) if settlement == Settlement::Stale => {
                tracing::debug!(%kind, task_id = %task_id, error = %source, "superseded edit failed");
                self.notify(Notice::Superseded { kind, task_id });
                Ok(settlement)
            }
            Err(source) => {
                tracing::warn!(%kind, task_id = %task_id, code = %source.code(), error = %source, "edit rolled back");
                self.notify(Notice::MutationFailed {
                    kind,
                    task_id: Some(task_id),
                    code: source.code(),
                    reason: source.to_string(),
                });
                Err(MutationError::Ledger { kind, source })
            }
        }
    }

    // -----------------------------------------------------------------------
    // Plain writes
    // -----------------------------------------------------------------------

    /// Create a task. The board picks it up on the following refresh.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error.
    pub async fn create(&self, task: NewTask) -> Result<Receipt, MutationError> {
        self.submit(Mutation::Create(task), true).await
    }

    /// Overwrite the fields carried by `changes`.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error.
    pub async fn update(&self, id: TaskId, changes: UpdatedData) -> Result<Receipt, MutationError> {
        self.submit(Mutation::Update { id, changes }, false).await
    }

    /// Delegate the task; the zero address clears the assignee.
    ///
    /// # Errors
    ///
    /// Returns the ledger's error.
    pub async fn assign(&self, id: TaskId, assignee: Address) -> Result<Receipt, MutationError> {
        self.submit(Mutation::Assign { id, assignee }, false).await
    }

    /// # Errors
    ///
    /// Returns the ledger's error.
    pub async fn add_reward(&self, id: TaskId, amount: u128) -> Result<Receipt, MutationError> {
        self.submit(Mutation::AddReward { id, amount }, false).await
    }

    /// # Errors
    ///
    /// Returns the ledger's error.
    pub async fn claim_reward(&self, id: TaskId) -> Result<Receipt, MutationError> {
        self.submit(Mutation::ClaimReward { id }, false).await
    }

    async fn submit(
        &self,
        mutation: Mutation,
        expect_tasks: bool,
    ) -> Result<Receipt, MutationError> {
        let kind = mutation.kind();
        let target = mutation.task_id();
        match self.ledger.submit_mutation(mutation).await {
            Ok(receipt) => {
                tracing::info!(%kind, block = receipt.block, task_id = ?receipt.task_id, "write confirmed");
                self.notify(Notice::Confirmed {
                    kind,
                    task_id: receipt.task_id,
                });
                self.refresh_after_confirm(expect_tasks).await;
                Ok(receipt)
            }
            Err(source) => {
                tracing::warn!(%kind, task_id = ?target, code = %source.code(), error = %source, "write failed");
                self.notify(Notice::MutationFailed {
                    kind,
                    task_id: target,
                    code: source.code(),
                    reason: source.to_string(),
                });
                Err(MutationError::Ledger { kind, source })
            }
        }
    }
}
