//! Snapshot reconstruction from the ledger's event log.
//!
//! A pass queries all three event kinds, folds them (see [`fold`]), then
//! reads the ledger-held flags for each surviving task. The fold always runs
//! over full history. The recent window is queried first as a freshness
//! check: events there mean the ledger holds tasks, so an empty full history
//! is then treated like one the caller said was implausible. Such a result
//! is retried a bounded number of times and reported as
//! [`Reconstruction::Inconclusive`] if it stays empty.

pub mod fold;

pub use fold::{Fold, fold_events};

use futures::{StreamExt, stream};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use crate::config::ReconstructConfig;
use crate::error::ErrorCode;
use crate::event::{EventKind, LedgerEvent};
use crate::ledger::{CanonicalTask, Ledger, LedgerError, RangeHint};
use crate::model::{Address, Task, TaskId};

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// Which tasks a snapshot covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Scope {
    #[default]
    All,
    /// Only tasks created by this account.
    OwnedBy(Address),
}

impl Scope {
    #[must_use]
    pub fn includes(&self, task: &Task) -> bool {
        match self {
            Self::All => true,
            Self::OwnedBy(owner) => task.is_owned_by(owner),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub scope: Scope,
    /// The caller has reason to believe the ledger holds tasks (for example
    /// it just confirmed a creation). An empty answer is then treated as
    /// indexer lag rather than truth.
    pub expect_non_empty: bool,
}

impl SnapshotRequest {
    #[must_use]
    pub const fn new(scope: Scope) -> Self {
        Self {
            scope,
            expect_non_empty: false,
        }
    }

    #[must_use]
    pub const fn expecting_tasks(mut self) -> Self {
        self.expect_non_empty = true;
        self
    }
}

/// Authoritative view of the ledger at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub tasks: BTreeMap<TaskId, Task>,
    /// Every id the log reports as deleted, regardless of scope.
    pub deleted: BTreeSet<TaskId>,
    /// Ids whose canonical read failed and were left out.
    pub dropped: Vec<TaskId>,
    /// Scope the snapshot was filtered to.
    pub scope: Scope,
    /// Events the recent-window query returned; `None` when the window is
    /// disabled.
    pub recent_events: Option<usize>,
    /// Query rounds made, counting the recent window.
    pub attempts: u32,
}

impl Snapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconstruction {
    Ready(Snapshot),
    /// Every query came back empty although tasks were expected.
    Inconclusive { attempts: u32 },
}

/// Errors that abort a reconstruction pass.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconstructError {
    /// An event query failed. Nothing partial is returned.
    #[error("event query for {kind} failed: {source}")]
    Transport {
        kind: EventKind,
        #[source]
        source: LedgerError,
    },
}

impl ReconstructError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Transport { .. } => ErrorCode::LedgerUnavailable,
        }
    }
}

// ---------------------------------------------------------------------------
// Reconstructor
// ---------------------------------------------------------------------------

/// Rebuilds snapshots from a [`Ledger`]. Holds no state between passes.
pub struct Reconstructor<L: Ledger + ?Sized> {
    ledger: Arc<L>,
    config: ReconstructConfig,
}

impl<L: Ledger + ?Sized> Clone for Reconstructor<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: Arc::clone(&self.ledger),
            config: self.config.clone(),
        }
    }
}

impl<L: Ledger + ?Sized> Reconstructor<L> {
    #[must_use]
    pub const fn new(ledger: Arc<L>, config: ReconstructConfig) -> Self {
        Self { ledger, config }
    }

    #[must_use]
    pub const fn config(&self) -> &ReconstructConfig {
        &self.config
    }

    /// Run one reconstruction pass.
    ///
    /// # Errors
    ///
    /// Returns [`ReconstructError::Transport`] when any event query fails.
    /// Failed canonical reads are not errors; those ids land in
    /// [`Snapshot::dropped`].
    pub async fn reconstruct(
        &self,
        request: &SnapshotRequest,
    ) -> Result<Reconstruction, ReconstructError> {
        let start = Instant::now();
        let mut attempts = 0_u32;

        // Window events are never folded on their own: tasks created before
        // the window may still be live.
        let recent_events = match self.config.recent_window_blocks {
            0 => None,
            blocks => {
                attempts += 1;
                let events = self.fetch_log(RangeHint::Recent { blocks }).await?;
                tracing::debug!(blocks, events = events.len(), "recent window queried");
                Some(events.len())
            }
        };
        let expect_non_empty = request.expect_non_empty || recent_events.is_some_and(|n| n > 0);
        let mut retries_left = self.config.empty_retries;

        let events = loop {
            attempts += 1;
            let events = self.fetch_log(RangeHint::All).await?;
            if !events.is_empty() || !expect_non_empty {
                break events;
            }
            if retries_left == 0 {
                tracing::warn!(attempts, "ledger reported no tasks although some were expected");
                return Ok(Reconstruction::Inconclusive { attempts });
            }
            retries_left -= 1;
            tracing::debug!(
                attempts,
                delay_ms = self.config.empty_retry_delay_ms,
                "full history empty, retrying"
            );
            tokio::time::sleep(self.config.empty_retry_delay()).await;
        };

        let fold = fold_events(&events);
        let candidates: Vec<Task> = fold
            .tasks
            .into_values()
            .filter(|task| request.scope.includes(task))
            .collect();

        let (tasks, dropped) = self.attach_canonical(candidates).await;

        tracing::debug!(
            events = fold.event_count,
            tasks = tasks.len(),
            deleted = fold.deleted.len(),
            dropped = dropped.len(),
            ?recent_events,
            attempts,
            elapsed_ms = start.elapsed().as_millis(),
            "reconstructed snapshot"
        );

        Ok(Reconstruction::Ready(Snapshot {
            tasks,
            deleted: fold.deleted,
            dropped,
            scope: request.scope.clone(),
            recent_events,
            attempts,
        }))
    }

    /// Query every event kind over `range`, concurrently.
    async fn fetch_log(&self, range: RangeHint) -> Result<Vec<LedgerEvent>, ReconstructError> {
        let query = |kind: EventKind| async move {
            self.ledger
                .query_events(kind, range)
                .await
                .map_err(|source| ReconstructError::Transport { kind, source })
        };
        let (mut created, updated, deleted) = futures::try_join!(
            query(EventKind::Created),
            query(EventKind::Updated),
            query(EventKind::Deleted)
        )?;
        created.extend(updated);
        created.extend(deleted);
        Ok(created)
    }

    /// Fill in ledger-held flags. Tasks whose read fails are dropped.
    async fn attach_canonical(
        &self,
        candidates: Vec<Task>,
    ) -> (BTreeMap<TaskId, Task>, Vec<TaskId>) {
        let reads: Vec<(Task, Result<CanonicalTask, LedgerError>)> = stream::iter(candidates)
            .map(|task| async move {
                let read = self.ledger.get_task(task.id).await;
                (task, read)
            })
            .buffered(self.config.fetch_concurrency.max(1))
            .collect()
            .await;

        let mut tasks = BTreeMap::new();
        let mut dropped = Vec::new();
        for (mut task, read) in reads {
            match read {
                Ok(canonical) => {
                    task.completed = canonical.completed;
                    task.reward_claimed = canonical.reward_claimed;
                    task.assignee = canonical.assignee;
                    tasks.insert(task.id, task);
                }
                Err(error) => {
                    tracing::warn!(
                        task_id = %task.id,
                        code = %ErrorCode::CanonicalReadFailed,
                        error = %error,
                        "dropping task whose ledger state could not be read"
                    );
                    dropped.push(task.id);
                }
            }
        }
        (tasks, dropped)
    }
}
