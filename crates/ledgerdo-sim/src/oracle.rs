use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use ledgerdo_core::model::{Task, TaskId};

// ── Core result types ─────────────────────────────────────────────────────────

/// Outcome of one or more invariant checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResult {
    pub passed: bool,
    pub violations: Vec<InvariantViolation>,
}

impl OracleResult {
    #[must_use]
    pub const fn pass() -> Self {
        Self {
            passed: true,
            violations: Vec::new(),
        }
    }

    #[must_use]
    pub const fn fail(violations: Vec<InvariantViolation>) -> Self {
        Self {
            passed: false,
            violations,
        }
    }

    fn from_violations(violations: Vec<InvariantViolation>) -> Self {
        if violations.is_empty() {
            Self::pass()
        } else {
            Self::fail(violations)
        }
    }

    /// Failures accumulate.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        if !other.passed {
            self.passed = false;
            self.violations.extend(other.violations);
        }
        self
    }
}

// ── Invariant violation diagnostics ──────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// The board shows a task the ledger no longer (or never) held.
    Ghost { round: u64, task_id: TaskId },

    /// A task whose deletion was confirmed is visible again.
    Resurrected { round: u64, task_id: TaskId },

    /// After the ledger went quiet, the board disagrees with a fresh replay.
    Divergence {
        missing: Vec<TaskId>,
        extra: Vec<TaskId>,
        differing: Vec<TaskId>,
    },

    /// Optimistic edits were still pending after every write resolved.
    LeftoverEdits { pending: usize },
}

// ── Checks ───────────────────────────────────────────────────────────────────

pub struct BoardOracle;

impl BoardOracle {
    /// Checked at quiescent points: every visible task must be live on the
    /// ledger and must not be one the board itself buried.
    #[must_use]
    pub fn check_visible(
        round: u64,
        visible: &[TaskId],
        live: &BTreeSet<TaskId>,
        buried: &BTreeSet<TaskId>,
    ) -> OracleResult {
        let mut violations = Vec::new();
        for &task_id in visible {
            if buried.contains(&task_id) {
                violations.push(InvariantViolation::Resurrected { round, task_id });
            } else if !live.contains(&task_id) {
                violations.push(InvariantViolation::Ghost { round, task_id });
            }
        }
        OracleResult::from_violations(violations)
    }

    /// Compare the board against a replay taken after the last write.
    #[must_use]
    pub fn check_convergence(board: &[Task], fresh: &[Task]) -> OracleResult {
        let ours: BTreeMap<TaskId, &Task> = board.iter().map(|t| (t.id, t)).collect();
        let theirs: BTreeMap<TaskId, &Task> = fresh.iter().map(|t| (t.id, t)).collect();

        let missing: Vec<TaskId> = theirs
            .keys()
            .filter(|id| !ours.contains_key(id))
            .copied()
            .collect();
        let extra: Vec<TaskId> = ours
            .keys()
            .filter(|id| !theirs.contains_key(id))
            .copied()
            .collect();
        let differing: Vec<TaskId> = ours
            .iter()
            .filter(|(id, task)| theirs.get(id).is_some_and(|other| other != *task))
            .map(|(id, _)| *id)
            .collect();

        if missing.is_empty() && extra.is_empty() && differing.is_empty() {
            OracleResult::pass()
        } else {
            OracleResult::fail(vec![InvariantViolation::Divergence {
                missing,
                extra,
                differing,
            }])
        }
    }

    #[must_use]
    pub fn check_quiescent(pending: usize) -> OracleResult {
        if pending == 0 {
            OracleResult::pass()
        } else {
            OracleResult::fail(vec![InvariantViolation::LeftoverEdits { pending }])
        }
    }
}
