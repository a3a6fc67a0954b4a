//! Deterministic fault-injection harness for the optimistic task board.
//!
//! A [`Simulator`] drives a [`TaskSession`] against a [`MemoryLedger`]:
//! each round starts a batch of optimistic edits whose confirmations are
//! held open, runs a refresh under injected ledger faults while they are in
//! flight, then resolves the held writes in a seed-chosen order. The board
//! is checked for ghosts after every round and compared with a fresh replay
//! once the ledger goes quiet.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod campaign;
pub mod fault;
pub mod oracle;
pub mod rng;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;

use ledgerdo_core::board::Settlement;
use ledgerdo_core::config::{LedgerdoConfig, ReconstructConfig, SessionConfig};
use ledgerdo_core::event::{LedgerEvent, UpdatedData};
use ledgerdo_core::ledger::{MemoryLedger, MutationGate, MutationKind, NewTask};
use ledgerdo_core::model::{Address, Priority, Task, TaskId, from_unix_seconds};
use ledgerdo_core::reconstruct::{Reconstruction, Reconstructor, SnapshotRequest};
use ledgerdo_core::session::{MutationError, Notice, RefreshOutcome, TaskSession};

use crate::fault::FaultConfig;
use crate::oracle::{BoardOracle, OracleResult};
use crate::rng::DeterministicRng;

/// Account every simulated write is signed with.
pub const SIM_ACCOUNT: &str = "0x51m";

const DEADLINE_BASE_UNIX: i64 = 1_700_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub rounds: u64,
    /// Tasks on the ledger before the first refresh.
    pub initial_tasks: usize,
    /// Optimistic edits started per round.
    pub edits_per_round: usize,
    /// Chance per round of one plain (non-optimistic) write.
    pub plain_write_percent: u8,
    pub reconstruct: ReconstructConfig,
    pub fault: FaultConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            rounds: 16,
            initial_tasks: 6,
            edits_per_round: 4,
            plain_write_percent: 60,
            reconstruct: sim_reconstruct_config(),
            fault: FaultConfig::default(),
        }
    }
}

/// Reconstruction knobs for simulated runs: no real waiting between retries,
/// and a window short enough that most creations fall outside it after a
/// round or two.
#[must_use]
pub const fn sim_reconstruct_config() -> ReconstructConfig {
    ReconstructConfig {
        recent_window_blocks: 4,
        empty_retries: 1,
        empty_retry_delay_ms: 0,
        fetch_concurrency: 4,
    }
}

impl SimulationConfig {
    fn session_config(&self) -> LedgerdoConfig {
        LedgerdoConfig {
            reconstruct: self.reconstruct.clone(),
            session: SessionConfig::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Trace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraceEvent {
    pub round: u64,
    pub kind: TraceEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceEventKind {
    Write {
        kind: MutationKind,
        task_id: Option<TaskId>,
        ok: bool,
    },
    EditStarted {
        slot: usize,
        kind: MutationKind,
        task_id: TaskId,
    },
    Fault {
        fault: InjectedFault,
    },
    Refresh {
        outcome: &'static str,
    },
    Resolved {
        slot: usize,
        confirmed: bool,
        settlement: Option<&'static str>,
    },
    Notice {
        label: &'static str,
        code: Option<&'static str>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum InjectedFault {
    Lag,
    Blackout { queries: u32 },
    ReadFailure { task_id: TaskId },
    Outage,
}

const fn settlement_label(settlement: Settlement) -> &'static str {
    match settlement {
        Settlement::Committed => "committed",
        Settlement::RolledBack => "rolled_back",
        Settlement::Stale => "stale",
    }
}

const fn notice_label(notice: &Notice) -> &'static str {
    match notice {
        Notice::Confirmed { .. } => "confirmed",
        Notice::MutationFailed { .. } => "mutation_failed",
        Notice::Superseded { .. } => "superseded",
        Notice::RefreshFailed { .. } => "refresh_failed",
        Notice::Inconclusive { .. } => "inconclusive",
        Notice::Dropped { .. } => "dropped",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    /// The board after the final refresh.
    pub final_tasks: Vec<Task>,
    /// Everything the ledger logged, in write order.
    pub ledger_log: Vec<LedgerEvent>,
    pub oracle: OracleResult,
    /// A superseded result, a rollback, an inconclusive replay or a dropped
    /// task was observed.
    pub interesting_state_reached: bool,
}

// ---------------------------------------------------------------------------
// Simulator
// ---------------------------------------------------------------------------

type EditHandle = JoinHandle<Result<Settlement, MutationError>>;

/// An optimistic edit whose submission is held at the ledger.
struct PendingEdit {
    slot: usize,
    gate: MutationGate,
    handle: EditHandle,
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    ledger: Arc<MemoryLedger>,
    session: Arc<TaskSession<MemoryLedger>>,
    trace: Vec<TraceEvent>,
    oracle: OracleResult,
    interesting: bool,
}

impl Simulator {
    /// # Errors
    ///
    /// Returns an error when the configuration cannot produce a run.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        if config.rounds == 0 {
            bail!("rounds must be > 0");
        }
        let ledger = Arc::new(MemoryLedger::new(SIM_ACCOUNT));
        let session = Arc::new(TaskSession::new(
            Arc::clone(&ledger),
            config.session_config(),
        ));
        Ok(Self {
            rng: DeterministicRng::new(config.seed),
            config,
            ledger,
            session,
            trace: Vec::new(),
            oracle: OracleResult::pass(),
            interesting: false,
        })
    }

    /// Run every round, then settle and compare against a fresh replay.
    ///
    /// # Errors
    ///
    /// Returns an error when an edit task panics or the final, fault-free
    /// refresh does not install a snapshot. Invariant violations are not
    /// errors; they are reported in [`SimulationResult::oracle`].
    pub async fn run(mut self) -> Result<SimulationResult> {
        let mut notices = self.session.subscribe();

        for _ in 0..self.config.initial_tasks {
            let task = self.new_task(0);
            self.ledger.seed(task);
        }
        self.refresh(0).await;

        for round in 1..=self.config.rounds {
            if self.rng.chance(self.config.plain_write_percent) {
                self.plain_write(round).await;
            }
            let edits = self.start_edits(round).await;
            self.inject_faults(round);
            self.refresh(round).await;
            self.clear_faults();
            self.resolve_edits(round, edits).await?;
            self.check_quiescent_board(round);

            loop {
                match notices.try_recv() {
                    Ok(notice) => self.record_notice(round, &notice),
                    Err(TryRecvError::Lagged(missed)) => {
                        tracing::debug!(round, missed, "notice backlog overflowed");
                    }
                    Err(_) => break,
                }
            }
            tracing::debug!(
                seed = self.config.seed,
                round,
                tasks = self.visible_ids().len(),
                "round complete"
            );
        }

        self.finish().await
    }

    fn push(&mut self, round: u64, kind: TraceEventKind) {
        self.trace.push(TraceEvent { round, kind });
    }

    fn visible_ids(&self) -> Vec<TaskId> {
        self.session
            .with_board(|board| board.tasks().map(|task| task.id).collect())
    }

    fn new_task(&mut self, round: u64) -> NewTask {
        let priority = match self.rng.below(3) {
            0 => Priority::Low,
            1 => Priority::Medium,
            _ => Priority::High,
        };
        let offset = i64::try_from(self.rng.below(90 * 86_400)).unwrap_or(0);
        NewTask {
            title: format!("sim task r{round}-{}", self.rng.below(1_000)),
            description: String::new(),
            category: "sim".into(),
            priority,
            deadline: from_unix_seconds(DEADLINE_BASE_UNIX + offset),
            reward: u128::from(self.rng.below(100)),
        }
    }

    fn record_notice(&mut self, round: u64, notice: &Notice) {
        if matches!(
            notice,
            Notice::Superseded { .. } | Notice::Inconclusive { .. } | Notice::Dropped { .. }
        ) {
            self.interesting = true;
        }
        self.push(
            round,
            TraceEventKind::Notice {
                label: notice_label(notice),
                code: notice.code().map(|code| code.code()),
            },
        );
    }

    // -----------------------------------------------------------------------
    // Round steps
    // -----------------------------------------------------------------------

    /// One write that is not optimistic; confirmed writes refresh the board.
    async fn plain_write(&mut self, round: u64) {
        let visible = self.visible_ids();
        let target = self.rng.pick(&visible).copied();
        let choice = self.rng.below(5);
        let session = Arc::clone(&self.session);

        let (kind, result) = match (choice, target) {
            (0, _) | (_, None) => {
                let task = self.new_task(round);
                let result = session.create(task).await.map(|receipt| receipt.task_id);
                (MutationKind::Create, result)
            }
            (1, Some(id)) => {
                let changes = UpdatedData {
                    title: Some(format!("renamed in round {round}")),
                    ..UpdatedData::default()
                };
                let result = session.update(id, changes).await.map(|_| Some(id));
                (MutationKind::Update, result)
            }
            (2, Some(id)) => {
                let amount = u128::from(self.rng.below(50) + 1);
                let result = session.add_reward(id, amount).await.map(|_| Some(id));
                (MutationKind::AddReward, result)
            }
            (3, Some(id)) => {
                let result = session
                    .assign(id, Address::new(SIM_ACCOUNT))
                    .await
                    .map(|_| Some(id));
                (MutationKind::Assign, result)
            }
            (_, Some(id)) => {
                let result = session.claim_reward(id).await.map(|_| Some(id));
                (MutationKind::ClaimReward, result)
            }
        };

        let ok = result.is_ok();
        let task_id = result.ok().flatten().or(target);
        self.push(round, TraceEventKind::Write { kind, task_id, ok });
    }

    /// Start optimistic edits, each held at the ledger until resolved.
    async fn start_edits(&mut self, round: u64) -> Vec<PendingEdit> {
        let mut pending = Vec::new();
        for slot in 0..self.config.edits_per_round {
            let visible = self.visible_ids();
            let Some(id) = self.rng.pick(&visible).copied() else {
                break;
            };
            let delete = self.rng.chance(20);
            let completed = self.rng.chance(50);

            let gate = self.ledger.hold_next_mutation();
            let session = Arc::clone(&self.session);
            let (kind, handle): (_, EditHandle) = if delete {
                (
                    MutationKind::Delete,
                    tokio::spawn(async move { session.delete(id).await }),
                )
            } else {
                (
                    MutationKind::SetCompleted,
                    tokio::spawn(async move { session.set_completed(id, completed).await }),
                )
            };

            // Gates are claimed in submission order; wait for this one
            // before starting the next edit.
            while self.ledger.unclaimed_gates() > 0 && !handle.is_finished() {
                tokio::task::yield_now().await;
            }
            if self.ledger.unclaimed_gates() > 0 {
                self.ledger.clear_gates();
            }

            self.push(round, TraceEventKind::EditStarted { slot, kind, task_id: id });
            pending.push(PendingEdit { slot, gate, handle });
        }

        // Resolution order is independent of submission order.
        self.rng.shuffle(&mut pending);
        pending
    }

    fn inject_faults(&mut self, round: u64) {
        let fault = self.config.fault;
        if self.rng.chance(fault.lag_percent) {
            self.ledger.set_lagging(true);
            self.push(round, TraceEventKind::Fault { fault: InjectedFault::Lag });
        }
        if self.rng.chance(fault.blackout_percent) {
            // Whole attempts: one query per event kind.
            let queries = 3 * (u32::try_from(self.rng.below(3)).unwrap_or(0) + 1);
            self.ledger.blackout_queries(queries);
            self.push(
                round,
                TraceEventKind::Fault {
                    fault: InjectedFault::Blackout { queries },
                },
            );
        }
        if self.rng.chance(fault.read_failure_percent) {
            let visible = self.visible_ids();
            if let Some(task_id) = self.rng.pick(&visible).copied() {
                self.ledger.fail_reads_for(task_id);
                self.push(
                    round,
                    TraceEventKind::Fault {
                        fault: InjectedFault::ReadFailure { task_id },
                    },
                );
            }
        }
        if self.rng.chance(fault.outage_percent) {
            self.ledger.set_transport_down(true);
            self.push(round, TraceEventKind::Fault { fault: InjectedFault::Outage });
        }
    }

    fn clear_faults(&self) {
        self.ledger.set_lagging(false);
        self.ledger.set_transport_down(false);
        self.ledger.blackout_queries(0);
        self.ledger.clear_read_failures();
    }

    async fn refresh(&mut self, round: u64) {
        let mut request = SnapshotRequest::default();
        if !self.visible_ids().is_empty() {
            request = request.expecting_tasks();
        }
        let outcome = match self.session.refresh(request).await {
            Ok(RefreshOutcome::Installed { .. }) => "installed",
            Ok(RefreshOutcome::Superseded) => "superseded",
            Ok(RefreshOutcome::Inconclusive { .. }) => {
                self.interesting = true;
                "inconclusive"
            }
            Err(_) => "failed",
        };
        self.push(round, TraceEventKind::Refresh { outcome });
    }

    async fn resolve_edits(&mut self, round: u64, edits: Vec<PendingEdit>) -> Result<()> {
        for edit in edits {
            let failure = self.config.fault.roll_failure(&mut self.rng, round);
            let confirmed = failure.is_none();
            match failure {
                None => edit.gate.confirm(),
                Some(error) => edit.gate.fail(error),
            }
            let settlement = match edit.handle.await.context("edit task panicked")? {
                Ok(settlement) => Some(settlement),
                // Rolled back or rejected before submission; the board
                // already reflects it.
                Err(MutationError::Ledger { .. }) => Some(Settlement::RolledBack),
                Err(MutationError::UnknownTask(_)) => None,
            };
            if matches!(settlement, Some(Settlement::Stale | Settlement::RolledBack)) {
                self.interesting = true;
            }
            self.push(
                round,
                TraceEventKind::Resolved {
                    slot: edit.slot,
                    confirmed,
                    settlement: settlement.map(settlement_label),
                },
            );
        }
        Ok(())
    }

    fn check_quiescent_board(&mut self, round: u64) {
        let visible = self.visible_ids();
        let buried: BTreeSet<TaskId> = self.session.with_board(|board| {
            visible
                .iter()
                .copied()
                .filter(|id| board.is_tombstoned(*id))
                .collect()
        });
        let live = self.ledger.live_ids();
        let result = BoardOracle::check_visible(round, &visible, &live, &buried);
        if !result.passed {
            tracing::warn!(seed = self.config.seed, round, violations = ?result.violations, "board shows dead tasks");
        }
        self.oracle = std::mem::replace(&mut self.oracle, OracleResult::pass()).merge(result);
    }

    async fn finish(mut self) -> Result<SimulationResult> {
        self.clear_faults();
        let request = SnapshotRequest::default();
        let round = self.config.rounds + 1;

        match self
            .session
            .refresh(request.clone())
            .await
            .context("final refresh failed")?
        {
            RefreshOutcome::Installed { .. } => {}
            other => bail!("final refresh did not install: {other:?}"),
        }
        self.push(round, TraceEventKind::Refresh { outcome: "installed" });

        let reconstructor = Reconstructor::new(
            Arc::clone(&self.ledger),
            self.config.reconstruct.clone(),
        );
        let fresh = match reconstructor
            .reconstruct(&request)
            .await
            .context("fresh replay failed")?
        {
            Reconstruction::Ready(snapshot) => snapshot.tasks.into_values().collect::<Vec<_>>(),
            Reconstruction::Inconclusive { attempts } => {
                bail!("fresh replay inconclusive after {attempts} attempts")
            }
        };

        let (final_tasks, pending) = self
            .session
            .with_board(|board| (board.tasks().cloned().collect::<Vec<_>>(), board.pending_count()));

        let oracle = std::mem::replace(&mut self.oracle, OracleResult::pass())
            .merge(BoardOracle::check_convergence(&final_tasks, &fresh))
            .merge(BoardOracle::check_quiescent(pending));

        tracing::info!(
            seed = self.config.seed,
            passed = oracle.passed,
            tasks = final_tasks.len(),
            trace_events = self.trace.len(),
            "simulation complete"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            trace: self.trace,
            final_tasks,
            ledger_log: self.ledger.events(),
            oracle,
            interesting_state_reached: self.interesting,
        })
    }
}
