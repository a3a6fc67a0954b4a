//! In-memory ledger for tests and the simulation harness.
//!
//! Behaves like the task contract: every write lands in its own block,
//! creation/update/deletion emit log events, and completion, assignment and
//! reward claims only change contract storage. Fault switches model the
//! failure classes the reconstructor and session must survive:
//!
//! - `set_transport_down`: every call fails with a transport error
//! - `set_lagging`: recent-window queries return nothing (indexer lag)
//! - `blackout_queries(n)`: the next `n` event queries return nothing
//! - `blackout_history(n)`: the next `n` full-history queries return nothing
//! - `fail_reads_for(id)`: the canonical read for one task fails
//! - `hold_next_mutation()`: the next submission waits on a [`MutationGate`]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tokio::sync::oneshot;

use super::{
    CanonicalTask, Ledger, LedgerError, Mutation, MutationKind, NewTask, RangeHint, Receipt,
};
use crate::event::{CreatedData, EventData, EventKind, LedgerEvent, OrderingKey, UpdatedData};
use crate::model::{Address, Priority, TaskId, from_unix_seconds};

const GENESIS_UNIX: i64 = 1_700_000_000;
const BLOCK_SECONDS: i64 = 12;

#[derive(Debug, Clone)]
struct StoredTask {
    owner: Address,
    title: String,
    description: String,
    category: String,
    priority: Priority,
    deadline: DateTime<Utc>,
    reward: u128,
    assignee: Option<Address>,
    completed: bool,
    reward_claimed: bool,
    deleted: bool,
}

impl StoredTask {
    fn new(data: &CreatedData) -> Self {
        Self {
            owner: data.owner.clone(),
            title: data.title.clone(),
            description: data.description.clone(),
            category: data.category.clone(),
            priority: data.priority,
            deadline: data.deadline,
            reward: data.reward,
            assignee: None,
            completed: false,
            reward_claimed: false,
            deleted: false,
        }
    }

    fn absorb(&mut self, changes: &UpdatedData) {
        if let Some(title) = &changes.title {
            self.title.clone_from(title);
        }
        if let Some(description) = &changes.description {
            self.description.clone_from(description);
        }
        if let Some(category) = &changes.category {
            self.category.clone_from(category);
        }
        if let Some(priority) = changes.priority {
            self.priority = priority;
        }
        if let Some(deadline) = changes.deadline {
            self.deadline = deadline;
        }
        if let Some(reward) = changes.reward {
            self.reward = reward;
        }
    }

    /// The contract logs every editable field on each update.
    fn update_event(&self) -> EventData {
        EventData::Updated(UpdatedData {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            category: Some(self.category.clone()),
            priority: Some(self.priority),
            deadline: Some(self.deadline),
            reward: Some(self.reward),
        })
    }
}

#[derive(Debug)]
enum GateDecision {
    Confirm,
    Fail(LedgerError),
}

/// Holds one submission until the test decides its outcome.
///
/// Gates are matched to submissions in submission order. Dropping a gate
/// without deciding fails the held submission with a transport error.
#[derive(Debug)]
pub struct MutationGate {
    tx: oneshot::Sender<GateDecision>,
}

impl MutationGate {
    /// Let the held submission through; the write is applied when it resumes.
    pub fn confirm(self) {
        // Receiver gone means the submission was never made.
        let _ = self.tx.send(GateDecision::Confirm);
    }

    /// Fail the held submission without touching ledger state.
    pub fn fail(self, error: LedgerError) {
        let _ = self.tx.send(GateDecision::Fail(error));
    }
}

#[derive(Debug, Default)]
struct State {
    account: Address,
    head: u64,
    next_id: u64,
    events: Vec<LedgerEvent>,
    tasks: BTreeMap<TaskId, StoredTask>,
    lagging: bool,
    transport_down: bool,
    blackout_queries: u32,
    blackout_history: u32,
    failing_reads: BTreeSet<TaskId>,
    gates: VecDeque<oneshot::Receiver<GateDecision>>,
    queries: Vec<(EventKind, RangeHint)>,
}

impl State {
    fn next_block(&mut self) -> u64 {
        self.head += 1;
        self.head
    }

    fn block_time(block: u64) -> DateTime<Utc> {
        let offset = i64::try_from(block)
            .unwrap_or(0)
            .saturating_mul(BLOCK_SECONDS);
        from_unix_seconds(GENESIS_UNIX.saturating_add(offset))
    }

    fn live_task_mut(&mut self, id: TaskId) -> Result<&mut StoredTask, LedgerError> {
        self.tasks
            .get_mut(&id)
            .filter(|task| !task.deleted)
            .ok_or(LedgerError::NotFound(id))
    }

    fn create(&mut self, new: NewTask) -> Receipt {
        self.next_id += 1;
        let id = TaskId::new(self.next_id);
        let block = self.next_block();
        let data = CreatedData {
            owner: self.account.clone(),
            title: new.title,
            description: new.description,
            category: new.category,
            priority: new.priority,
            deadline: new.deadline,
            reward: new.reward,
            created_at: Self::block_time(block),
        };
        self.tasks.insert(id, StoredTask::new(&data));
        self.events
            .push(LedgerEvent::created(OrderingKey::new(block, 0), id, data));
        Receipt {
            block,
            task_id: Some(id),
        }
    }

    fn apply(&mut self, mutation: Mutation) -> Result<Receipt, LedgerError> {
        let kind = mutation.kind();
        let account = self.account.clone();
        let (id, emitted) = match mutation {
            Mutation::Create(new) => return Ok(self.create(new)),
            Mutation::Update { id, changes } => {
                let task = self.live_task_mut(id)?;
                ensure(task.owner == account, kind, "only the owner can edit a task")?;
                ensure(!changes.is_empty(), kind, "update carries no fields")?;
                task.absorb(&changes);
                (id, Some(task.update_event()))
            }
            Mutation::SetCompleted { id, completed } => {
                let task = self.live_task_mut(id)?;
                ensure(
                    task.owner == account || task.assignee.as_ref() == Some(&account),
                    kind,
                    "only the owner or assignee can change completion",
                )?;
                ensure(
                    completed || !task.reward_claimed,
                    kind,
                    "reward already claimed",
                )?;
                task.completed = completed;
                (id, None)
            }
            Mutation::Delete { id } => {
                let task = self.live_task_mut(id)?;
                ensure(task.owner == account, kind, "only the owner can delete a task")?;
                task.deleted = true;
                (id, Some(EventData::Deleted))
            }
            Mutation::Assign { id, assignee } => {
                let task = self.live_task_mut(id)?;
                ensure(task.owner == account, kind, "only the owner can assign a task")?;
                task.assignee = (!assignee.is_zero()).then_some(assignee);
                (id, None)
            }
            Mutation::AddReward { id, amount } => {
                let task = self.live_task_mut(id)?;
                ensure(amount > 0, kind, "reward amount must be positive")?;
                let total = task
                    .reward
                    .checked_add(amount)
                    .ok_or_else(|| rejected(kind, "reward overflow"))?;
                task.reward = total;
                (id, Some(task.update_event()))
            }
            Mutation::ClaimReward { id } => {
                let task = self.live_task_mut(id)?;
                ensure(
                    task.assignee.as_ref() == Some(&account),
                    kind,
                    "only the assignee can claim",
                )?;
                ensure(task.completed, kind, "task is not completed")?;
                ensure(!task.reward_claimed, kind, "reward already claimed")?;
                ensure(task.reward > 0, kind, "task carries no reward")?;
                task.reward_claimed = true;
                (id, None)
            }
        };

        let block = self.next_block();
        if let Some(data) = emitted {
            self.events.push(LedgerEvent {
                key: OrderingKey::new(block, 0),
                task_id: id,
                data,
            });
        }
        Ok(Receipt {
            block,
            task_id: Some(id),
        })
    }
}

fn rejected(kind: MutationKind, reason: &str) -> LedgerError {
    LedgerError::Rejected {
        kind,
        reason: reason.to_string(),
    }
}

fn ensure(condition: bool, kind: MutationKind, reason: &str) -> Result<(), LedgerError> {
    if condition {
        Ok(())
    } else {
        Err(rejected(kind, reason))
    }
}

/// A task contract held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    /// A fresh ledger whose writes are signed by `account`.
    #[must_use]
    pub fn new(account: impl Into<Address>) -> Self {
        Self {
            state: Mutex::new(State {
                account: account.into(),
                ..State::default()
            }),
        }
    }

    /// Switch the signing account.
    pub fn set_account(&self, account: impl Into<Address>) {
        self.state.lock().account = account.into();
    }

    /// Current block height.
    #[must_use]
    pub fn head(&self) -> u64 {
        self.state.lock().head
    }

    /// Mine `blocks` empty blocks, pushing older events out of the recent window.
    pub fn advance_blocks(&self, blocks: u64) {
        let mut state = self.state.lock();
        state.head = state.head.saturating_add(blocks);
    }

    pub fn set_lagging(&self, lagging: bool) {
        self.state.lock().lagging = lagging;
    }

    pub fn set_transport_down(&self, down: bool) {
        self.state.lock().transport_down = down;
    }

    /// The next `calls` event queries (one per kind per attempt) return nothing.
    pub fn blackout_queries(&self, calls: u32) {
        self.state.lock().blackout_queries = calls;
    }

    /// The next `calls` full-history queries return nothing while the
    /// recent window keeps answering (archive index behind the head).
    pub fn blackout_history(&self, calls: u32) {
        self.state.lock().blackout_history = calls;
    }

    pub fn fail_reads_for(&self, id: TaskId) {
        self.state.lock().failing_reads.insert(id);
    }

    pub fn clear_read_failures(&self) {
        self.state.lock().failing_reads.clear();
    }

    /// Hold the next submission until the returned gate is decided.
    #[must_use]
    pub fn hold_next_mutation(&self) -> MutationGate {
        let (tx, rx) = oneshot::channel();
        self.state.lock().gates.push_back(rx);
        MutationGate { tx }
    }

    /// Drop gates no submission has claimed yet.
    pub fn clear_gates(&self) {
        self.state.lock().gates.clear();
    }

    /// Gates still waiting for a submission to claim them.
    #[must_use]
    pub fn unclaimed_gates(&self) -> usize {
        self.state.lock().gates.len()
    }

    /// Apply a write immediately, bypassing gates and fault switches.
    ///
    /// # Errors
    ///
    /// Returns the same rejections the contract would.
    pub fn apply(&self, mutation: Mutation) -> Result<Receipt, LedgerError> {
        self.state.lock().apply(mutation)
    }

    /// Create a task directly and return its id. Fixture helper.
    pub fn seed(&self, new: NewTask) -> TaskId {
        let receipt = self.state.lock().create(new);
        receipt.task_id.unwrap_or_default()
    }

    /// Append a raw log event without going through a write.
    ///
    /// Keeps contract storage in step so canonical reads succeed for
    /// injected creations.
    pub fn inject_event(&self, event: LedgerEvent) {
        let mut state = self.state.lock();
        state.head = state.head.max(event.key.block);
        state.next_id = state.next_id.max(event.task_id.get());
        match &event.data {
            EventData::Created(data) => {
                state
                    .tasks
                    .entry(event.task_id)
                    .or_insert_with(|| StoredTask::new(data));
            }
            EventData::Updated(data) => {
                if let Some(task) = state.tasks.get_mut(&event.task_id) {
                    task.absorb(data);
                }
            }
            EventData::Deleted => {
                if let Some(task) = state.tasks.get_mut(&event.task_id) {
                    task.deleted = true;
                }
            }
        }
        state.events.push(event);
    }

    /// Every event query made so far.
    #[must_use]
    pub fn query_log(&self) -> Vec<(EventKind, RangeHint)> {
        self.state.lock().queries.clone()
    }

    #[must_use]
    pub fn events(&self) -> Vec<LedgerEvent> {
        self.state.lock().events.clone()
    }

    /// Contract storage for `id`, ignoring fault switches.
    #[must_use]
    pub fn canonical(&self, id: TaskId) -> Option<CanonicalTask> {
        self.state
            .lock()
            .tasks
            .get(&id)
            .filter(|task| !task.deleted)
            .map(|task| CanonicalTask {
                completed: task.completed,
                reward_claimed: task.reward_claimed,
                assignee: task.assignee.clone(),
            })
    }

    /// Ids that exist and are not deleted.
    #[must_use]
    pub fn live_ids(&self) -> BTreeSet<TaskId> {
        self.state
            .lock()
            .tasks
            .iter()
            .filter(|(_, task)| !task.deleted)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn query_events(
        &self,
        kind: EventKind,
        range: RangeHint,
    ) -> Result<Vec<LedgerEvent>, LedgerError> {
        let mut state = self.state.lock();
        state.queries.push((kind, range));
        if state.transport_down {
            return Err(LedgerError::Transport("rpc endpoint unreachable".into()));
        }
        if state.blackout_queries > 0 {
            state.blackout_queries -= 1;
            return Ok(Vec::new());
        }
        if range == RangeHint::All && state.blackout_history > 0 {
            state.blackout_history -= 1;
            return Ok(Vec::new());
        }
        let floor = match range {
            RangeHint::Recent { .. } if state.lagging => return Ok(Vec::new()),
            RangeHint::Recent { blocks } => state.head.saturating_sub(blocks),
            RangeHint::All => 0,
        };
        let mut events: Vec<LedgerEvent> = state
            .events
            .iter()
            .filter(|event| event.kind() == kind && event.key.block > floor)
            .cloned()
            .collect();
        events.sort_by_key(|event| event.key);
        Ok(events)
    }

    async fn get_task(&self, id: TaskId) -> Result<CanonicalTask, LedgerError> {
        {
            let state = self.state.lock();
            if state.transport_down {
                return Err(LedgerError::Transport("rpc endpoint unreachable".into()));
            }
            if state.failing_reads.contains(&id) {
                return Err(LedgerError::Transport(format!(
                    "eth_call for task {id} timed out"
                )));
            }
        }
        self.canonical(id).ok_or(LedgerError::NotFound(id))
    }

    async fn submit_mutation(&self, mutation: Mutation) -> Result<Receipt, LedgerError> {
        let gate = {
            let mut state = self.state.lock();
            if state.transport_down {
                return Err(LedgerError::Transport("rpc endpoint unreachable".into()));
            }
            state.gates.pop_front()
        };
        if let Some(gate) = gate {
            match gate.await {
                Ok(GateDecision::Confirm) => {}
                Ok(GateDecision::Fail(error)) => return Err(error),
                Err(_) => {
                    return Err(LedgerError::Transport(
                        "confirmation channel closed".into(),
                    ));
                }
            }
        }
        self.apply(mutation)
    }
}
