#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use ledgerdo_core::config::{LedgerdoConfig, ReconstructConfig, SessionConfig};
use ledgerdo_core::event::{CreatedData, LedgerEvent, OrderingKey, UpdatedData};
use ledgerdo_core::ledger::{MemoryLedger, NewTask};
use ledgerdo_core::model::{Address, Priority, TaskId, from_unix_seconds};
use ledgerdo_core::TaskSession;

pub const OWNER: &str = "0xa11ce00000000000000000000000000000000001";
pub const DEADLINE_BASE: i64 = 1_800_000_000;

pub fn deadline(days: i64) -> DateTime<Utc> {
    from_unix_seconds(DEADLINE_BASE) + Duration::days(days)
}

pub fn new_task(title: &str) -> NewTask {
    NewTask {
        title: title.into(),
        description: format!("{title} description"),
        category: "general".into(),
        priority: Priority::Medium,
        deadline: deadline(1),
        reward: 10,
    }
}

pub fn created(id: u64, block: u64, title: &str) -> LedgerEvent {
    created_due(id, block, title, deadline(1))
}

pub fn created_due(id: u64, block: u64, title: &str, due: DateTime<Utc>) -> LedgerEvent {
    LedgerEvent::created(
        OrderingKey::new(block, 0),
        TaskId::new(id),
        CreatedData {
            owner: Address::new(OWNER),
            title: title.into(),
            description: String::new(),
            category: "general".into(),
            priority: Priority::Low,
            deadline: due,
            reward: 0,
            created_at: from_unix_seconds(1_700_000_000),
        },
    )
}

pub fn retitled(id: u64, block: u64, title: &str) -> LedgerEvent {
    LedgerEvent::updated(
        OrderingKey::new(block, 0),
        TaskId::new(id),
        UpdatedData {
            title: Some(title.into()),
            ..UpdatedData::default()
        },
    )
}

pub fn deleted(id: u64, block: u64) -> LedgerEvent {
    LedgerEvent::deleted(OrderingKey::new(block, 0), TaskId::new(id))
}

/// Defaults with the retry delay shortened so tests stay fast.
pub fn test_config() -> LedgerdoConfig {
    LedgerdoConfig {
        reconstruct: ReconstructConfig {
            empty_retry_delay_ms: 1,
            ..ReconstructConfig::default()
        },
        session: SessionConfig::default(),
    }
}

pub fn ledger() -> Arc<MemoryLedger> {
    Arc::new(MemoryLedger::new(OWNER))
}

pub fn session(ledger: &Arc<MemoryLedger>) -> Arc<TaskSession<MemoryLedger>> {
    Arc::new(TaskSession::new(Arc::clone(ledger), test_config()))
}

/// Yield until every held gate has been claimed by a submission.
pub async fn until_submitted(ledger: &MemoryLedger) {
    for _ in 0..1_000 {
        if ledger.unclaimed_gates() == 0 {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("submission never reached the ledger");
}

pub fn visible_ids(session: &TaskSession<MemoryLedger>) -> Vec<u64> {
    session.with_board(|board| board.tasks().map(|t| t.id.get()).collect())
}

pub fn is_completed(session: &TaskSession<MemoryLedger>, id: TaskId) -> Option<bool> {
    session.with_board(|board| board.get(id).map(|t| t.completed))
}
