//! End-to-end reconstruction through `TaskSession` and `MemoryLedger`.

#[path = "fixtures.rs"]
mod fixtures;

use fixtures::*;
use ledgerdo_core::ErrorCode;
use ledgerdo_core::event::{EventKind, UpdatedData, parse_lines, write_lines};
use ledgerdo_core::ledger::RangeHint;
use ledgerdo_core::model::TaskId;
use ledgerdo_core::reconstruct::{Reconstruction, Reconstructor, SnapshotRequest};
use ledgerdo_core::session::{Notice, RefreshOutcome};
use ledgerdo_core::view::{SortKey, ViewFilter};
use std::sync::Arc;

#[tokio::test]
async fn interleaved_log_leaves_only_surviving_task() {
    let ledger = ledger();
    for event in [
        created(1, 1, "A"),
        retitled(1, 5, "B"),
        created(2, 2, "C"),
        deleted(1, 6),
    ] {
        ledger.inject_event(event);
    }
    let session = session(&ledger);

    let outcome = session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    assert_eq!(
        outcome,
        RefreshOutcome::Installed {
            tasks: 1,
            dropped: Vec::new()
        }
    );
    let tasks = session.view(&ViewFilter::default());
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].id, TaskId::new(2));
    assert_eq!(tasks[0].title, "C");
}

#[tokio::test]
async fn latest_update_wins_by_key() {
    let ledger = ledger();
    ledger.inject_event(created(1, 1, "orig"));
    // Arrival order differs from key order.
    ledger.inject_event(retitled(1, 4, "from key 4"));
    ledger.inject_event(retitled(1, 2, "from key 2"));
    ledger.inject_event(retitled(1, 3, "from key 3"));
    let session = session(&ledger);
    session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    let title = session.with_board(|b| b.get(TaskId::new(1)).map(|t| t.title.clone()));
    assert_eq!(title.as_deref(), Some("from key 4"));
}

#[tokio::test]
async fn deadline_sort_breaks_ties_on_id() {
    let ledger = ledger();
    ledger.inject_event(created_due(7, 1, "seven", deadline(3)));
    ledger.inject_event(created_due(2, 2, "two", deadline(1)));
    ledger.inject_event(created_due(9, 3, "nine", deadline(1)));
    let session = session(&ledger);
    session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");

    let filter = ViewFilter {
        sort: SortKey::Deadline,
        ..ViewFilter::default()
    };
    let order: Vec<u64> = session.view(&filter).iter().map(|t| t.id.get()).collect();
    assert_eq!(order, vec![2, 9, 7]);
}

#[tokio::test]
async fn empty_recent_window_falls_back_to_full_history() {
    let ledger = ledger();
    for title in ["a", "b", "c"] {
        ledger.seed(new_task(title));
    }
    ledger.advance_blocks(100_000);
    let session = session(&ledger);

    let outcome = session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    assert!(matches!(outcome, RefreshOutcome::Installed { tasks: 3, .. }));

    let ranges: Vec<RangeHint> = ledger.query_log().into_iter().map(|(_, r)| r).collect();
    assert_eq!(ranges.len(), 6);
    assert!(matches!(ranges[0], RangeHint::Recent { .. }));
    assert_eq!(ranges[5], RangeHint::All);
}

#[tokio::test]
async fn editing_an_old_task_keeps_the_whole_board() {
    let ledger = ledger();
    let first = ledger.seed(new_task("first"));
    let second = ledger.seed(new_task("second"));
    ledger.advance_blocks(100_000);
    let session = session(&ledger);
    session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    assert_eq!(visible_ids(&session), vec![first.get(), second.get()]);

    // The update is the only event inside the recent window.
    session
        .update(
            first,
            UpdatedData {
                title: Some("first, renamed".into()),
                ..UpdatedData::default()
            },
        )
        .await
        .expect("update");

    assert_eq!(visible_ids(&session), vec![first.get(), second.get()]);
    let title = session.with_board(|b| b.get(first).map(|t| t.title.clone()));
    assert_eq!(title.as_deref(), Some("first, renamed"));
}

#[tokio::test]
async fn creation_after_a_quiet_stretch_keeps_older_tasks() {
    let ledger = ledger();
    let old = ledger.seed(new_task("old"));
    ledger.advance_blocks(100_000);
    let session = session(&ledger);
    let receipt = session.create(new_task("new")).await.expect("create");
    let new = receipt.task_id.expect("assigned id");
    assert_eq!(visible_ids(&session), vec![old.get(), new.get()]);
}

#[tokio::test]
async fn lagging_indexer_is_bypassed_by_full_query() {
    let ledger = ledger();
    ledger.seed(new_task("a"));
    ledger.set_lagging(true);
    let session = session(&ledger);
    let outcome = session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    assert!(matches!(outcome, RefreshOutcome::Installed { tasks: 1, .. }));
}

#[tokio::test]
async fn inconclusive_result_leaves_board_untouched() {
    let ledger = ledger();
    let id = ledger.seed(new_task("a"));
    let session = session(&ledger);
    session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    let mut notices = session.subscribe();

    // Three kinds per round: window, full history, one retry.
    ledger.blackout_queries(9);
    let outcome = session
        .refresh(SnapshotRequest::default().expecting_tasks())
        .await
        .expect("refresh");
    assert_eq!(outcome, RefreshOutcome::Inconclusive { attempts: 3 });
    assert!(session.with_board(|b| b.contains(id)));
    assert_eq!(
        notices.try_recv().expect("notice"),
        Notice::Inconclusive { attempts: 3 }
    );
}

#[tokio::test]
async fn empty_ledger_without_hint_is_authoritative() {
    let ledger = ledger();
    let session = session(&ledger);
    let outcome = session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    assert_eq!(
        outcome,
        RefreshOutcome::Installed {
            tasks: 0,
            dropped: Vec::new()
        }
    );
}

#[tokio::test]
async fn transport_failure_aborts_without_partial_state() {
    let ledger = ledger();
    ledger.seed(new_task("a"));
    let session = session(&ledger);
    session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    let before = visible_ids(&session);
    let mut notices = session.subscribe();

    ledger.set_transport_down(true);
    let err = session
        .refresh(SnapshotRequest::default())
        .await
        .expect_err("transport down");
    assert_eq!(err.code(), ErrorCode::LedgerUnavailable);
    assert_eq!(visible_ids(&session), before);
    assert_eq!(
        notices.try_recv().expect("notice").code(),
        Some(ErrorCode::LedgerUnavailable)
    );
}

#[tokio::test]
async fn unreadable_task_is_dropped_and_reported() {
    let ledger = ledger();
    let a = ledger.seed(new_task("a"));
    let b = ledger.seed(new_task("b"));
    let c = ledger.seed(new_task("c"));
    ledger.fail_reads_for(b);
    let session = session(&ledger);
    let mut notices = session.subscribe();

    let outcome = session
        .refresh(SnapshotRequest::default())
        .await
        .expect("refresh");
    assert_eq!(
        outcome,
        RefreshOutcome::Installed {
            tasks: 2,
            dropped: vec![b]
        }
    );
    assert_eq!(visible_ids(&session), vec![a.get(), c.get()]);
    assert_eq!(
        notices.try_recv().expect("notice"),
        Notice::Dropped { ids: vec![b] }
    );

    // The next pass picks it up again.
    ledger.clear_read_failures();
    session.refresh_current().await.expect("refresh");
    assert_eq!(visible_ids(&session), vec![a.get(), b.get(), c.get()]);
}

#[tokio::test]
async fn recorded_log_replays_identically() {
    let ledger = ledger();
    let id = ledger.seed(new_task("a"));
    ledger.seed(new_task("b"));
    ledger
        .apply(ledgerdo_core::ledger::Mutation::Delete { id })
        .expect("delete");

    let recorded = write_lines(&ledger.events()).expect("encode");
    let replayed = ledgerdo_core::MemoryLedger::new(OWNER);
    for event in parse_lines(&recorded).expect("decode") {
        replayed.inject_event(event);
    }

    let request = SnapshotRequest::default();
    let config = test_config().reconstruct;
    let original = Reconstructor::new(Arc::clone(&ledger), config.clone())
        .reconstruct(&request)
        .await
        .expect("original");
    let copy = Reconstructor::new(Arc::new(replayed), config)
        .reconstruct(&request)
        .await
        .expect("replayed");

    let (Reconstruction::Ready(original), Reconstruction::Ready(copy)) = (original, copy) else {
        panic!("both logs hold tasks");
    };
    assert_eq!(original.tasks, copy.tasks);
    assert_eq!(original.deleted, copy.deleted);
    assert!(
        ledger
            .query_log()
            .iter()
            .any(|(kind, _)| *kind == EventKind::Deleted)
    );
}
