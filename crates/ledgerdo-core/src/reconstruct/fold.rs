//! Pure replay of the task log into live task values.
//!
//! # Algorithm
//!
//! 1. Partition events by kind.
//! 2. Collect every deleted id. Deletion is terminal: a deleted id is
//!    excluded no matter what else the log says about it.
//! 3. Per id, keep only the `Updated` event with the highest ordering key.
//!    Earlier updates are discarded, not merged field by field.
//! 4. Per surviving `Created` id, start from the creation fields and
//!    overwrite with whatever the latest update carries.
//!
//! Precedence is decided by ordering keys alone, so the result does not
//! depend on the order events arrive in.

use std::collections::{BTreeMap, BTreeSet};

use crate::event::{CreatedData, EventData, LedgerEvent, OrderingKey, UpdatedData};
use crate::model::{Task, TaskId};

/// Result of folding an event batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fold {
    /// Live tasks with event-sourced fields filled in. Ledger-held flags
    /// (`completed`, `reward_claimed`, `assignee`) are still cleared.
    pub tasks: BTreeMap<TaskId, Task>,
    /// Every id that appeared in a `Deleted` event.
    pub deleted: BTreeSet<TaskId>,
    /// Number of events folded.
    pub event_count: usize,
}

/// Fold an event batch into live tasks.
///
/// Duplicate `Created` events for one id keep the lowest key. `Updated`
/// events for ids that were never created are ignored.
pub fn fold_events<'a, I>(events: I) -> Fold
where
    I: IntoIterator<Item = &'a LedgerEvent>,
{
    let mut created: BTreeMap<TaskId, (OrderingKey, &'a CreatedData)> = BTreeMap::new();
    let mut latest: BTreeMap<TaskId, (OrderingKey, &'a UpdatedData)> = BTreeMap::new();
    let mut deleted: BTreeSet<TaskId> = BTreeSet::new();
    let mut event_count = 0;

    for event in events {
        event_count += 1;
        match &event.data {
            EventData::Created(data) => {
                created
                    .entry(event.task_id)
                    .and_modify(|slot| {
                        if event.key < slot.0 {
                            *slot = (event.key, data);
                        }
                    })
                    .or_insert((event.key, data));
            }
            EventData::Updated(data) => {
                latest
                    .entry(event.task_id)
                    .and_modify(|slot| {
                        if event.key > slot.0 {
                            *slot = (event.key, data);
                        }
                    })
                    .or_insert((event.key, data));
            }
            EventData::Deleted => {
                deleted.insert(event.task_id);
            }
        }
    }

    let tasks = created
        .into_iter()
        .filter(|(id, _)| !deleted.contains(id))
        .map(|(id, (key, data))| {
            let mut task = Task::from_created(id, key, data);
            if let Some((_, update)) = latest.get(&id) {
                update.apply_to(&mut task);
            }
            (id, task)
        })
        .collect();

    Fold {
        tasks,
        deleted,
        event_count,
    }
}
