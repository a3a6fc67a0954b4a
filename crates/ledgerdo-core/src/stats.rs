//! Dashboard counters over a task list.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::model::{Priority, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TaskStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Open and past the deadline.
    pub overdue: usize,
    /// Open and due within the urgent window.
    pub urgent: usize,
    pub total_reward: u128,
    /// Reward attached to completed tasks.
    pub earned_reward: u128,
    /// Percent of tasks completed, rounded half up. Zero for an empty list.
    pub completion_rate: u8,
    pub high_priority_pending: usize,
}

impl TaskStats {
    #[must_use]
    pub fn compute<'a, I>(tasks: I, now: DateTime<Utc>, urgent_window: Duration) -> Self
    where
        I: IntoIterator<Item = &'a Task>,
    {
        let mut stats = Self::default();
        for task in tasks {
            stats.total += 1;
            stats.total_reward = stats.total_reward.saturating_add(task.reward);
            if task.completed {
                stats.completed += 1;
                stats.earned_reward = stats.earned_reward.saturating_add(task.reward);
                continue;
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
            if task.is_due_within(now, urgent_window) {
                stats.urgent += 1;
            }
            if task.priority == Priority::High {
                stats.high_priority_pending += 1;
            }
        }
        stats.pending = stats.total - stats.completed;
        stats.completion_rate = completion_rate(stats.completed, stats.total);
        stats
    }
}

fn completion_rate(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let rate = (completed * 200 + total) / (2 * total);
    u8::try_from(rate).unwrap_or(100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CreatedData, OrderingKey};
    use crate::model::{Address, TaskId, from_unix_seconds};

    const NOW: i64 = 1_750_000_000;

    fn task(id: u64, deadline_offset: Duration, reward: u128) -> Task {
        let data = CreatedData {
            owner: Address::new("0xa11ce"),
            title: format!("task {id}"),
            priority: Priority::Low,
            deadline: from_unix_seconds(NOW) + deadline_offset,
            reward,
            ..CreatedData::default()
        };
        Task::from_created(TaskId::new(id), OrderingKey::new(id, 0), &data)
    }

    #[test]
    fn empty_list_has_zero_rate() {
        let stats = TaskStats::compute(&[], from_unix_seconds(NOW), Duration::hours(24));
        assert_eq!(stats, TaskStats::default());
    }

    #[test]
    fn counts_follow_dashboard_rules() {
        let mut done = task(1, Duration::hours(-5), 10);
        done.completed = true;
        let overdue = task(2, Duration::hours(-1), 20);
        let mut urgent = task(3, Duration::hours(3), 30);
        urgent.priority = Priority::High;
        let later = task(4, Duration::days(3), 40);

        let stats = TaskStats::compute(
            &[done, overdue, urgent, later],
            from_unix_seconds(NOW),
            Duration::hours(24),
        );
        assert_eq!(stats.total, 4);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.overdue, 1);
        assert_eq!(stats.urgent, 1);
        assert_eq!(stats.total_reward, 100);
        assert_eq!(stats.earned_reward, 10);
        assert_eq!(stats.completion_rate, 25);
        assert_eq!(stats.high_priority_pending, 1);
    }

    #[test]
    fn completion_rate_rounds_half_up() {
        assert_eq!(completion_rate(1, 3), 33);
        assert_eq!(completion_rate(2, 3), 67);
        assert_eq!(completion_rate(1, 8), 13);
        assert_eq!(completion_rate(5, 5), 100);
    }
}
