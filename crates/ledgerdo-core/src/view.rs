//! Read-only projection of the board into what the interface lists.
//!
//! Filtering and sorting never touch the board itself. Every sort key ends
//! with id ascending so equal keys always come out in the same order.

use anyhow::{Result, bail};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::model::{Address, Task};

// ---------------------------------------------------------------------------
// Status filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusFilter {
    #[default]
    All,
    /// Created by the viewer.
    Mine,
    Completed,
    /// Not yet completed.
    Active,
    /// Delegated to the viewer.
    Assigned,
}

impl StatusFilter {
    fn matches(self, task: &Task, viewer: Option<&Address>) -> bool {
        match self {
            Self::All => true,
            Self::Mine => viewer.is_some_and(|who| task.is_owned_by(who)),
            Self::Completed => task.completed,
            Self::Active => !task.completed,
            Self::Assigned => viewer.is_some_and(|who| task.is_assigned_to(who)),
        }
    }
}

impl fmt::Display for StatusFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Mine => f.write_str("mine"),
            Self::Completed => f.write_str("completed"),
            Self::Active => f.write_str("active"),
            Self::Assigned => f.write_str("assigned"),
        }
    }
}

impl FromStr for StatusFilter {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "mine" | "owned" => Ok(Self::Mine),
            "completed" | "done" => Ok(Self::Completed),
            "active" | "open" | "pending" => Ok(Self::Active),
            "assigned" => Ok(Self::Assigned),
            other => bail!(
                "unknown status filter '{other}': expected one of all, mine, completed, active, assigned"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Most recently created first.
    #[default]
    Newest,
    Oldest,
    /// Earliest deadline first.
    Deadline,
    /// Largest reward first.
    Reward,
}

impl SortKey {
    fn compare(self, a: &Task, b: &Task) -> Ordering {
        let primary = match self {
            Self::Newest => b.created_key.cmp(&a.created_key),
            Self::Oldest => a.created_key.cmp(&b.created_key),
            Self::Deadline => a.deadline.cmp(&b.deadline),
            Self::Reward => b.reward.cmp(&a.reward),
        };
        primary.then_with(|| a.id.cmp(&b.id))
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Newest => f.write_str("newest"),
            Self::Oldest => f.write_str("oldest"),
            Self::Deadline => f.write_str("deadline"),
            Self::Reward => f.write_str("reward"),
        }
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" | "created_desc" | "created-desc" => Ok(Self::Newest),
            "oldest" | "created_asc" | "created-asc" => Ok(Self::Oldest),
            "deadline" | "due" => Ok(Self::Deadline),
            "reward" | "bounty" => Ok(Self::Reward),
            other => bail!(
                "unknown sort key '{other}': expected one of newest, oldest, deadline, reward"
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Filter context
// ---------------------------------------------------------------------------

/// Filter criteria for the task list, combined with AND semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewFilter {
    pub status: StatusFilter,
    /// Connected account. `Mine` and `Assigned` match nothing without one.
    pub viewer: Option<Address>,
    /// Case-insensitive substring over title, description and category.
    pub search: Option<String>,
    pub sort: SortKey,
}

impl ViewFilter {
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if !self.status.matches(task, self.viewer.as_ref()) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [&task.title, &task.description, &task.category]
                    .iter()
                    .any(|field| field.to_lowercase().contains(&needle))
            }
        }
    }
}

/// Filter and sort `tasks` into a fresh list.
pub fn derive_view<'a, I>(tasks: I, filter: &ViewFilter) -> Vec<Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    let mut view: Vec<Task> = tasks
        .into_iter()
        .filter(|task| filter.matches(task))
        .cloned()
        .collect();
    view.sort_by(|a, b| filter.sort.compare(a, b));
    view
}
