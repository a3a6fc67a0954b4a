use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::event::{CreatedData, OrderingKey};

/// Ledger-assigned task identifier.
///
/// Ids are handed out monotonically by the contract and never reused, so a
/// deleted id stays dead for the rest of the session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for TaskId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl FromStr for TaskId {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
        digits.parse::<u64>().map(Self).map_err(|_| ParseEnumError {
            expected: "task id",
            got: s.to_string(),
        })
    }
}

/// An account identity (owner or assignee).
///
/// Stored lowercase so that checksummed and plain hex spellings of the same
/// account compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Address(String);

impl Address {
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_ascii_lowercase())
    }

    /// Parse an assignee slot, mapping the empty and all-zero address to
    /// "unassigned".
    #[must_use]
    pub fn assignee(raw: impl AsRef<str>) -> Option<Self> {
        let address = Self::new(raw);
        (!address.is_zero()).then_some(address)
    }

    /// True for the empty string and for `0x000…0`.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        let digits = self.0.strip_prefix("0x").unwrap_or(&self.0);
        digits.chars().all(|c| c == '0')
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Task priority. The contract encodes it as `0 | 1 | 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    Low,
    Medium,
    High,
}

impl Priority {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Numeric encoding used on the ledger.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    #[must_use]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Low),
            1 => Some(Self::Medium),
            2 => Some(Self::High),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "0" => Ok(Self::Low),
            "medium" | "1" => Ok(Self::Medium),
            "high" | "2" => Ok(Self::High),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

/// A reconstructed task as shown to the interface.
///
/// `completed`, `reward_claimed` and `assignee` come from the ledger's
/// point-in-time read, everything else from the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub owner: Address,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: Priority,
    pub deadline: DateTime<Utc>,
    /// Reward in the ledger's smallest currency unit.
    pub reward: u128,
    pub assignee: Option<Address>,
    pub completed: bool,
    pub reward_claimed: bool,
    pub created_at: DateTime<Utc>,
    /// Ordering key of the creation event; drives newest/oldest sorting.
    pub created_key: OrderingKey,
}

impl Task {
    /// Materialise a task from its creation event. Ledger-held flags start
    /// cleared until the canonical read fills them in.
    #[must_use]
    pub fn from_created(id: TaskId, key: OrderingKey, data: &CreatedData) -> Self {
        Self {
            id,
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
            created_at: data.created_at,
            created_key: key,
        }
    }

    #[must_use]
    pub fn is_owned_by(&self, who: &Address) -> bool {
        self.owner == *who
    }

    #[must_use]
    pub fn is_assigned_to(&self, who: &Address) -> bool {
        self.assignee.as_ref() == Some(who)
    }

    /// Past its deadline and still open.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        !self.completed && self.deadline < now
    }

    /// Open, not yet overdue, and due within `window` of `now`.
    #[must_use]
    pub fn is_due_within(&self, now: DateTime<Utc>, window: chrono::Duration) -> bool {
        !self.completed && self.deadline > now && self.deadline - now < window
    }

    /// The assignee may claim the reward once the task is completed.
    #[must_use]
    pub fn reward_claimable(&self) -> bool {
        self.completed && self.assignee.is_some() && !self.reward_claimed && self.reward > 0
    }
}

/// Convert ledger unix seconds into a UTC timestamp, clamping values chrono
/// cannot represent to the epoch.
#[must_use]
pub fn from_unix_seconds(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

#[cfg(test)]
mod tests {
    use super::{Address, Priority, Task, TaskId, from_unix_seconds};
    use crate::event::{CreatedData, OrderingKey};
    use std::str::FromStr;

    fn sample() -> Task {
        let data = CreatedData {
            owner: Address::new("0xAbC0000000000000000000000000000000000001"),
            title: "Ship release".into(),
            description: "Tag and publish".into(),
            category: "ops".into(),
            priority: Priority::High,
            deadline: from_unix_seconds(1_700_000_000),
            reward: 5,
            created_at: from_unix_seconds(1_699_000_000),
        };
        Task::from_created(TaskId::new(4), OrderingKey::new(10, 2), &data)
    }

    #[test]
    fn address_comparison_ignores_case() {
        let upper = Address::new("0xABCDEF");
        let lower = Address::new("0xabcdef");
        assert_eq!(upper, lower);
        assert_eq!(upper.as_str(), "0xabcdef");
    }

    #[test]
    fn zero_address_means_unassigned() {
        assert!(Address::assignee("0x0000000000000000000000000000000000000000").is_none());
        assert!(Address::assignee("").is_none());
        assert_eq!(
            Address::assignee("0x01").map(|a| a.to_string()),
            Some("0x01".to_string())
        );
    }

    #[test]
    fn address_deserialization_normalises() {
        let parsed: Address = serde_json::from_str("\"0xDEADbeef\"").expect("parse");
        assert_eq!(parsed.as_str(), "0xdeadbeef");
    }

    #[test]
    fn priority_parses_names_and_codes() {
        assert_eq!(Priority::from_str("HIGH").expect("parse"), Priority::High);
        assert_eq!(Priority::from_str("1").expect("parse"), Priority::Medium);
        assert_eq!(Priority::from_code(2), Some(Priority::High));
        assert_eq!(Priority::from_code(7), None);
        assert!(Priority::from_str("urgent").is_err());
        for p in [Priority::Low, Priority::Medium, Priority::High] {
            assert_eq!(Priority::from_code(p.code()), Some(p));
            assert_eq!(Priority::from_str(&p.to_string()).expect("parse"), p);
        }
    }

    #[test]
    fn task_id_display_and_parse() {
        let id = TaskId::new(42);
        assert_eq!(id.to_string(), "#42");
        assert_eq!(TaskId::from_str("#42").expect("parse"), id);
        assert_eq!(TaskId::from_str(" 42 ").expect("parse"), id);
        assert!(TaskId::from_str("abc").is_err());
    }

    #[test]
    fn from_created_leaves_ledger_flags_cleared() {
        let task = sample();
        assert!(!task.completed);
        assert!(!task.reward_claimed);
        assert!(task.assignee.is_none());
        assert_eq!(task.created_key, OrderingKey::new(10, 2));
    }

    #[test]
    fn overdue_and_due_soon() {
        let mut task = sample();
        let deadline = task.deadline;
        assert!(task.is_overdue(deadline + chrono::Duration::seconds(1)));
        assert!(!task.is_overdue(deadline - chrono::Duration::seconds(1)));
        assert!(task.is_due_within(
            deadline - chrono::Duration::hours(2),
            chrono::Duration::hours(24)
        ));
        assert!(!task.is_due_within(
            deadline - chrono::Duration::hours(30),
            chrono::Duration::hours(24)
        ));
        task.completed = true;
        assert!(!task.is_overdue(deadline + chrono::Duration::seconds(1)));
    }

    #[test]
    fn reward_claimable_requires_completion_and_assignee() {
        let mut task = sample();
        assert!(!task.reward_claimable());
        task.completed = true;
        assert!(!task.reward_claimable());
        task.assignee = Address::assignee("0x02");
        assert!(task.reward_claimable());
        task.reward_claimed = true;
        assert!(!task.reward_claimable());
    }
}
