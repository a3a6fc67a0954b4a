//! Event kind enum for the three task log events.
//!
//! String form follows the `task.<verb>` convention used for log fixtures
//! and notifications.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kinds of event the task contract emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A new task was created.
    #[serde(rename = "task.created")]
    Created,
    /// Title, description, category, priority, deadline or reward changed.
    #[serde(rename = "task.updated")]
    Updated,
    /// The task was deleted. Terminal.
    #[serde(rename = "task.deleted")]
    Deleted,
}

impl EventKind {
    /// All kinds, in the order the reconstructor queries them.
    pub const ALL: [Self; 3] = [Self::Created, Self::Updated, Self::Deleted];

    /// Return the canonical string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "task.created",
            Self::Updated => "task.updated",
            Self::Deleted => "task.deleted",
        }
    }
}

/// Error returned when parsing an unknown event kind string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind {
    /// The unrecognised input string.
    pub raw: String,
}

impl fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown event kind '{}': expected one of task.created, task.updated, task.deleted",
            self.raw
        )
    }
}

impl std::error::Error for UnknownEventKind {}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task.created" => Ok(Self::Created),
            "task.updated" => Ok(Self::Updated),
            "task.deleted" => Ok(Self::Deleted),
            _ => Err(UnknownEventKind { raw: s.to_string() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_fromstr_roundtrip() {
        for kind in EventKind::ALL {
            let parsed: EventKind = kind.to_string().parse().expect("should parse");
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn serde_uses_dotted_names() {
        let json = serde_json::to_string(&EventKind::Deleted).expect("serialize");
        assert_eq!(json, "\"task.deleted\"");
        let back: EventKind = serde_json::from_str("\"task.updated\"").expect("deserialize");
        assert_eq!(back, EventKind::Updated);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = "task.moved".parse::<EventKind>().expect_err("should fail");
        assert_eq!(err.raw, "task.moved");
        assert!(err.to_string().contains("task.moved"));
        assert!("Created".parse::<EventKind>().is_err());
    }
}
