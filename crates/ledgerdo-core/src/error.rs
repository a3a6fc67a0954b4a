use std::fmt;

/// Machine-readable error codes surfaced alongside user notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    TaskNotFound,
    LedgerUnavailable,
    CanonicalReadFailed,
    InconclusiveSnapshot,
    MutationRejected,
    MutationDeclined,
    MutationReverted,
    SupersededResult,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::TaskNotFound => "E2001",
            Self::LedgerUnavailable => "E3001",
            Self::CanonicalReadFailed => "E3002",
            Self::InconclusiveSnapshot => "E3003",
            Self::MutationRejected => "E4001",
            Self::MutationDeclined => "E4002",
            Self::MutationReverted => "E4003",
            Self::SupersededResult => "E4004",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and notifications.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::TaskNotFound => "Task not found",
            Self::LedgerUnavailable => "Ledger unreachable",
            Self::CanonicalReadFailed => "Task state could not be read from the ledger",
            Self::InconclusiveSnapshot => "Ledger returned no tasks",
            Self::MutationRejected => "Transaction rejected",
            Self::MutationDeclined => "Transaction declined",
            Self::MutationReverted => "Transaction reverted",
            Self::SupersededResult => "Result superseded by a newer request",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint shown next to the notification.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in the ledgerdo config.toml and retry."),
            Self::TaskNotFound => None,
            Self::LedgerUnavailable => Some("Check the RPC endpoint and retry with backoff."),
            Self::CanonicalReadFailed => {
                Some("The task is hidden until the next refresh can read it.")
            }
            Self::InconclusiveSnapshot => {
                Some("The indexer may be lagging behind the chain; refresh again shortly.")
            }
            Self::MutationRejected => Some("Check that you own the task and it is in a valid state."),
            Self::MutationDeclined => Some("Approve the transaction in your wallet to apply it."),
            Self::MutationReverted => Some("Inspect the transaction on a block explorer."),
            Self::SupersededResult => None,
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
