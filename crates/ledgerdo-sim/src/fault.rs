use serde::{Deserialize, Serialize};

use ledgerdo_core::ledger::LedgerError;

use crate::rng::DeterministicRng;

/// Per-round fault probabilities, all in percent (0-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// A held write is failed instead of confirmed.
    pub fail_percent: u8,
    /// Of the failed writes, how many are user declines rather than reverts.
    pub decline_percent: u8,
    /// The indexer lags for the round: recent-window queries come back empty.
    pub lag_percent: u8,
    /// One visible task's canonical read times out for the round.
    pub read_failure_percent: u8,
    /// The next full reconstruction attempt sees an empty log.
    pub blackout_percent: u8,
    /// The RPC endpoint is unreachable for the refresh step.
    pub outage_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            fail_percent: 30,
            decline_percent: 50,
            lag_percent: 10,
            read_failure_percent: 5,
            blackout_percent: 5,
            outage_percent: 3,
        }
    }
}

impl FaultConfig {
    /// A configuration that never injects anything.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            fail_percent: 0,
            decline_percent: 0,
            lag_percent: 0,
            read_failure_percent: 0,
            blackout_percent: 0,
            outage_percent: 0,
        }
    }

    /// Decide how a held write resolves. `None` means confirm.
    pub fn roll_failure(&self, rng: &mut DeterministicRng, round: u64) -> Option<LedgerError> {
        if !rng.chance(self.fail_percent) {
            return None;
        }
        if rng.chance(self.decline_percent) {
            return Some(LedgerError::Declined);
        }
        if rng.chance(20) {
            return Some(LedgerError::Transport(format!(
                "receipt polling timed out in round {round}"
            )));
        }
        Some(LedgerError::Reverted("execution reverted".into()))
    }
}
