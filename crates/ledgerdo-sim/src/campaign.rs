//! Campaign runner: many seeds, one report.
//!
//! Every seed is an independent simulation. The first failing seed is kept
//! so it can be replayed with [`replay_seed`].

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use ledgerdo_core::config::ReconstructConfig;

use crate::fault::FaultConfig;
use crate::oracle::InvariantViolation;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Parameters shared by every seed of a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Seeds to execute, e.g. `0..100`.
    pub seed_range: Range<u64>,
    pub rounds: u64,
    pub initial_tasks: usize,
    pub edits_per_round: usize,
    pub plain_write_percent: u8,
    pub reconstruct: ReconstructConfig,
    pub fault: FaultConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        let sim = SimulationConfig::default();
        Self {
            seed_range: 0..100,
            rounds: sim.rounds,
            initial_tasks: sim.initial_tasks,
            edits_per_round: sim.edits_per_round,
            plain_write_percent: sim.plain_write_percent,
            reconstruct: sim.reconstruct,
            fault: sim.fault,
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: self.rounds,
            initial_tasks: self.initial_tasks,
            edits_per_round: self.edits_per_round,
            plain_write_percent: self.plain_write_percent,
            reconstruct: self.reconstruct.clone(),
            fault: self.fault,
        }
    }

    /// # Errors
    ///
    /// Returns an error if any parameter is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.edits_per_round == 0 {
            bail!("edits_per_round must be > 0");
        }
        let f = &self.fault;
        for (name, value) in [
            ("fail_percent", f.fail_percent),
            ("decline_percent", f.decline_percent),
            ("lag_percent", f.lag_percent),
            ("read_failure_percent", f.read_failure_percent),
            ("blackout_percent", f.blackout_percent),
            ("outage_percent", f.outage_percent),
            ("plain_write_percent", self.plain_write_percent),
        ] {
            if value > 100 {
                bail!("{name} must be at most 100, got {value}");
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed, for replay.
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that hit a superseded result, rollback, inconclusive replay or
    /// dropped task at least once.
    pub interesting_states_reached: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every seed in the config.
///
/// # Errors
///
/// Returns an error if validation fails or a simulation hits an internal
/// error. Invariant violations are reported, not returned.
pub async fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;

    let mut report = CampaignReport {
        seeds_run: 0,
        seeds_passed: 0,
        first_failure: None,
        failures: Vec::new(),
        interesting_states_reached: 0,
    };

    for seed in config.seed_range.clone() {
        report.seeds_run += 1;
        let result = replay_seed(seed, config).await?;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }
        if result.oracle.passed {
            report.seeds_passed += 1;
        } else {
            tracing::warn!(seed, violations = result.oracle.violations.len(), "seed failed");
            report.first_failure.get_or_insert(seed);
            report.failures.push(SeedFailure {
                seed,
                violations: result.oracle.violations.iter().map(format_violation).collect(),
            });
        }
    }

    tracing::info!(
        seeds = report.seeds_run,
        passed = report.seeds_passed,
        interesting = report.interesting_states_reached,
        "campaign complete"
    );
    Ok(report)
}

/// `Ok(())` on pass, the violations on failure.
///
/// # Errors
///
/// Returns an error if the simulation itself fails.
pub async fn run_single_seed(
    seed: u64,
    config: &CampaignConfig,
) -> Result<std::result::Result<(), Vec<InvariantViolation>>> {
    let result = Simulator::new(config.sim_config_for_seed(seed))?.run().await?;
    if result.oracle.passed {
        Ok(Ok(()))
    } else {
        Ok(Err(result.oracle.violations))
    }
}

/// Re-run one seed and keep the full trace.
///
/// # Errors
///
/// Returns an error when validation or the simulation fails.
pub async fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    config.validate()?;
    Simulator::new(config.sim_config_for_seed(seed))?.run().await
}

#[must_use]
pub fn format_violation(violation: &InvariantViolation) -> String {
    match violation {
        InvariantViolation::Ghost { round, task_id } => {
            format!("Ghost: round {round} shows task {task_id}, which the ledger does not hold")
        }
        InvariantViolation::Resurrected { round, task_id } => {
            format!("Resurrected: round {round} shows task {task_id} after its deletion confirmed")
        }
        InvariantViolation::Divergence {
            missing,
            extra,
            differing,
        } => format!(
            "Divergence: board disagrees with a fresh replay \
             (missing={missing:?}, extra={extra:?}, differing={differing:?})"
        ),
        InvariantViolation::LeftoverEdits { pending } => {
            format!("LeftoverEdits: {pending} optimistic edits still pending at the end")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledgerdo_core::model::TaskId;

    #[test]
    fn validate_rejects_bad_ranges() {
        let ok = CampaignConfig::default();
        assert!(ok.validate().is_ok());

        let empty = CampaignConfig {
            seed_range: 5..5,
            ..CampaignConfig::default()
        };
        assert!(empty.validate().is_err());

        let mut loud = CampaignConfig::default();
        loud.fault.lag_percent = 101;
        let err = loud.validate().expect_err("percent above 100");
        assert!(err.to_string().contains("lag_percent"));
    }

    #[test]
    fn sim_config_carries_campaign_settings() {
        let config = CampaignConfig {
            rounds: 3,
            edits_per_round: 7,
            ..CampaignConfig::default()
        };
        let sim = config.sim_config_for_seed(42);
        assert_eq!(sim.seed, 42);
        assert_eq!(sim.rounds, 3);
        assert_eq!(sim.edits_per_round, 7);
    }

    #[test]
    fn violations_format_with_their_name() {
        let text = format_violation(&InvariantViolation::Ghost {
            round: 2,
            task_id: TaskId::new(9),
        });
        assert!(text.starts_with("Ghost:"));
        assert!(text.contains("round 2"));
        assert!(
            format_violation(&InvariantViolation::LeftoverEdits { pending: 1 })
                .starts_with("LeftoverEdits:")
        );
    }
}
