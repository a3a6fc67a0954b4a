#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use ledgerdo_core::config::{load_config, load_user_config};
use ledgerdo_core::event::write_lines;
use ledgerdo_sim::campaign::{CampaignConfig, format_violation, replay_seed, run_campaign};

/// Run seeded fault-injection campaigns against the optimistic task board.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// First seed.
    #[arg(long, default_value_t = 0)]
    start: u64,

    /// Rounds per seed.
    #[arg(long, default_value_t = 16)]
    rounds: u64,

    /// Optimistic edits started per round.
    #[arg(long, default_value_t = 4)]
    edits: usize,

    /// Replay a single seed and print its trace.
    #[arg(long)]
    replay: Option<u64>,

    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    json: bool,

    /// With --replay, write the ledger's event log (one JSON event per line).
    #[arg(long, requires = "replay")]
    dump_log: Option<PathBuf>,

    /// Take the `[reconstruct]` settings from this TOML file. Retry delays
    /// in the file are honoured.
    #[arg(long, conflicts_with = "user_config")]
    config: Option<PathBuf>,

    /// Take the `[reconstruct]` settings from the user config file.
    #[arg(long)]
    user_config: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEDGERDO_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "ledgerdo=debug,info"
        } else {
            "ledgerdo=info,warn"
        })
    });

    let format = env::var("LEDGERDO_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry.with(fmt::layer().json().with_ansi(false)).init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = CampaignConfig {
        seed_range: cli.start..cli.start.saturating_add(cli.seeds),
        rounds: cli.rounds,
        edits_per_round: cli.edits,
        ..CampaignConfig::default()
    };
    let loaded = match (&cli.config, cli.user_config) {
        (Some(path), _) => Some(load_config(path)?),
        (None, true) => Some(load_user_config()?),
        (None, false) => None,
    };
    if let Some(loaded) = loaded {
        tracing::info!(reconstruct = ?loaded.reconstruct, "using reconstruct settings from config");
        config.reconstruct = loaded.reconstruct;
    }

    if let Some(seed) = cli.replay {
        let result = replay_seed(seed, &config).await?;
        if let Some(path) = &cli.dump_log {
            let text = write_lines(&result.ledger_log)?;
            std::fs::write(path, text)
                .with_context(|| format!("failed to write event log to {}", path.display()))?;
        }
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            for event in &result.trace {
                println!("round {:>3}  {:?}", event.round, event.kind);
            }
            println!(
                "seed {seed}: passed={} tasks={} ledger_events={} interesting={}",
                result.oracle.passed,
                result.final_tasks.len(),
                result.ledger_log.len(),
                result.interesting_state_reached
            );
            for violation in &result.oracle.violations {
                println!("  {}", format_violation(violation));
            }
        }
        if !result.oracle.passed {
            std::process::exit(1);
        }
        return Ok(());
    }

    let report = run_campaign(&config).await?;
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "campaign complete: seeds={} passed={} interesting={}",
            report.seeds_run, report.seeds_passed, report.interesting_states_reached
        );
        for failure in &report.failures {
            println!("seed {} failed:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
        if let Some(seed) = report.first_failure {
            println!("replay with: ledgerdo-sim --replay {seed}");
        }
    }
    if !report.all_passed() {
        std::process::exit(1);
    }
    Ok(())
}
