use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerdoConfig {
    #[serde(default)]
    pub reconstruct: ReconstructConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Knobs for the replay pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconstructConfig {
    /// Size of the recent-window query made before full history. `0` skips it.
    #[serde(default = "default_recent_window_blocks")]
    pub recent_window_blocks: u64,
    /// Extra full-history attempts when the caller expects tasks but the
    /// ledger reports none.
    #[serde(default = "default_empty_retries")]
    pub empty_retries: u32,
    #[serde(default = "default_empty_retry_delay_ms")]
    pub empty_retry_delay_ms: u64,
    /// Upper bound on concurrent per-task canonical reads.
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
}

impl ReconstructConfig {
    #[must_use]
    pub const fn empty_retry_delay(&self) -> Duration {
        Duration::from_millis(self.empty_retry_delay_ms)
    }
}

impl Default for ReconstructConfig {
    fn default() -> Self {
        Self {
            recent_window_blocks: default_recent_window_blocks(),
            empty_retries: default_empty_retries(),
            empty_retry_delay_ms: default_empty_retry_delay_ms(),
            fetch_concurrency: default_fetch_concurrency(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Re-run reconstruction after every confirmed write.
    #[serde(default = "default_true")]
    pub refresh_on_confirm: bool,
    /// Open tasks due within this many hours count as urgent.
    #[serde(default = "default_urgent_window_hours")]
    pub urgent_window_hours: u32,
}

impl SessionConfig {
    #[must_use]
    pub fn urgent_window(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.urgent_window_hours))
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_on_confirm: default_true(),
            urgent_window_hours: default_urgent_window_hours(),
        }
    }
}

/// Parse config text. Missing sections and keys take their defaults.
///
/// # Errors
///
/// Returns an error when `text` is not valid TOML for this schema.
pub fn parse_config(text: &str) -> Result<LedgerdoConfig> {
    toml::from_str::<LedgerdoConfig>(text).context("Failed to parse ledgerdo config")
}

/// Load config from `path`, falling back to defaults when the file is absent.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<LedgerdoConfig> {
    if !path.exists() {
        return Ok(LedgerdoConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<LedgerdoConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Load `ledgerdo/config.toml` from the platform config directory.
///
/// # Errors
///
/// Returns an error when the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<LedgerdoConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(LedgerdoConfig::default());
    };
    load_config(&config_dir.join("ledgerdo/config.toml"))
}

const fn default_true() -> bool {
    true
}

const fn default_recent_window_blocks() -> u64 {
    50_000
}

const fn default_empty_retries() -> u32 {
    1
}

const fn default_empty_retry_delay_ms() -> u64 {
    1_500
}

const fn default_fetch_concurrency() -> usize {
    8
}

const fn default_urgent_window_hours() -> u32 {
    24
}
