//! Replay settings and the TOML document that drives a replay.
//!
//! ```toml
//! [replay]
//! progress_batch = 10
//! timeout_secs = 300
//!
//! [current]
//! volume_window = 20
//!
//! [proposed]
//! volume_window = 30
//! ```
//!
//! Thresholds are `Decimal`; write them as strings (`"0.7"`) so no binary
//! float is involved in reading them.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use wyckoff_core::config::{ConfigError, EngineConfig};
use wyckoff_core::scanner::{NullScanner, PatternScanner, WyckoffScanner};

/// Which per-bar strategy a replay uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScannerKind {
    #[default]
    Wyckoff,
    /// No-op strategy; measures raw pipeline throughput.
    Null,
}

/// Builds a fresh scanner for one pipeline.
pub type ScannerFactory = Arc<dyn Fn(&EngineConfig) -> Box<dyn PatternScanner> + Send + Sync>;

impl ScannerKind {
    pub fn factory(self) -> ScannerFactory {
        match self {
            ScannerKind::Wyckoff => Arc::new(|config: &EngineConfig| {
                Box::new(WyckoffScanner::new(config.active_thresholds().clone()))
                    as Box<dyn PatternScanner>
            }),
            ScannerKind::Null => {
                Arc::new(|_: &EngineConfig| Box::new(NullScanner) as Box<dyn PatternScanner>)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplaySettings {
    /// K: publish progress every K bars.
    pub progress_batch: usize,
    /// Wall-clock deadline for one run.
    pub timeout_secs: f64,
    /// Ceiling on simultaneously running replays.
    pub max_concurrent_runs: usize,
    /// Abort on the first malformed bar instead of skipping it.
    pub strict: bool,
    /// Sink calls slower than this are logged. Also the longest a finished
    /// run waits for queued progress to flush before abandoning the sink.
    pub sink_timeout_ms: u64,
    /// Progress updates buffered before new ones are dropped.
    pub progress_queue_capacity: usize,
    pub scanner: ScannerKind,
}

impl Default for ReplaySettings {
    fn default() -> Self {
        Self {
            progress_batch: 1,
            timeout_secs: 300.0,
            max_concurrent_runs: 5,
            strict: false,
            sink_timeout_ms: 250,
            progress_queue_capacity: 1024,
            scanner: ScannerKind::Wyckoff,
        }
    }
}

impl ReplaySettings {
    /// Deadline as a `Duration`. Out-of-range values saturate; `validate`
    /// rejects them before a run starts.
    pub fn timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.timeout_secs).unwrap_or(if self.timeout_secs > 0.0 {
            Duration::MAX
        } else {
            Duration::ZERO
        })
    }

    pub fn sink_timeout(&self) -> Duration {
        Duration::from_millis(self.sink_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.progress_batch == 0 {
            return Err(ConfigError::invalid("replay.progress_batch", "must be at least 1"));
        }
        if Duration::try_from_secs_f64(self.timeout_secs).is_err() {
            return Err(ConfigError::invalid(
                "replay.timeout_secs",
                format!("must be a non-negative number of seconds, got {}", self.timeout_secs),
            ));
        }
        if self.max_concurrent_runs == 0 {
            return Err(ConfigError::invalid(
                "replay.max_concurrent_runs",
                "must be at least 1",
            ));
        }
        if self.progress_queue_capacity == 0 {
            return Err(ConfigError::invalid(
                "replay.progress_queue_capacity",
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Replay settings plus the current and proposed engine configurations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfigFile {
    #[serde(default)]
    pub replay: ReplaySettings,
    #[serde(default)]
    pub current: EngineConfig,
    /// Defaults to `current` when absent.
    #[serde(default)]
    pub proposed: Option<EngineConfig>,
}

impl ReplayConfigFile {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let file: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        file.validate()?;
        Ok(file)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Parse(format!("{}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    pub fn proposed(&self) -> &EngineConfig {
        self.proposed.as_ref().unwrap_or(&self.current)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.replay.validate()?;
        self.current.validate()?;
        self.proposed().validate()
    }
}
