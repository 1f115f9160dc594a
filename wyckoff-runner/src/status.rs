//! Run status and progress records.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of one backtest run: `QUEUED → RUNNING → {COMPLETED, FAILED, TIMEOUT}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed | RunStatus::Timeout)
    }

    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match self {
            RunStatus::Queued => next == RunStatus::Running,
            RunStatus::Running => next.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Queued => "QUEUED",
            RunStatus::Running => "RUNNING",
            RunStatus::Completed => "COMPLETED",
            RunStatus::Failed => "FAILED",
            RunStatus::Timeout => "TIMEOUT",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub bars_analyzed: usize,
    pub total_bars: usize,
    pub percent_complete: f64,
}

impl Progress {
    pub fn new(bars_analyzed: usize, total_bars: usize) -> Self {
        let percent_complete = if total_bars == 0 {
            100.0
        } else {
            bars_analyzed as f64 * 100.0 / total_bars as f64
        };
        Self {
            bars_analyzed,
            total_bars,
            percent_complete,
        }
    }
}

/// What a poller or progress sink sees for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatusRecord {
    pub run_id: String,
    pub status: RunStatus,
    pub progress: Progress,
    pub error: Option<String>,
}

impl RunStatusRecord {
    pub fn queued(run_id: impl Into<String>, total_bars: usize) -> Self {
        Self {
            run_id: run_id.into(),
            status: RunStatus::Queued,
            progress: Progress::new(0, total_bars),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_run_lifecycle() {
        use RunStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(!Queued.can_transition_to(Completed));
        for terminal in [Completed, Failed, Timeout] {
            assert!(Running.can_transition_to(terminal));
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Running));
        }
        assert!(!Running.can_transition_to(Queued));
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(serde_json::to_string(&RunStatus::Timeout).unwrap(), "\"TIMEOUT\"");
        assert_eq!(RunStatus::Running.to_string(), "RUNNING");
    }

    #[test]
    fn percent_complete() {
        assert_eq!(Progress::new(25, 100).percent_complete, 25.0);
        assert_eq!(Progress::new(0, 0).percent_complete, 100.0);
    }
}
