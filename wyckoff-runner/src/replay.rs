//! Backtest replay driver.
//!
//! Replays one bar series through two detection pipelines in lock-step: the
//! current engine configuration and a proposed one. The driver owns bar
//! hygiene (series check, ordering, OHLCV sanity), the wall-clock deadline,
//! cancellation, and progress batching. Pipelines only ever see clean,
//! strictly increasing bars.
//!
//! Failure handling:
//! - malformed bar: recorded as an issue and skipped (strict mode aborts)
//! - out-of-order timestamp: the series is unusable, the run fails
//! - deadline: the run stops with TIMEOUT and keeps its partial results
//! - cancellation: the run stops with FAILED ("cancelled"), partials kept
//! - closing rule fails at end of input: FAILED, partials kept unclosed
//! - invalid settings or engine config: FAILED before any bar, no report

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};

use wyckoff_core::config::{ConfigError, EngineConfig};
use wyckoff_core::domain::{Bar, Timeframe, ValidationError};
use wyckoff_core::pipeline::{DetectionPipeline, PipelineError};

use crate::report::ReplayReport;
use crate::settings::{ReplaySettings, ScannerFactory};
use crate::status::{Progress, RunStatus, RunStatusRecord};

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("bar {index} at {found} precedes the previous bar at {previous}")]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        found: DateTime<Utc>,
    },

    #[error("deadline of {limit:?} reached after {analyzed} of {total} bars")]
    Timeout {
        limit: Duration,
        analyzed: usize,
        total: usize,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("bar {index} rejected in strict mode: {source}")]
    Strict {
        index: usize,
        #[source]
        source: ValidationError,
    },

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("pipeline: {0}")]
    Pipeline(#[from] PipelineError),
}

/// A bar that was skipped, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarIssue {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub error: ValidationError,
}

/// Input to one replay.
#[derive(Debug, Clone)]
pub struct ReplayRequest {
    pub run_id: String,
    pub bars: Vec<Bar>,
    pub current: EngineConfig,
    pub proposed: EngineConfig,
}

/// Final state of one replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRun {
    pub run_id: String,
    pub status: RunStatus,
    pub progress: Progress,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub issues: Vec<BarIssue>,
    /// Present for every run that got past pipeline construction, including
    /// timed-out and cancelled ones.
    pub report: Option<ReplayReport>,
}

impl BacktestRun {
    pub fn record(&self) -> RunStatusRecord {
        RunStatusRecord {
            run_id: self.run_id.clone(),
            status: self.status,
            progress: self.progress,
            error: self.error.clone(),
        }
    }
}

pub struct BacktestReplayDriver {
    settings: ReplaySettings,
    scanner: ScannerFactory,
}

impl BacktestReplayDriver {
    pub fn new(settings: ReplaySettings) -> Self {
        let scanner = settings.scanner.factory();
        Self { settings, scanner }
    }

    /// Replace the scanner the settings selected.
    pub fn with_scanner(mut self, factory: ScannerFactory) -> Self {
        self.scanner = factory;
        self
    }

    pub fn settings(&self) -> &ReplaySettings {
        &self.settings
    }

    /// Run a replay to completion, timeout, cancellation or failure.
    ///
    /// `on_status` sees RUNNING once at the start, then every K bars, then
    /// the terminal record. It runs on the replay thread and must not block.
    pub fn run(
        &self,
        request: &ReplayRequest,
        cancel: &CancelToken,
        on_status: &mut dyn FnMut(&RunStatusRecord),
    ) -> BacktestRun {
        let started_at = Utc::now();
        let clock = Instant::now();
        let total = request.bars.len();
        let mut record = RunStatusRecord::queued(&request.run_id, total);
        record.status = RunStatus::Running;
        on_status(&record);
        info!(run_id = %request.run_id, bars = total, "replay started");

        let pipelines = self
            .settings
            .validate()
            .map_err(ReplayError::from)
            .and_then(|()| {
                let current = self.pipeline(&request.current)?;
                Ok((current, self.pipeline(&request.proposed)?))
            });
        let (mut current, mut proposed) = match pipelines {
            Ok(pair) => pair,
            Err(e) => {
                error!(run_id = %request.run_id, error = %e, "replay could not start");
                record.status = RunStatus::Failed;
                record.error = Some(e.to_string());
                on_status(&record);
                return finish_run(record, started_at, clock, Vec::new(), None);
            }
        };

        let mut issues = Vec::new();
        let stop = self
            .drive(
                request,
                &mut current,
                &mut proposed,
                cancel,
                clock,
                &mut issues,
                &mut record,
                on_status,
            )
            .err();

        match stop {
            None => {
                match current
                    .close_campaigns()
                    .and_then(|()| proposed.close_campaigns())
                {
                    Ok(()) => record.status = RunStatus::Completed,
                    Err(e) => {
                        record.status = RunStatus::Failed;
                        record.error = Some(ReplayError::from(e).to_string());
                    }
                }
            }
            Some(e) => {
                record.status = match e {
                    ReplayError::Timeout { .. } => RunStatus::Timeout,
                    _ => RunStatus::Failed,
                };
                record.error = Some(e.to_string());
            }
        }
        let report = Some(ReplayReport::new(
            current.into_result(),
            proposed.into_result(),
        ));

        match record.status {
            RunStatus::Completed => info!(
                run_id = %request.run_id,
                bars = record.progress.bars_analyzed,
                issues = issues.len(),
                elapsed_ms = clock.elapsed().as_millis() as u64,
                "replay completed"
            ),
            status => warn!(
                run_id = %request.run_id,
                %status,
                bars = record.progress.bars_analyzed,
                error = record.error.as_deref().unwrap_or(""),
                "replay stopped"
            ),
        }
        on_status(&record);
        finish_run(record, started_at, clock, issues, report)
    }

    fn pipeline(&self, config: &EngineConfig) -> Result<DetectionPipeline, ReplayError> {
        Ok(DetectionPipeline::new(config, (self.scanner)(config))?)
    }

    #[allow(clippy::too_many_arguments)]
    fn drive(
        &self,
        request: &ReplayRequest,
        current: &mut DetectionPipeline,
        proposed: &mut DetectionPipeline,
        cancel: &CancelToken,
        clock: Instant,
        issues: &mut Vec<BarIssue>,
        record: &mut RunStatusRecord,
        on_status: &mut dyn FnMut(&RunStatusRecord),
    ) -> Result<(), ReplayError> {
        let total = request.bars.len();
        let limit = self.settings.timeout();
        let batch = self.settings.progress_batch.max(1);
        let Some(first) = request.bars.first() else {
            return Ok(());
        };
        let series = (first.symbol.clone(), first.timeframe);
        let mut last_accepted: Option<DateTime<Utc>> = None;

        for (index, bar) in request.bars.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ReplayError::Cancelled);
            }
            if clock.elapsed() >= limit {
                return Err(ReplayError::Timeout {
                    limit,
                    analyzed: index,
                    total,
                });
            }

            match check_bar(bar, &series, last_accepted) {
                Ok(()) => {
                    current.process(index, bar)?;
                    proposed.process(index, bar)?;
                    last_accepted = Some(bar.timestamp);
                }
                Err(BarCheck::OutOfOrder(previous)) => {
                    return Err(ReplayError::OutOfOrder {
                        index,
                        previous,
                        found: bar.timestamp,
                    });
                }
                Err(BarCheck::Invalid(source)) => {
                    if self.settings.strict {
                        return Err(ReplayError::Strict { index, source });
                    }
                    warn!(run_id = %request.run_id, index, error = %source, "bar skipped");
                    issues.push(BarIssue {
                        index,
                        timestamp: bar.timestamp,
                        error: source,
                    });
                }
            }

            let analyzed = index + 1;
            record.progress = Progress::new(analyzed, total);
            if analyzed % batch == 0 || analyzed == total {
                on_status(record);
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BacktestReplayDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BacktestReplayDriver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

enum BarCheck {
    OutOfOrder(DateTime<Utc>),
    Invalid(ValidationError),
}

fn check_bar(
    bar: &Bar,
    series: &(String, Timeframe),
    last_accepted: Option<DateTime<Utc>>,
) -> Result<(), BarCheck> {
    if bar.symbol != series.0 || bar.timeframe != series.1 {
        return Err(BarCheck::Invalid(ValidationError::SeriesMismatch {
            expected: format!("{}@{}", series.0, series.1),
            found: format!("{}@{}", bar.symbol, bar.timeframe),
        }));
    }
    if let Some(previous) = last_accepted {
        if bar.timestamp < previous {
            return Err(BarCheck::OutOfOrder(previous));
        }
        if bar.timestamp == previous {
            return Err(BarCheck::Invalid(ValidationError::DuplicateTimestamp(
                bar.timestamp,
            )));
        }
    }
    bar.validate().map_err(BarCheck::Invalid)
}

fn finish_run(
    record: RunStatusRecord,
    started_at: DateTime<Utc>,
    clock: Instant,
    issues: Vec<BarIssue>,
    report: Option<ReplayReport>,
) -> BacktestRun {
    BacktestRun {
        run_id: record.run_id,
        status: record.status,
        progress: record.progress,
        error: record.error,
        started_at,
        elapsed_ms: clock.elapsed().as_millis() as u64,
        issues,
        report,
    }
}
