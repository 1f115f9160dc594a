//! Wyckoff Runner: backtest replay orchestration on top of `wyckoff-core`.
//!
//! - Bar loading from CSV, deterministic synthetic series, dataset hashing
//! - Replay driver: current vs proposed configuration in lock-step
//! - Deadline, cancellation and partial results
//! - Non-blocking progress publishing to pluggable sinks
//! - Run service with a fail-fast concurrency ceiling
//! - Per-configuration summaries and their comparison

pub mod data_loader;
pub mod progress;
pub mod replay;
pub mod report;
pub mod service;
pub mod settings;
pub mod status;

pub use data_loader::{
    compute_dataset_hash, generate_synthetic_bars, load_csv, read_csv, run_id, write_csv,
    LoadError,
};
pub use progress::{
    ChannelSink, FnSink, NullSink, ProgressPublisher, ProgressSink, PublisherStats, SinkError,
};
pub use replay::{
    BacktestReplayDriver, BacktestRun, BarIssue, CancelToken, ReplayError, ReplayRequest,
};
pub use report::{Comparison, PipelineSummary, ReplayReport};
pub use service::{BacktestService, ConcurrencyLimit, RunHandle, RunSlot, RunnerError};
pub use settings::{ReplayConfigFile, ReplaySettings, ScannerFactory, ScannerKind};
pub use status::{Progress, RunStatus, RunStatusRecord};
