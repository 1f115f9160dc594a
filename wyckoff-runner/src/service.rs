//! Backtest service: runs replays on worker threads under a concurrency
//! ceiling.
//!
//! `submit` never queues behind the ceiling. When every slot is taken it
//! fails fast with [`RunnerError::ConcurrencyLimit`] and the caller decides
//! whether to retry.
//!
//! A run gives its slot back as soon as the replay itself ends. Flushing
//! queued progress afterwards is bounded by the sink timeout and never holds
//! a slot.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tracing::{info, warn};

use wyckoff_core::config::ConfigError;

use crate::progress::{ProgressPublisher, ProgressSink};
use crate::replay::{BacktestReplayDriver, BacktestRun, CancelToken, ReplayRequest};
use crate::settings::{ReplaySettings, ScannerFactory};
use crate::status::RunStatusRecord;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("{limit} replays already running; try again later")]
    ConcurrencyLimit { limit: usize },

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("replay thread for {run_id} panicked")]
    WorkerPanicked { run_id: String },
}

/// Counting semaphore that never blocks.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimit {
    active: Arc<AtomicUsize>,
    ceiling: usize,
}

impl ConcurrencyLimit {
    pub fn new(ceiling: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            ceiling,
        }
    }

    pub fn try_acquire(&self) -> Option<RunSlot> {
        let mut current = self.active.load(Ordering::Acquire);
        loop {
            if current >= self.ceiling {
                return None;
            }
            match self.active.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    return Some(RunSlot {
                        active: Arc::clone(&self.active),
                    })
                }
                Err(actual) => current = actual,
            }
        }
    }

    pub fn active(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }
}

/// Held for the lifetime of one run; releases its slot on drop.
#[derive(Debug)]
pub struct RunSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for RunSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Handle to a submitted run: poll, cancel, join.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    status: Arc<Mutex<RunStatusRecord>>,
    cancel: CancelToken,
    join: JoinHandle<BacktestRun>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Latest status seen by the replay thread.
    pub fn status(&self) -> RunStatusRecord {
        lock(&self.status).clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    pub fn join(self) -> Result<BacktestRun, RunnerError> {
        self.join.join().map_err(|_| RunnerError::WorkerPanicked {
            run_id: self.run_id,
        })
    }
}

#[derive(Debug)]
pub struct BacktestService {
    driver: Arc<BacktestReplayDriver>,
    limit: ConcurrencyLimit,
}

impl BacktestService {
    pub fn new(settings: ReplaySettings) -> Result<Self, RunnerError> {
        settings.validate()?;
        let limit = ConcurrencyLimit::new(settings.max_concurrent_runs);
        Ok(Self {
            driver: Arc::new(BacktestReplayDriver::new(settings)),
            limit,
        })
    }

    pub fn with_scanner(settings: ReplaySettings, factory: ScannerFactory) -> Result<Self, RunnerError> {
        settings.validate()?;
        let limit = ConcurrencyLimit::new(settings.max_concurrent_runs);
        Ok(Self {
            driver: Arc::new(BacktestReplayDriver::new(settings).with_scanner(factory)),
            limit,
        })
    }

    pub fn active_runs(&self) -> usize {
        self.limit.active()
    }

    /// Start a replay on its own thread.
    pub fn submit(
        &self,
        request: ReplayRequest,
        sink: Box<dyn ProgressSink>,
    ) -> Result<RunHandle, RunnerError> {
        let Some(slot) = self.limit.try_acquire() else {
            warn!(run_id = %request.run_id, limit = self.limit.ceiling(), "replay rejected at concurrency limit");
            return Err(RunnerError::ConcurrencyLimit {
                limit: self.limit.ceiling(),
            });
        };

        let settings = self.driver.settings();
        let grace = settings.sink_timeout();
        let mut publisher = ProgressPublisher::spawn(
            sink,
            settings.progress_queue_capacity,
            settings.sink_timeout(),
        )?;

        let run_id = request.run_id.clone();
        let status = Arc::new(Mutex::new(RunStatusRecord::queued(
            &request.run_id,
            request.bars.len(),
        )));
        publisher.publish(lock(&status).clone());
        let cancel = CancelToken::new();

        let driver = Arc::clone(&self.driver);
        let shared = Arc::clone(&status);
        let token = cancel.clone();
        let join = thread::Builder::new()
            .name(format!("replay-{}", short(&run_id)))
            .spawn(move || {
                let run = driver.run(&request, &token, &mut |record| {
                    *lock(&shared) = record.clone();
                    publisher.publish(record.clone());
                });
                drop(slot);
                let stats = publisher.close(grace);
                info!(
                    run_id = %run.run_id,
                    delivered = stats.delivered,
                    dropped = stats.dropped,
                    failed = stats.failed + stats.panicked,
                    slow = stats.slow,
                    "progress publishing finished"
                );
                run
            })?;

        info!(run_id = %run_id, active = self.limit.active(), "replay submitted");
        Ok(RunHandle {
            run_id,
            status,
            cancel,
            join,
        })
    }
}

fn short(run_id: &str) -> &str {
    run_id.get(..8).unwrap_or(run_id)
}

fn lock(status: &Mutex<RunStatusRecord>) -> MutexGuard<'_, RunStatusRecord> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
