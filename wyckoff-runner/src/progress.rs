//! Progress publishing.
//!
//! The replay loop never calls a sink directly. Records go into a bounded
//! queue drained by a dedicated thread, so a slow, failing or panicking sink
//! cannot stall or abort the run. When the queue is full the newest update is
//! dropped; the next batch carries fresher numbers anyway.
//!
//! Closing waits a bounded grace period for the queue to flush. A sink still
//! busy after that is abandoned: its thread is detached and whatever it had
//! not handled is counted as dropped.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::status::RunStatusRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink rejected update: {0}")]
    Rejected(String),
    #[error("sink receiver disconnected")]
    Disconnected,
}

/// Consumer of status updates (websocket bridge, log line, test harness).
pub trait ProgressSink: Send {
    fn publish(&mut self, record: &RunStatusRecord) -> Result<(), SinkError>;
}

/// Discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn publish(&mut self, _record: &RunStatusRecord) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Forwards updates to an mpsc channel.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<RunStatusRecord>,
}

impl ChannelSink {
    pub fn new(tx: Sender<RunStatusRecord>) -> Self {
        Self { tx }
    }

    pub fn pair() -> (Self, Receiver<RunStatusRecord>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn publish(&mut self, record: &RunStatusRecord) -> Result<(), SinkError> {
        self.tx.send(record.clone()).map_err(|_| SinkError::Disconnected)
    }
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> ProgressSink for FnSink<F>
where
    F: FnMut(&RunStatusRecord) -> Result<(), SinkError> + Send,
{
    fn publish(&mut self, record: &RunStatusRecord) -> Result<(), SinkError> {
        (self.0)(record)
    }
}

/// Delivery counters, returned when the publisher closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublisherStats {
    pub delivered: usize,
    pub failed: usize,
    pub panicked: usize,
    pub slow: usize,
    pub dropped: usize,
}

impl PublisherStats {
    fn handled(&self) -> usize {
        self.delivered + self.failed + self.panicked
    }
}

/// Shared state between the publisher and its drain thread.
struct Drain {
    stats: Arc<Mutex<PublisherStats>>,
    abandon: Arc<AtomicBool>,
    done: Receiver<()>,
}

pub struct ProgressPublisher {
    tx: Option<SyncSender<RunStatusRecord>>,
    drain: Option<Drain>,
    queued: usize,
    dropped: usize,
}

impl ProgressPublisher {
    /// Start a drain thread feeding `sink`.
    pub fn spawn(
        sink: Box<dyn ProgressSink>,
        capacity: usize,
        slow_call: Duration,
    ) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        let (done_tx, done) = mpsc::channel();
        let stats = Arc::new(Mutex::new(PublisherStats::default()));
        let abandon = Arc::new(AtomicBool::new(false));
        let worker = DrainWorker {
            sink,
            slow_call,
            stats: Arc::clone(&stats),
            abandon: Arc::clone(&abandon),
        };
        // Detached; `close` synchronises through `done` instead of joining.
        thread::Builder::new()
            .name("progress-sink".into())
            .spawn(move || {
                worker.run(rx);
                let _ = done_tx.send(());
            })?;
        Ok(Self {
            tx: Some(tx),
            drain: Some(Drain {
                stats,
                abandon,
                done,
            }),
            queued: 0,
            dropped: 0,
        })
    }

    /// A publisher with no sink; every update is discarded.
    pub fn disabled() -> Self {
        Self {
            tx: None,
            drain: None,
            queued: 0,
            dropped: 0,
        }
    }

    /// Queue an update without blocking.
    pub fn publish(&mut self, record: RunStatusRecord) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(record) {
            Ok(()) => self.queued += 1,
            Err(TrySendError::Full(record)) => {
                self.dropped += 1;
                debug!(
                    run_id = %record.run_id,
                    bars = record.progress.bars_analyzed,
                    "progress queue full, update dropped"
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!("progress sink thread is gone, further updates discarded");
                self.tx = None;
            }
        }
    }

    /// Stop accepting updates and wait up to `grace` for the queue to flush.
    ///
    /// On expiry the drain thread is told to stop after its current call and
    /// left to finish on its own; updates it never handled count as dropped.
    pub fn close(mut self, grace: Duration) -> PublisherStats {
        self.tx = None;
        let Some(drain) = self.drain.take() else {
            return PublisherStats {
                dropped: self.dropped,
                ..PublisherStats::default()
            };
        };
        match drain.done.recv_timeout(grace) {
            Ok(()) => {}
            Err(RecvTimeoutError::Timeout) => {
                drain.abandon.store(true, Ordering::Release);
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "progress sink did not drain in time, abandoning it"
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("progress sink thread panicked outside a sink call");
            }
        }
        let mut stats = *lock(&drain.stats);
        stats.dropped += self.queued.saturating_sub(stats.handled()) + self.dropped;
        stats
    }
}

impl std::fmt::Debug for ProgressPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressPublisher")
            .field("enabled", &self.tx.is_some())
            .field("queued", &self.queued)
            .field("dropped", &self.dropped)
            .finish()
    }
}

struct DrainWorker {
    sink: Box<dyn ProgressSink>,
    slow_call: Duration,
    stats: Arc<Mutex<PublisherStats>>,
    abandon: Arc<AtomicBool>,
}

impl DrainWorker {
    fn run(mut self, rx: Receiver<RunStatusRecord>) {
        for record in rx {
            if self.abandon.load(Ordering::Acquire) {
                break;
            }
            let started = Instant::now();
            let outcome = catch_unwind(AssertUnwindSafe(|| self.sink.publish(&record)));
            let elapsed = started.elapsed();

            let mut stats = lock(&self.stats);
            match outcome {
                Ok(Ok(())) => stats.delivered += 1,
                Ok(Err(e)) => {
                    stats.failed += 1;
                    warn!(run_id = %record.run_id, error = %e, "progress sink failed");
                }
                Err(_) => {
                    stats.panicked += 1;
                    warn!(run_id = %record.run_id, "progress sink panicked");
                }
            }
            if elapsed > self.slow_call {
                stats.slow += 1;
                warn!(
                    run_id = %record.run_id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "progress sink exceeded its call timeout"
                );
            }
        }
    }
}

fn lock(stats: &Mutex<PublisherStats>) -> MutexGuard<'_, PublisherStats> {
    stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
