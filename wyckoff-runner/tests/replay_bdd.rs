//! BDD tests for the replay driver:
//! - Throughput with the no-op strategy
//! - Progress batching
//! - Deadline and cancellation with partial results
//! - Bar hygiene: duplicates, series mismatch, out-of-order, strict mode
//! - Sink failures never reach the run or hold its slot

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use wyckoff_core::config::EngineConfig;
use wyckoff_core::domain::{Timeframe, ValidationError};
use wyckoff_core::scanner::{PatternScanner, ScanContext, ScanOutcome};
use wyckoff_runner::{
    generate_synthetic_bars, BacktestReplayDriver, BacktestService, CancelToken, FnSink,
    ReplayRequest, ReplaySettings, RunStatus, RunStatusRecord, ScannerFactory, ScannerKind,
    SinkError,
};

// ─── Helpers ─────────────────────────────────────────────────────────

fn request(bars: usize) -> ReplayRequest {
    let start = Utc.with_ymd_and_hms(2010, 1, 4, 0, 0, 0).unwrap();
    ReplayRequest {
        run_id: format!("test-{bars}"),
        bars: generate_synthetic_bars("SPY", Timeframe::D1, start, bars),
        current: EngineConfig::default(),
        proposed: EngineConfig::default(),
    }
}

fn settings(scanner: ScannerKind) -> ReplaySettings {
    ReplaySettings {
        scanner,
        ..ReplaySettings::default()
    }
}

/// Sleeps on every bar so deadlines are reachable.
struct SlowScanner(Duration);

impl PatternScanner for SlowScanner {
    fn name(&self) -> &str {
        "slow"
    }

    fn scan(&mut self, _ctx: &ScanContext<'_>) -> ScanOutcome {
        std::thread::sleep(self.0);
        ScanOutcome::none()
    }
}

fn slow(per_bar: Duration) -> ScannerFactory {
    Arc::new(move |_: &EngineConfig| Box::new(SlowScanner(per_bar)) as Box<dyn PatternScanner>)
}

/// Cancels the run once it has scanned `after` bars.
struct CancellingScanner {
    seen: usize,
    after: usize,
    token: CancelToken,
}

impl PatternScanner for CancellingScanner {
    fn name(&self) -> &str {
        "cancelling"
    }

    fn scan(&mut self, _ctx: &ScanContext<'_>) -> ScanOutcome {
        self.seen += 1;
        if self.seen >= self.after {
            self.token.cancel();
        }
        ScanOutcome::none()
    }
}

// ─── Throughput ──────────────────────────────────────────────────────

#[test]
fn bdd_ten_thousand_bars_replay_within_five_seconds() {
    // GIVEN 10,000 daily bars and the no-op strategy
    let request = request(10_000);
    let driver = BacktestReplayDriver::new(settings(ScannerKind::Null));

    // WHEN the replay runs
    let clock = Instant::now();
    let run = driver.run(&request, &CancelToken::new(), &mut |_| {});

    // THEN it completes inside five seconds with every bar analyzed
    assert!(clock.elapsed() < Duration::from_secs(5), "took {:?}", clock.elapsed());
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress.bars_analyzed, 10_000);
    assert_eq!(run.progress.percent_complete, 100.0);
    let report = run.report.unwrap();
    assert_eq!(report.current.bars_processed, 10_000);
    assert_eq!(report.current.scanner, "null");
}

#[test]
fn bdd_identical_configs_compare_unchanged() {
    // GIVEN the same configuration on both sides
    let request = request(1_500);
    let driver = BacktestReplayDriver::new(settings(ScannerKind::Wyckoff));

    // WHEN the replay runs with the Wyckoff strategy
    let run = driver.run(&request, &CancelToken::new(), &mut |_| {});

    // THEN both sides agree and every campaign is terminal
    assert_eq!(run.status, RunStatus::Completed);
    let report = run.report.unwrap();
    assert!(report.comparison.is_unchanged());
    assert_eq!(report.current.campaigns, report.proposed.campaigns);
    assert!(report.current.closed);
    assert!(report.current.campaigns.iter().all(|c| c.state.is_terminal()));
}

// ─── Progress ────────────────────────────────────────────────────────

#[test]
fn bdd_progress_is_published_every_k_bars() {
    // GIVEN 95 bars and a batch size of 10
    let request = request(95);
    let driver = BacktestReplayDriver::new(ReplaySettings {
        progress_batch: 10,
        scanner: ScannerKind::Null,
        ..ReplaySettings::default()
    });

    // WHEN the replay runs
    let mut seen: Vec<RunStatusRecord> = Vec::new();
    let run = driver.run(&request, &CancelToken::new(), &mut |r| seen.push(r.clone()));

    // THEN updates arrive at 0, every 10 bars, the final bar, then terminal
    let bars: Vec<usize> = seen.iter().map(|r| r.progress.bars_analyzed).collect();
    assert_eq!(bars, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90, 95, 95]);
    assert!(bars.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(seen.first().unwrap().status, RunStatus::Running);
    assert_eq!(seen.last().unwrap().status, RunStatus::Completed);
    assert_eq!(run.record(), *seen.last().unwrap());
}

// ─── Deadline and cancellation ───────────────────────────────────────

#[test]
fn bdd_deadline_stops_run_and_keeps_partial_results() {
    // GIVEN a 50ms deadline and a strategy that takes 2ms per bar
    let request = request(1_000);
    let driver = BacktestReplayDriver::new(ReplaySettings {
        timeout_secs: 0.05,
        ..ReplaySettings::default()
    })
    .with_scanner(slow(Duration::from_millis(2)));

    // WHEN the replay runs
    let run = driver.run(&request, &CancelToken::new(), &mut |_| {});

    // THEN it stops with TIMEOUT part way through
    assert_eq!(run.status, RunStatus::Timeout);
    assert!(run.progress.bars_analyzed > 0);
    assert!(run.progress.bars_analyzed < 1_000);
    assert!(run.error.as_deref().unwrap().contains("deadline"));

    // AND the partial results cover exactly the analyzed bars
    let report = run.report.unwrap();
    assert_eq!(report.current.bars_processed, run.progress.bars_analyzed);
    assert!(!report.current.closed);
    assert!(!report.proposed.closed);
}

#[test]
fn bdd_cancellation_fails_run_with_partial_results() {
    // GIVEN a strategy that cancels the run after 40 bars
    let token = CancelToken::new();
    let factory_token = token.clone();
    let factory: ScannerFactory = Arc::new(move |_: &EngineConfig| {
        Box::new(CancellingScanner {
            seen: 0,
            after: 40,
            token: factory_token.clone(),
        }) as Box<dyn PatternScanner>
    });
    let driver = BacktestReplayDriver::new(ReplaySettings::default()).with_scanner(factory);

    // WHEN the replay runs
    let run = driver.run(&request(500), &token, &mut |_| {});

    // THEN it fails as cancelled after exactly 40 bars
    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.error.as_deref(), Some("cancelled"));
    assert_eq!(run.progress.bars_analyzed, 40);
    assert_eq!(run.report.unwrap().current.bars_processed, 40);
}

// ─── Bar hygiene ─────────────────────────────────────────────────────

#[test]
fn bdd_malformed_bars_are_skipped_and_recorded() {
    // GIVEN a series with a duplicate timestamp, a zero-volume bar and a foreign bar
    let mut request = request(200);
    let duplicate = request.bars[50].clone();
    request.bars.insert(51, duplicate);
    request.bars[100].volume = 0;
    request.bars[150].symbol = "QQQ".into();
    let driver = BacktestReplayDriver::new(settings(ScannerKind::Null));

    // WHEN the replay runs in lenient mode
    let run = driver.run(&request, &CancelToken::new(), &mut |_| {});

    // THEN it completes and lists each skipped bar
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.issues.len(), 3);
    assert!(matches!(run.issues[0].error, ValidationError::DuplicateTimestamp(_)));
    assert_eq!(run.issues[0].index, 51);
    assert_eq!(run.issues[1].error, ValidationError::ZeroVolume);
    assert!(matches!(run.issues[2].error, ValidationError::SeriesMismatch { .. }));
    assert_eq!(run.progress.bars_analyzed, 201);
    assert_eq!(run.report.unwrap().current.bars_processed, 198);
}

#[test]
fn bdd_strict_mode_aborts_on_first_malformed_bar() {
    // GIVEN a zero-volume bar at index 30 and strict mode
    let mut request = request(100);
    request.bars[30].volume = 0;
    let driver = BacktestReplayDriver::new(ReplaySettings {
        strict: true,
        scanner: ScannerKind::Null,
        ..ReplaySettings::default()
    });

    // WHEN the replay runs
    let run = driver.run(&request, &CancelToken::new(), &mut |_| {});

    // THEN it fails at that bar
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("bar 30"));
    assert_eq!(run.report.unwrap().current.bars_processed, 30);
}

#[test]
fn bdd_out_of_order_bar_fails_the_run() {
    // GIVEN a bar that jumps back in time
    let mut request = request(100);
    request.bars[60].timestamp = request.bars[10].timestamp - ChronoDuration::days(1);
    let driver = BacktestReplayDriver::new(settings(ScannerKind::Null));

    // WHEN the replay runs, even in lenient mode
    let run = driver.run(&request, &CancelToken::new(), &mut |_| {});

    // THEN it fails there and keeps what came before
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error.as_deref().unwrap().contains("bar 60"));
    assert!(run.issues.is_empty());
    assert_eq!(run.report.unwrap().current.bars_processed, 60);
}

// ─── Sinks ───────────────────────────────────────────────────────────

#[test]
fn bdd_panicking_sink_does_not_abort_the_run() {
    // GIVEN a sink that panics on every update
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let sink = FnSink(move |_: &RunStatusRecord| -> Result<(), SinkError> {
        counter.fetch_add(1, Ordering::SeqCst);
        panic!("sink exploded")
    });
    let service = BacktestService::new(ReplaySettings {
        progress_batch: 25,
        scanner: ScannerKind::Null,
        ..ReplaySettings::default()
    })
    .unwrap();

    // WHEN a replay runs through the service
    let handle = service.submit(request(300), Box::new(sink)).unwrap();
    let run = handle.join().unwrap();

    // THEN the run completes and the sink was still offered every update
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.progress.bars_analyzed, 300);
    // queued + running + 12 batches + terminal
    assert_eq!(calls.load(Ordering::SeqCst), 15);
}

#[test]
fn bdd_slow_sink_does_not_hold_up_the_run() {
    // GIVEN a sink that takes 50ms per update and a tiny queue
    let sink = FnSink(|_: &RunStatusRecord| -> Result<(), SinkError> {
        std::thread::sleep(Duration::from_millis(50));
        Ok(())
    });
    let service = BacktestService::new(ReplaySettings {
        progress_batch: 1,
        progress_queue_capacity: 2,
        sink_timeout_ms: 10,
        scanner: ScannerKind::Null,
        ..ReplaySettings::default()
    })
    .unwrap();

    // WHEN 2,000 bars replay with an update per bar
    let clock = Instant::now();
    let run = service.submit(request(2_000), Box::new(sink)).unwrap().join().unwrap();

    // THEN the replay is not paced by the sink
    assert_eq!(run.status, RunStatus::Completed);
    assert!(clock.elapsed() < Duration::from_secs(5), "took {:?}", clock.elapsed());
}

#[test]
fn bdd_stuck_sink_does_not_hold_the_run_slot() {
    // GIVEN a single run slot and a sink far slower than its call timeout
    let sink = || {
        FnSink(|_: &RunStatusRecord| -> Result<(), SinkError> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
    };
    let service = BacktestService::new(ReplaySettings {
        max_concurrent_runs: 1,
        progress_batch: 10,
        sink_timeout_ms: 250,
        scanner: ScannerKind::Null,
        ..ReplaySettings::default()
    })
    .unwrap();

    // WHEN 100 bars replay, queueing a dozen updates behind the sink
    let clock = Instant::now();
    let run = service.submit(request(100), Box::new(sink())).unwrap().join().unwrap();

    // THEN join returns after the flush grace, not after the sink catches up
    assert_eq!(run.status, RunStatus::Completed);
    assert!(clock.elapsed() < Duration::from_secs(2), "took {:?}", clock.elapsed());
    assert_eq!(service.active_runs(), 0);

    // AND the slot is immediately available to the next run
    let next = service.submit(request(100), Box::new(sink())).unwrap().join().unwrap();
    assert_eq!(next.status, RunStatus::Completed);
}
