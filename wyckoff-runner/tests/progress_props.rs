//! Property tests for replay progress reporting.
//!
//! Uses proptest to verify, for any bar count and batch size:
//! 1. bars_analyzed never goes backwards
//! 2. one update per full batch, one for a trailing partial batch, plus
//!    the start and terminal records
//! 3. the last record is the terminal one and matches the run

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use wyckoff_core::config::EngineConfig;
use wyckoff_core::domain::Timeframe;
use wyckoff_runner::{
    generate_synthetic_bars, BacktestReplayDriver, CancelToken, ReplayRequest, ReplaySettings,
    RunStatus, RunStatusRecord, ScannerKind,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn progress_is_monotonic_and_batched(bars in 1usize..300, batch in 1usize..50) {
        let start = Utc.with_ymd_and_hms(2015, 1, 5, 0, 0, 0).unwrap();
        let request = ReplayRequest {
            run_id: format!("props-{bars}-{batch}"),
            bars: generate_synthetic_bars("QQQ", Timeframe::D1, start, bars),
            current: EngineConfig::default(),
            proposed: EngineConfig::default(),
        };
        let driver = BacktestReplayDriver::new(ReplaySettings {
            progress_batch: batch,
            scanner: ScannerKind::Null,
            ..ReplaySettings::default()
        });

        let mut seen: Vec<RunStatusRecord> = Vec::new();
        let run = driver.run(&request, &CancelToken::new(), &mut |r| seen.push(r.clone()));

        let analyzed: Vec<usize> = seen.iter().map(|r| r.progress.bars_analyzed).collect();
        prop_assert!(analyzed.windows(2).all(|w| w[0] <= w[1]), "{:?}", analyzed);

        let expected = 2 + bars / batch + usize::from(bars % batch != 0);
        prop_assert_eq!(seen.len(), expected);

        let last = seen.last().unwrap();
        prop_assert_eq!(last.status, RunStatus::Completed);
        prop_assert_eq!(last.progress.bars_analyzed, bars);
        prop_assert_eq!(run.record(), last.clone());
    }
}
