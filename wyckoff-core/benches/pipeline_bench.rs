//! Criterion benchmarks for the detection hot paths.
//!
//! Benchmarks:
//! 1. Volume cache build (sliding-window running sum)
//! 2. Full per-bar pipeline with the no-op scanner
//! 3. Full per-bar pipeline with the Wyckoff scanner
//! 4. Sequence detector token throughput

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::sync::Arc;

use wyckoff_core::config::{CampaignConfig, EngineConfig};
use wyckoff_core::domain::{Bar, PatternInstance, PatternKind, Timeframe, TradingRange};
use wyckoff_core::pipeline::DetectionPipeline;
use wyckoff_core::scanner::{NullScanner, PatternScanner, WyckoffScanner};
use wyckoff_core::sequence::CampaignSequenceDetector;
use wyckoff_core::volume::VolumeStatisticsCache;

// ── Helpers ──────────────────────────────────────────────────────────

/// Oscillating cent-priced bars with periodic volume spikes.
fn make_bars(n: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2015, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let wave = ((i % 40) as i64 - 20).abs();
            let close = Decimal::new(10_000 + wave * 25, 2);
            let high = close + Decimal::new(150, 2);
            let low = close - Decimal::new(150, 2);
            let volume = if i % 37 == 0 { 3_500_000 } else { 1_000_000 + (i as u64 % 500_000) };
            Bar::new(
                "SPY",
                Timeframe::D1,
                start + Duration::days(i as i64),
                close,
                high,
                low,
                close,
                volume,
            )
        })
        .collect()
}

fn run_pipeline(bars: &[Bar], scanner: Box<dyn PatternScanner>) -> usize {
    let config = EngineConfig::default();
    let mut pipeline = match DetectionPipeline::new(&config, scanner) {
        Ok(p) => p,
        Err(_) => return 0,
    };
    for (i, bar) in bars.iter().enumerate() {
        if pipeline.process(i, bar).is_err() {
            break;
        }
    }
    pipeline.finish().map(|r| r.campaigns.len()).unwrap_or(0)
}

// ── 1. Volume cache ──────────────────────────────────────────────────

fn bench_volume_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("volume_cache");
    for n in [1_000, 10_000, 50_000] {
        let bars = make_bars(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &bars, |b, bars| {
            b.iter(|| VolumeStatisticsCache::from_bars(black_box(bars), 20).map(|c| c.len()))
        });
    }
    group.finish();
}

// ── 2–3. Pipeline ────────────────────────────────────────────────────

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    group.sample_size(20);
    let bars = make_bars(10_000);
    group.bench_function("null_scanner_10k", |b| {
        b.iter(|| run_pipeline(black_box(&bars), Box::new(NullScanner)))
    });
    group.bench_function("wyckoff_scanner_10k", |b| {
        b.iter(|| {
            let thresholds = EngineConfig::default().active_thresholds().clone();
            run_pipeline(black_box(&bars), Box::new(WyckoffScanner::new(thresholds)))
        })
    });
    group.finish();
}

// ── 4. Sequence detector ─────────────────────────────────────────────

fn bench_sequence(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2015, 1, 2, 0, 0, 0).unwrap();
    let range = Arc::new(TradingRange::anchored(
        Decimal::new(90, 0),
        Decimal::new(110, 0),
        start,
    ));
    let tokens: Vec<PatternInstance> = (0..6_000)
        .map(|i| {
            PatternInstance::reported(
                PatternKind::ALL[i % PatternKind::ALL.len()],
                "SPY",
                Timeframe::D1,
                i,
                start + Duration::days(i as i64),
                Decimal::new(100, 0),
                Arc::clone(&range),
            )
        })
        .collect();
    c.bench_function("sequence_detector_6k_tokens", |b| {
        b.iter(|| {
            let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
            let mut events = 0;
            for token in &tokens {
                events += detector.observe(black_box(token)).len();
            }
            events
        })
    });
}

criterion_group!(benches, bench_volume_cache, bench_pipeline, bench_sequence);
criterion_main!(benches);
