//! Rolling volume statistics.
//!
//! For the bar at index `i >= W`, the ratio is
//! `volume[i] / mean(volume[i-W..i])`, rounded half-up to 4 fractional
//! digits. The mean is maintained as a running sum over a sliding window, so
//! building the cache is O(n) and each push is O(1) amortized.
//!
//! Ratios are keyed by timestamp. A bar without `W` predecessors, or whose
//! predecessors all had zero volume, has no ratio; it is never zero-filled.

use chrono::{DateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::trace;

use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("volume window must be at least 1")]
    ZeroWindow,

    #[error("timestamp {found} does not follow {previous}")]
    NonMonotonic {
        previous: DateTime<Utc>,
        found: DateTime<Utc>,
    },
}

/// Fractional digits kept on every ratio.
pub const RATIO_DECIMALS: u32 = 4;

#[derive(Debug, Clone)]
pub struct VolumeStatisticsCache {
    window: usize,
    recent: VecDeque<u64>,
    running_sum: u128,
    ratios: HashMap<DateTime<Utc>, Decimal>,
    last_timestamp: Option<DateTime<Utc>>,
    bars_seen: usize,
}

impl VolumeStatisticsCache {
    pub fn new(window: usize) -> Result<Self, CacheError> {
        if window == 0 {
            return Err(CacheError::ZeroWindow);
        }
        Ok(Self {
            window,
            recent: VecDeque::with_capacity(window + 1),
            running_sum: 0,
            ratios: HashMap::new(),
            last_timestamp: None,
            bars_seen: 0,
        })
    }

    /// Build from an ordered bar sequence.
    pub fn from_bars(bars: &[Bar], window: usize) -> Result<Self, CacheError> {
        let mut cache = Self::new(window)?;
        cache.ratios.reserve(bars.len().saturating_sub(window));
        for bar in bars {
            cache.push(bar)?;
        }
        Ok(cache)
    }

    /// Append the next bar and return its ratio, if defined.
    ///
    /// Timestamps must be strictly increasing.
    pub fn push(&mut self, bar: &Bar) -> Result<Option<Decimal>, CacheError> {
        if let Some(previous) = self.last_timestamp {
            if bar.timestamp <= previous {
                return Err(CacheError::NonMonotonic {
                    previous,
                    found: bar.timestamp,
                });
            }
        }

        let ratio = if self.recent.len() == self.window {
            self.current_ratio(bar.volume)
        } else {
            None
        };
        if let Some(r) = ratio {
            self.ratios.insert(bar.timestamp, r);
        } else {
            trace!(ts = %bar.timestamp, "no volume ratio");
        }

        self.recent.push_back(bar.volume);
        self.running_sum += u128::from(bar.volume);
        if self.recent.len() > self.window {
            if let Some(evicted) = self.recent.pop_front() {
                self.running_sum -= u128::from(evicted);
            }
        }
        self.last_timestamp = Some(bar.timestamp);
        self.bars_seen += 1;
        Ok(ratio)
    }

    /// `volume * W / sum`, which equals `volume / mean` without an
    /// intermediate rounding step.
    fn current_ratio(&self, volume: u64) -> Option<Decimal> {
        if self.running_sum == 0 {
            return None;
        }
        let sum = Decimal::from_u128(self.running_sum)?;
        let scaled = Decimal::from(volume).checked_mul(Decimal::from(self.window as u64))?;
        scaled
            .checked_div(sum)
            .map(|r| r.round_dp_with_strategy(RATIO_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
    }

    /// O(1) lookup.
    pub fn get(&self, timestamp: DateTime<Utc>) -> Option<Decimal> {
        self.ratios.get(&timestamp).copied()
    }

    /// Drop a cached ratio so a corrected bar can be re-evaluated.
    /// Returns the removed value.
    pub fn invalidate(&mut self, timestamp: DateTime<Utc>) -> Option<Decimal> {
        self.ratios.remove(&timestamp)
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of cached ratios.
    pub fn len(&self) -> usize {
        self.ratios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratios.is_empty()
    }

    pub fn bars_seen(&self) -> usize {
        self.bars_seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Timeframe;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn bars(volumes: &[u64]) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| {
                Bar::new(
                    "SPY",
                    Timeframe::D1,
                    start + Duration::days(i as i64),
                    dec!(100),
                    dec!(101),
                    dec!(99),
                    dec!(100),
                    v,
                )
            })
            .collect()
    }

    #[test]
    fn zero_window_rejected() {
        assert_eq!(
            VolumeStatisticsCache::new(0).unwrap_err(),
            CacheError::ZeroWindow
        );
    }

    #[test]
    fn spike_after_warmup() {
        let mut volumes = vec![1_000_000; 20];
        volumes.push(3_000_000);
        let series = bars(&volumes);
        let cache = VolumeStatisticsCache::from_bars(&series, 20).unwrap();
        let ratio = cache.get(series[20].timestamp).unwrap();
        assert!(ratio > dec!(2.5) && ratio < dec!(3.5));
        assert_eq!(ratio, dec!(3.0000));
    }

    #[test]
    fn warmup_bars_have_no_ratio() {
        let series = bars(&[100; 5]);
        let cache = VolumeStatisticsCache::from_bars(&series, 5).unwrap();
        for bar in &series {
            assert_eq!(cache.get(bar.timestamp), None);
        }
        assert!(cache.is_empty());
    }

    #[test]
    fn zero_average_is_absent_not_zero() {
        let mut volumes = vec![0; 3];
        volumes.push(10);
        let series = bars(&volumes);
        let cache = VolumeStatisticsCache::from_bars(&series, 3).unwrap();
        assert_eq!(cache.get(series[3].timestamp), None);
    }

    #[test]
    fn ratio_rounds_half_up() {
        // mean of [3, 3, 3] = 3; 2 / 3 = 0.66666.. -> 0.6667
        let series = bars(&[3, 3, 3, 2]);
        let cache = VolumeStatisticsCache::from_bars(&series, 3).unwrap();
        assert_eq!(cache.get(series[3].timestamp), Some(dec!(0.6667)));

        // mean of [8, 8] = 8; 1 / 8 = 0.125 exactly
        let series = bars(&[8, 8, 1]);
        let cache = VolumeStatisticsCache::from_bars(&series, 2).unwrap();
        assert_eq!(cache.get(series[2].timestamp), Some(dec!(0.125)));

        // mean of [16, 16] = 16; 1 / 16 = 0.0625 exactly
        let series = bars(&[16, 16, 1]);
        let cache = VolumeStatisticsCache::from_bars(&series, 2).unwrap();
        assert_eq!(cache.get(series[2].timestamp), Some(dec!(0.0625)));

        // mean of [32, 32] = 32; 1 / 32 = 0.03125 -> 0.0313 (half-up)
        let series = bars(&[32, 32, 1]);
        let cache = VolumeStatisticsCache::from_bars(&series, 2).unwrap();
        assert_eq!(cache.get(series[2].timestamp), Some(dec!(0.0313)));
    }

    #[test]
    fn window_slides() {
        // window 2: ratio at i uses volumes i-2, i-1
        let series = bars(&[10, 10, 20, 40]);
        let cache = VolumeStatisticsCache::from_bars(&series, 2).unwrap();
        assert_eq!(cache.get(series[2].timestamp), Some(dec!(2)));
        // mean(10, 20) = 15; 40 / 15 = 2.6667
        assert_eq!(cache.get(series[3].timestamp), Some(dec!(2.6667)));
    }

    #[test]
    fn non_monotonic_push_rejected() {
        let series = bars(&[10, 10]);
        let mut cache = VolumeStatisticsCache::new(1).unwrap();
        cache.push(&series[1]).unwrap();
        let err = cache.push(&series[0]).unwrap_err();
        assert!(matches!(err, CacheError::NonMonotonic { .. }));

        let err = cache.push(&series[1]).unwrap_err();
        assert!(matches!(err, CacheError::NonMonotonic { .. }));
    }

    #[test]
    fn invalidate_removes_entry() {
        let series = bars(&[10, 10, 30]);
        let mut cache = VolumeStatisticsCache::from_bars(&series, 2).unwrap();
        let ts = series[2].timestamp;
        assert_eq!(cache.invalidate(ts), Some(dec!(3)));
        assert_eq!(cache.get(ts), None);
        assert_eq!(cache.invalidate(ts), None);
    }
}
