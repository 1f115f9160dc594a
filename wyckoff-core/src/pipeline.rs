//! Per-bar detection pipeline.
//!
//! One pipeline owns one volume cache, one scanner and one campaign tracker.
//! Each bar goes through four steps:
//!
//! 1. Volume: push into the rolling cache, get the bar's ratio
//! 2. Housekeeping: dormancy check on open campaigns
//! 3. Scan: classify the bar against the trailing window and open campaign
//! 4. Sequence: route any detected pattern through the tracker
//!
//! Bars must already be validated and ordered; the replay driver does that.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use thiserror::Error;
use tracing::debug;

use crate::config::{ConfigError, EngineConfig};
use crate::domain::{Bar, Campaign, CampaignState, PatternKind};
use crate::lifecycle::LifecycleError;
use crate::scanner::{PatternScanner, ScanContext};
use crate::sequence::SequenceEvent;
use crate::tracker::{CampaignTracker, TrackerStats};
use crate::volume::{CacheError, VolumeStatisticsCache};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("volume cache: {0}")]
    Cache(#[from] CacheError),
    #[error("campaign lifecycle: {0}")]
    Lifecycle(#[from] LifecycleError),
}

/// What happened on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct BarOutcome {
    pub bar_index: usize,
    pub volume_ratio: Option<Decimal>,
    pub pattern: Option<PatternKind>,
    pub rejections: usize,
    pub events: Vec<SequenceEvent>,
}

/// Everything a pipeline produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub scanner: String,
    pub bars_processed: usize,
    pub patterns_detected: usize,
    pub stats: TrackerStats,
    /// Rejected candidates by reason code.
    pub rejection_counts: BTreeMap<String, usize>,
    /// Campaigns by open time. Terminal unless the run was interrupted.
    pub campaigns: Vec<Campaign>,
    /// False when the run stopped early and open campaigns were left as-is.
    pub closed: bool,
}

impl PipelineResult {
    pub fn count_in_state(&self, state: CampaignState) -> usize {
        self.campaigns.iter().filter(|c| c.state == state).count()
    }
}

pub struct DetectionPipeline {
    trailing_bars: usize,
    range_lookback: usize,
    cache: VolumeStatisticsCache,
    scanner: Box<dyn PatternScanner>,
    tracker: CampaignTracker,
    history: VecDeque<Bar>,
    bars_processed: usize,
    patterns_detected: usize,
    rejection_counts: BTreeMap<&'static str, usize>,
    closed: bool,
}

impl DetectionPipeline {
    pub fn new(config: &EngineConfig, scanner: Box<dyn PatternScanner>) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = VolumeStatisticsCache::new(config.volume_window)
            .map_err(|e| ConfigError::invalid("volume_window", e.to_string()))?;
        let depth = config.trailing_bars.max(config.range_lookback);
        Ok(Self {
            trailing_bars: config.trailing_bars,
            range_lookback: config.range_lookback,
            cache,
            scanner,
            tracker: CampaignTracker::new(config.campaign.clone()),
            history: VecDeque::with_capacity(depth + 1),
            bars_processed: 0,
            patterns_detected: 0,
            rejection_counts: BTreeMap::new(),
            closed: false,
        })
    }

    pub fn scanner_name(&self) -> &str {
        self.scanner.name()
    }

    pub fn bars_processed(&self) -> usize {
        self.bars_processed
    }

    pub fn tracker(&self) -> &CampaignTracker {
        &self.tracker
    }

    pub fn cache(&self) -> &VolumeStatisticsCache {
        &self.cache
    }

    pub fn process(&mut self, bar_index: usize, bar: &Bar) -> Result<BarOutcome, PipelineError> {
        let volume_ratio = self.cache.push(bar)?;
        self.tracker.on_bar(bar_index, bar)?;

        let history: &[Bar] = self.history.make_contiguous();
        let ctx = ScanContext {
            bar,
            bar_index,
            volume_ratio,
            trailing: &history[history.len().saturating_sub(self.trailing_bars)..],
            range_window: &history[history.len().saturating_sub(self.range_lookback)..],
            campaign: self.tracker.open_campaign(&bar.symbol, bar.timeframe),
        };
        let scan = self.scanner.scan(&ctx);

        for rejection in &scan.rejections {
            *self
                .rejection_counts
                .entry(rejection.reason.code())
                .or_default() += 1;
        }
        let pattern = scan.pattern.as_ref().map(|p| p.kind);
        let events = match scan.pattern {
            Some(found) => {
                debug!(bar = bar_index, kind = %found.kind, "pattern detected");
                self.patterns_detected += 1;
                self.tracker.on_pattern(found)?
            }
            None => Vec::new(),
        };

        let depth = self.trailing_bars.max(self.range_lookback);
        if self.history.len() == depth {
            self.history.pop_front();
        }
        self.history.push_back(bar.clone());
        self.bars_processed += 1;

        Ok(BarOutcome {
            bar_index,
            volume_ratio,
            pattern,
            rejections: scan.rejections.len(),
            events,
        })
    }

    /// End of input: apply the closing rule to every open campaign.
    pub fn finish(mut self) -> Result<PipelineResult, PipelineError> {
        self.close_campaigns()?;
        Ok(self.into_result())
    }

    /// Apply the closing rule in place. On error the pipeline keeps whatever
    /// it has and its result reports `closed: false`.
    pub fn close_campaigns(&mut self) -> Result<(), PipelineError> {
        self.tracker.finish()?;
        self.closed = true;
        Ok(())
    }

    /// Everything produced so far. Without a successful
    /// [`close_campaigns`](Self::close_campaigns), open campaigns stay in
    /// their current state.
    pub fn into_result(self) -> PipelineResult {
        PipelineResult {
            scanner: self.scanner.name().to_string(),
            bars_processed: self.bars_processed,
            patterns_detected: self.patterns_detected,
            stats: self.tracker.stats(),
            rejection_counts: self
                .rejection_counts
                .into_iter()
                .map(|(code, n)| (code.to_string(), n))
                .collect(),
            campaigns: self.tracker.into_lifecycle().into_campaigns(),
            closed: self.closed,
        }
    }
}

impl std::fmt::Debug for DetectionPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectionPipeline")
            .field("scanner", &self.scanner.name())
            .field("bars_processed", &self.bars_processed)
            .field("patterns_detected", &self.patterns_detected)
            .finish()
    }
}
