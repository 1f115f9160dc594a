//! Replay report: per-configuration summaries and their comparison.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use wyckoff_core::domain::{Campaign, CampaignState};
use wyckoff_core::metrics::CampaignMetrics;
use wyckoff_core::pipeline::PipelineResult;
use wyckoff_core::tracker::TrackerStats;

/// One pipeline's output plus its derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub label: String,
    pub scanner: String,
    pub bars_processed: usize,
    pub patterns_detected: usize,
    pub stats: TrackerStats,
    pub rejection_counts: BTreeMap<String, usize>,
    pub metrics: CampaignMetrics,
    pub campaigns: Vec<Campaign>,
    /// False when the run stopped early; open campaigns were not closed.
    pub closed: bool,
}

impl PipelineSummary {
    pub fn new(label: impl Into<String>, result: PipelineResult) -> Self {
        let metrics = CampaignMetrics::compute(&result.campaigns);
        Self {
            label: label.into(),
            scanner: result.scanner,
            bars_processed: result.bars_processed,
            patterns_detected: result.patterns_detected,
            stats: result.stats,
            rejection_counts: result.rejection_counts,
            metrics,
            campaigns: result.campaigns,
            closed: result.closed,
        }
    }
}

/// Proposed minus current.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    pub campaigns: i64,
    pub completed: i64,
    pub failed: i64,
    pub completion_rate: f64,
    pub win_rate: f64,
    pub total_realized_r: Decimal,
    pub mean_realized_r: Option<Decimal>,
    /// Only pattern codes whose count changed.
    pub pattern_counts: BTreeMap<String, i64>,
}

impl Comparison {
    pub fn between(current: &CampaignMetrics, proposed: &CampaignMetrics) -> Self {
        let delta = |a: usize, b: usize| b as i64 - a as i64;
        let codes: BTreeSet<&String> = current
            .pattern_counts
            .keys()
            .chain(proposed.pattern_counts.keys())
            .collect();
        let pattern_counts = codes
            .into_iter()
            .filter_map(|code| {
                let before = current.pattern_counts.get(code).copied().unwrap_or(0);
                let after = proposed.pattern_counts.get(code).copied().unwrap_or(0);
                (before != after).then(|| (code.clone(), delta(before, after)))
            })
            .collect();
        let mean_realized_r = match (current.mean_realized_r, proposed.mean_realized_r) {
            (Some(a), Some(b)) => Some(b - a),
            _ => None,
        };
        Self {
            campaigns: delta(current.total, proposed.total),
            completed: delta(
                current.count(CampaignState::Completed),
                proposed.count(CampaignState::Completed),
            ),
            failed: delta(
                current.count(CampaignState::Failed),
                proposed.count(CampaignState::Failed),
            ),
            completion_rate: proposed.completion_rate - current.completion_rate,
            win_rate: proposed.win_rate - current.win_rate,
            total_realized_r: proposed.total_realized_r - current.total_realized_r,
            mean_realized_r,
            pattern_counts,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.campaigns == 0
            && self.completed == 0
            && self.failed == 0
            && self.total_realized_r.is_zero()
            && self.pattern_counts.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayReport {
    pub current: PipelineSummary,
    pub proposed: PipelineSummary,
    pub comparison: Comparison,
}

impl ReplayReport {
    pub fn new(current: PipelineResult, proposed: PipelineResult) -> Self {
        let current = PipelineSummary::new("current", current);
        let proposed = PipelineSummary::new("proposed", proposed);
        let comparison = Comparison::between(&current.metrics, &proposed.metrics);
        Self {
            current,
            proposed,
            comparison,
        }
    }

    /// Plain-text table for terminal output.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{:<22}{:>14}{:>14}", "", "current", "proposed");
        let row = |out: &mut String, name: &str, a: String, b: String| {
            let _ = writeln!(out, "{name:<22}{a:>14}{b:>14}");
        };
        let (c, p) = (&self.current, &self.proposed);
        row(&mut out, "bars", c.bars_processed.to_string(), p.bars_processed.to_string());
        row(&mut out, "patterns", c.patterns_detected.to_string(), p.patterns_detected.to_string());
        row(&mut out, "campaigns", c.metrics.total.to_string(), p.metrics.total.to_string());
        for state in CampaignState::ALL {
            row(
                &mut out,
                state.as_str(),
                c.metrics.count(state).to_string(),
                p.metrics.count(state).to_string(),
            );
        }
        row(
            &mut out,
            "completion rate",
            format!("{:.1}%", c.metrics.completion_rate * 100.0),
            format!("{:.1}%", p.metrics.completion_rate * 100.0),
        );
        row(
            &mut out,
            "win rate",
            format!("{:.1}%", c.metrics.win_rate * 100.0),
            format!("{:.1}%", p.metrics.win_rate * 100.0),
        );
        let mean = |m: &CampaignMetrics| {
            m.mean_realized_r
                .map(|r| format!("{r}R"))
                .unwrap_or_else(|| "-".into())
        };
        row(&mut out, "mean R", mean(&c.metrics), mean(&p.metrics));
        row(
            &mut out,
            "total R",
            format!("{}R", c.metrics.total_realized_r),
            format!("{}R", p.metrics.total_realized_r),
        );
        if !c.closed || !p.closed {
            let _ = writeln!(out, "(partial: run stopped before the last bar)");
        }
        out
    }
}
