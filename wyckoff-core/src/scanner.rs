//! Per-bar pattern scanning strategies.
//!
//! A scanner sees one bar at a time together with its rolling volume ratio,
//! the trailing window and the open campaign (if any), and proposes at most
//! one pattern. It only proposes candidates the sequence detector would
//! accept: a valid next token for the open campaign, or a family starter.

use rust_decimal::Decimal;
use std::sync::Arc;

use crate::classifier::{classify, ClassifierInput, Rejection};
use crate::config::ThresholdSet;
use crate::domain::{
    Bar, Campaign, CampaignId, Family, PatternInstance, PatternKind, PatternMetrics, RangeStatus,
    TradingRange,
};
use crate::sequence::is_valid_next;

/// What a scanner sees for one bar.
#[derive(Debug, Clone, Copy)]
pub struct ScanContext<'a> {
    pub bar: &'a Bar,
    pub bar_index: usize,
    pub volume_ratio: Option<Decimal>,
    /// Bars before `bar`, oldest first; at most N.
    pub trailing: &'a [Bar],
    /// Bars before `bar` spanned by the rolling range.
    pub range_window: &'a [Bar],
    pub campaign: Option<&'a Campaign>,
}

/// Result of scanning one bar.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub pattern: Option<PatternInstance>,
    /// Every candidate tried and rejected on this bar.
    pub rejections: Vec<Rejection>,
}

impl ScanOutcome {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Per-bar strategy plugged into a detection pipeline.
pub trait PatternScanner: Send {
    /// Human-readable name (e.g., "wyckoff").
    fn name(&self) -> &str;

    fn scan(&mut self, ctx: &ScanContext<'_>) -> ScanOutcome;
}

/// Scanner that never proposes anything. Measures raw pipeline overhead.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScanner;

impl PatternScanner for NullScanner {
    fn name(&self) -> &str {
        "null"
    }

    fn scan(&mut self, _ctx: &ScanContext<'_>) -> ScanOutcome {
        ScanOutcome::none()
    }
}

const UPWARD_ORDER: [PatternKind; 7] = [
    PatternKind::MarkupTarget,
    PatternKind::LastPointOfSupport,
    PatternKind::SignOfStrength,
    PatternKind::Spring,
    PatternKind::SecondaryTest,
    PatternKind::AutomaticRally,
    PatternKind::SellingClimax,
];

const DOWNWARD_ORDER: [PatternKind; 7] = [
    PatternKind::MarkdownTarget,
    PatternKind::LastPointOfSupply,
    PatternKind::SignOfWeakness,
    PatternKind::Utad,
    PatternKind::SecondaryTestDistribution,
    PatternKind::AutomaticReaction,
    PatternKind::BuyingClimax,
];

/// Classifies bars against the Wyckoff templates.
///
/// With no campaign open it looks for a selling or buying climax against the
/// rolling range. Inside a campaign it tries the valid next tokens, most
/// advanced first, against the campaign's anchored range; if none fits, an
/// opposite-family climax is tried, which would end the campaign.
#[derive(Debug, Clone)]
pub struct WyckoffScanner {
    thresholds: ThresholdSet,
    anchored: Option<AnchoredRange>,
}

#[derive(Debug, Clone)]
struct AnchoredRange {
    campaign_id: CampaignId,
    pattern_count: usize,
    range: Option<Arc<TradingRange>>,
    climax_extreme: Option<Decimal>,
}

impl WyckoffScanner {
    pub fn new(thresholds: ThresholdSet) -> Self {
        Self {
            thresholds,
            anchored: None,
        }
    }

    /// Rolling range over the lookback window.
    fn rolling_range(ctx: &ScanContext<'_>) -> Arc<TradingRange> {
        let bars = if ctx.range_window.is_empty() {
            std::slice::from_ref(ctx.bar)
        } else {
            ctx.range_window
        };
        let mut support = bars[0].low;
        let mut resistance = bars[0].high;
        for bar in &bars[1..] {
            support = support.min(bar.low);
            resistance = resistance.max(bar.high);
        }
        Arc::new(TradingRange::forming(
            support,
            resistance,
            ctx.bar.timestamp,
        ))
    }

    /// Refresh the campaign anchors if the campaign changed since last bar.
    fn sync_anchors(&mut self, campaign: Option<&Campaign>) {
        let Some(campaign) = campaign else {
            self.anchored = None;
            return;
        };
        let fresh = self.anchored.as_ref().is_some_and(|a| {
            a.campaign_id == campaign.id && a.pattern_count == campaign.patterns().len()
        });
        if !fresh {
            self.anchored = Some(anchor_campaign(campaign));
        }
    }
}

/// Climax extreme anchors one boundary, the reaction extreme the other.
fn anchor_campaign(campaign: &Campaign) -> AnchoredRange {
    let upward = campaign.family.is_upward();
    let mut climax = None;
    let mut reaction = None;
    let mut broke_out = false;
    let mut as_of = campaign.opened_at;
    for p in campaign.patterns() {
        match (&p.metrics, p.kind) {
            (PatternMetrics::Climax(m), _) => climax = Some(m.extreme),
            (PatternMetrics::Reaction(m), _) => {
                reaction = Some(m.extreme);
                as_of = p.timestamp;
            }
            (_, PatternKind::SignOfStrength | PatternKind::SignOfWeakness) => broke_out = true,
            _ => {}
        }
    }

    let range = match (climax, reaction) {
        (Some(c), Some(r)) => {
            let (support, resistance) = if upward { (c, r) } else { (r, c) };
            let range = TradingRange::anchored(support, resistance, as_of);
            if !range.is_valid() {
                None
            } else if broke_out {
                let status = if upward {
                    RangeStatus::Breakout
                } else {
                    RangeStatus::Breakdown
                };
                Some(Arc::new(range.with_status(status, as_of)))
            } else {
                Some(Arc::new(range))
            }
        }
        _ => None,
    };
    AnchoredRange {
        campaign_id: campaign.id.clone(),
        pattern_count: campaign.patterns().len(),
        range,
        climax_extreme: climax,
    }
}

impl PatternScanner for WyckoffScanner {
    fn name(&self) -> &str {
        "wyckoff"
    }

    fn scan(&mut self, ctx: &ScanContext<'_>) -> ScanOutcome {
        self.sync_anchors(ctx.campaign);
        let history = ctx.campaign.map(Campaign::pattern_kinds).unwrap_or_default();

        let (range, climax_extreme) = match &self.anchored {
            Some(AnchoredRange {
                range: Some(range),
                climax_extreme,
                ..
            }) => (Arc::clone(range), *climax_extreme),
            Some(a) => (Self::rolling_range(ctx), a.climax_extreme),
            None => (Self::rolling_range(ctx), None),
        };
        let input = ClassifierInput {
            bar: ctx.bar,
            bar_index: ctx.bar_index,
            range: &range,
            volume_ratio: ctx.volume_ratio,
            trailing: ctx.trailing,
            climax_extreme,
            thresholds: &self.thresholds,
        };

        let candidates: Vec<PatternKind> = match ctx.campaign.map(|c| c.family) {
            Some(family) => {
                let (own, other) = match family {
                    Family::Accumulation => (&UPWARD_ORDER, PatternKind::BuyingClimax),
                    Family::Distribution => (&DOWNWARD_ORDER, PatternKind::SellingClimax),
                };
                own.iter()
                    .copied()
                    .filter(|k| is_valid_next(&history, *k))
                    .chain(std::iter::once(other))
                    .collect()
            }
            None => vec![PatternKind::SellingClimax, PatternKind::BuyingClimax],
        };

        let mut outcome = ScanOutcome::none();
        for kind in candidates {
            match classify(kind, &input) {
                Ok(pattern) => {
                    outcome.pattern = Some(pattern);
                    break;
                }
                Err(rejection) => outcome.rejections.push(rejection),
            }
        }
        outcome
    }
}
