//! Pattern classification: stateless decision functions, one per variant.
//!
//! Every function takes a [`ClassifierInput`] and returns either a
//! [`PatternInstance`] carrying the metrics and the gates it cleared, or a
//! [`Rejection`] naming the first gate that failed. All comparisons are done
//! in `Decimal`; percentages are rounded to four places before comparison so
//! the same bar always yields the same verdict.

pub mod breakout;
pub mod climax;
pub mod measured_move;
pub mod pullback;
pub mod retest;
pub mod spring;
pub mod utad;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::config::ThresholdSet;
use crate::domain::{Bar, GateCheck, PatternInstance, PatternKind, PatternMetrics, TradingRange};

pub use breakout::{classify_sign_of_strength, classify_sign_of_weakness};
pub use climax::{
    classify_automatic_rally, classify_automatic_reaction, classify_buying_climax,
    classify_selling_climax,
};
pub use measured_move::{classify_markdown_target, classify_markup_target};
pub use pullback::{classify_last_point_of_supply, classify_last_point_of_support};
pub use retest::{classify_secondary_test, classify_secondary_test_distribution};
pub use spring::classify_spring;
pub use utad::classify_utad;

/// Fractional digits kept on percentages and multiples.
pub const METRIC_DECIMALS: u32 = 4;

/// Everything a classifier may look at for one candidate bar.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub bar: &'a Bar,
    pub bar_index: usize,
    pub range: &'a Arc<TradingRange>,
    /// Rolling volume ratio of `bar`, when defined.
    pub volume_ratio: Option<Decimal>,
    /// Up to N bars immediately preceding `bar`, oldest first.
    pub trailing: &'a [Bar],
    /// Extreme printed by the campaign's climax; required by AR and ST.
    pub climax_extreme: Option<Decimal>,
    /// Thresholds already selected for the instrument's asset class.
    pub thresholds: &'a ThresholdSet,
}

/// Typed reason a candidate did not qualify.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    #[error("pattern is only accepted from an external feed")]
    ExternalOnly,

    #[error("trading range is degenerate")]
    InvalidRange,

    #[error("no volume ratio for this bar")]
    MissingVolumeRatio,

    #[error("needs {needed} trailing bars, have {available}")]
    InsufficientHistory { needed: usize, available: usize },

    #[error("trailing bars have zero average spread")]
    FlatHistory,

    #[error("no climax extreme to measure from")]
    MissingClimax,

    #[error("extreme {extreme} does not penetrate {level}")]
    NoPenetration { level: Decimal, extreme: Decimal },

    #[error("penetration {actual}% outside [{min}%, {max}%]")]
    PenetrationOutOfBounds {
        actual: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("close {close} did not recover {level}")]
    NoRecovery { close: Decimal, level: Decimal },

    #[error("volume ratio {ratio} above {max}")]
    VolumeTooHigh { ratio: Decimal, max: Decimal },

    #[error("volume ratio {ratio} below {min}")]
    VolumeTooLow { ratio: Decimal, min: Decimal },

    #[error("close position {actual} below {min}")]
    WeakClose { actual: Decimal, min: Decimal },

    #[error("close {close} not beyond {level}")]
    NoBreakout { close: Decimal, level: Decimal },

    #[error("breakout {actual}% outside [{min}%, {max}%]")]
    BreakoutOutOfBounds {
        actual: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("spread multiple {actual} below {min}")]
    NarrowSpread { actual: Decimal, min: Decimal },

    #[error("{distance_pct}% from level, max {max}%")]
    TooFarFromLevel { distance_pct: Decimal, max: Decimal },

    #[error("undercut {undercut_pct}% exceeds {max}%")]
    Undercut { undercut_pct: Decimal, max: Decimal },

    #[error("prior move {actual}% below {min}%")]
    PriorMoveTooSmall { actual: Decimal, min: Decimal },

    #[error("reaction {actual}% below {min}%")]
    ReactionTooSmall { actual: Decimal, min: Decimal },

    #[error("close {close} short of target {target}")]
    TargetNotReached { close: Decimal, target: Decimal },
}

impl RejectionReason {
    /// Stable code for telemetry tallies.
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::ExternalOnly => "external_only",
            RejectionReason::InvalidRange => "invalid_range",
            RejectionReason::MissingVolumeRatio => "missing_volume_ratio",
            RejectionReason::InsufficientHistory { .. } => "insufficient_history",
            RejectionReason::FlatHistory => "flat_history",
            RejectionReason::MissingClimax => "missing_climax",
            RejectionReason::NoPenetration { .. } => "no_penetration",
            RejectionReason::PenetrationOutOfBounds { .. } => "penetration_out_of_bounds",
            RejectionReason::NoRecovery { .. } => "no_recovery",
            RejectionReason::VolumeTooHigh { .. } => "volume_too_high",
            RejectionReason::VolumeTooLow { .. } => "volume_too_low",
            RejectionReason::WeakClose { .. } => "weak_close",
            RejectionReason::NoBreakout { .. } => "no_breakout",
            RejectionReason::BreakoutOutOfBounds { .. } => "breakout_out_of_bounds",
            RejectionReason::NarrowSpread { .. } => "narrow_spread",
            RejectionReason::TooFarFromLevel { .. } => "too_far_from_level",
            RejectionReason::Undercut { .. } => "undercut",
            RejectionReason::PriorMoveTooSmall { .. } => "prior_move_too_small",
            RejectionReason::ReactionTooSmall { .. } => "reaction_too_small",
            RejectionReason::TargetNotReached { .. } => "target_not_reached",
        }
    }
}

/// A candidate that failed classification, kept for audit.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind} rejected at bar {bar_index}: {reason}")]
pub struct Rejection {
    pub kind: PatternKind,
    pub bar_index: usize,
    pub reason: RejectionReason,
}

pub type Classification = Result<PatternInstance, Rejection>;

/// Exhaustive dispatch over pattern kinds.
pub fn classify(kind: PatternKind, input: &ClassifierInput<'_>) -> Classification {
    use PatternKind::*;
    match kind {
        PreliminarySupport | PreliminarySupply => {
            Err(reject(kind, input, RejectionReason::ExternalOnly))
        }
        SellingClimax => classify_selling_climax(input),
        AutomaticRally => classify_automatic_rally(input),
        SecondaryTest => classify_secondary_test(input),
        Spring => classify_spring(input),
        SignOfStrength => classify_sign_of_strength(input),
        LastPointOfSupport => classify_last_point_of_support(input),
        MarkupTarget => classify_markup_target(input),
        BuyingClimax => classify_buying_climax(input),
        AutomaticReaction => classify_automatic_reaction(input),
        SecondaryTestDistribution => classify_secondary_test_distribution(input),
        Utad => classify_utad(input),
        SignOfWeakness => classify_sign_of_weakness(input),
        LastPointOfSupply => classify_last_point_of_supply(input),
        MarkdownTarget => classify_markdown_target(input),
    }
}

// ── Shared helpers ──────────────────────────────────────────────────

pub(crate) fn reject(kind: PatternKind, input: &ClassifierInput<'_>, reason: RejectionReason) -> Rejection {
    Rejection {
        kind,
        bar_index: input.bar_index,
        reason,
    }
}

pub(crate) fn accept(
    kind: PatternKind,
    input: &ClassifierInput<'_>,
    metrics: PatternMetrics,
    gates: Vec<GateCheck>,
) -> PatternInstance {
    let bar = input.bar;
    PatternInstance::new(
        kind,
        &bar.symbol,
        bar.timeframe,
        input.bar_index,
        bar.timestamp,
        bar.close,
        Arc::clone(input.range),
        metrics,
        gates,
    )
}

/// `part / whole * 100`, rounded. `whole` must be positive.
pub(crate) fn pct(part: Decimal, whole: Decimal) -> Decimal {
    (part / whole * dec!(100)).round_dp(METRIC_DECIMALS)
}

pub(crate) fn require_range(kind: PatternKind, input: &ClassifierInput<'_>) -> Result<(), Rejection> {
    if input.range.is_valid() {
        Ok(())
    } else {
        Err(reject(kind, input, RejectionReason::InvalidRange))
    }
}

pub(crate) fn require_ratio(kind: PatternKind, input: &ClassifierInput<'_>) -> Result<Decimal, Rejection> {
    input
        .volume_ratio
        .ok_or_else(|| reject(kind, input, RejectionReason::MissingVolumeRatio))
}

/// Bar spread over the trailing mean spread.
pub(crate) fn spread_multiple(kind: PatternKind, input: &ClassifierInput<'_>) -> Result<Decimal, Rejection> {
    if input.trailing.is_empty() {
        return Err(reject(
            kind,
            input,
            RejectionReason::InsufficientHistory {
                needed: 1,
                available: 0,
            },
        ));
    }
    let total: Decimal = input.trailing.iter().map(Bar::spread).sum();
    let mean = total / Decimal::from(input.trailing.len() as u64);
    if mean.is_zero() {
        return Err(reject(kind, input, RejectionReason::FlatHistory));
    }
    Ok((input.bar.spread() / mean).round_dp(METRIC_DECIMALS))
}

/// Close position counted from the low (`upward`) or from the high.
pub(crate) fn directional_close_position(bar: &Bar, upward: bool) -> Decimal {
    let cp = bar.close_position();
    let cp = if upward { cp } else { Decimal::ONE - cp };
    cp.round_dp(METRIC_DECIMALS)
}
