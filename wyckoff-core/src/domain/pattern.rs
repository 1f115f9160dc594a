//! Pattern kinds, Wyckoff phases and detected pattern instances.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::ids::PatternId;
use super::range::TradingRange;
use super::timeframe::Timeframe;

/// The two disjoint pattern families. A campaign never mixes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Upward cycle: climax, spring, markup.
    Accumulation,
    /// Downward mirror: climax, upthrust, markdown.
    Distribution,
}

impl Family {
    pub fn is_upward(self) -> bool {
        matches!(self, Family::Accumulation)
    }
}

/// Wyckoff phase A–E.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WyckoffPhase {
    A,
    B,
    C,
    D,
    E,
}

/// Closed set of pattern tokens a campaign is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatternKind {
    // Accumulation
    PreliminarySupport,
    SellingClimax,
    AutomaticRally,
    SecondaryTest,
    Spring,
    SignOfStrength,
    LastPointOfSupport,
    MarkupTarget,
    // Distribution
    PreliminarySupply,
    BuyingClimax,
    AutomaticReaction,
    SecondaryTestDistribution,
    Utad,
    SignOfWeakness,
    LastPointOfSupply,
    MarkdownTarget,
}

impl PatternKind {
    pub const ALL: [PatternKind; 16] = [
        PatternKind::PreliminarySupport,
        PatternKind::SellingClimax,
        PatternKind::AutomaticRally,
        PatternKind::SecondaryTest,
        PatternKind::Spring,
        PatternKind::SignOfStrength,
        PatternKind::LastPointOfSupport,
        PatternKind::MarkupTarget,
        PatternKind::PreliminarySupply,
        PatternKind::BuyingClimax,
        PatternKind::AutomaticReaction,
        PatternKind::SecondaryTestDistribution,
        PatternKind::Utad,
        PatternKind::SignOfWeakness,
        PatternKind::LastPointOfSupply,
        PatternKind::MarkdownTarget,
    ];

    pub fn family(self) -> Family {
        use PatternKind::*;
        match self {
            PreliminarySupport | SellingClimax | AutomaticRally | SecondaryTest | Spring
            | SignOfStrength | LastPointOfSupport | MarkupTarget => Family::Accumulation,
            PreliminarySupply | BuyingClimax | AutomaticReaction | SecondaryTestDistribution
            | Utad | SignOfWeakness | LastPointOfSupply | MarkdownTarget => Family::Distribution,
        }
    }

    pub fn phase(self) -> WyckoffPhase {
        use PatternKind::*;
        match self {
            PreliminarySupport | SellingClimax | AutomaticRally | PreliminarySupply
            | BuyingClimax | AutomaticReaction => WyckoffPhase::A,
            SecondaryTest | SecondaryTestDistribution => WyckoffPhase::B,
            Spring | Utad => WyckoffPhase::C,
            SignOfStrength | LastPointOfSupport | SignOfWeakness | LastPointOfSupply => {
                WyckoffPhase::D
            }
            MarkupTarget | MarkdownTarget => WyckoffPhase::E,
        }
    }

    /// Patterns allowed to open a campaign.
    pub fn is_starter(self) -> bool {
        use PatternKind::*;
        matches!(
            self,
            PreliminarySupport | SellingClimax | PreliminarySupply | BuyingClimax
        )
    }

    /// Measured-move marker that completes a campaign.
    pub fn is_terminal(self) -> bool {
        matches!(self, PatternKind::MarkupTarget | PatternKind::MarkdownTarget)
    }

    /// Patterns that offer a trade entry and carry a structural stop.
    pub fn is_entry(self) -> bool {
        use PatternKind::*;
        matches!(
            self,
            Spring | SignOfStrength | LastPointOfSupport | Utad | SignOfWeakness | LastPointOfSupply
        )
    }

    /// Stable short code used in ids and tallies.
    pub fn code(self) -> &'static str {
        use PatternKind::*;
        match self {
            PreliminarySupport => "PS",
            SellingClimax => "SC",
            AutomaticRally => "AR",
            SecondaryTest => "ST",
            Spring => "SPRING",
            SignOfStrength => "SOS",
            LastPointOfSupport => "LPS",
            MarkupTarget => "MARKUP_TARGET",
            PreliminarySupply => "PSY",
            BuyingClimax => "BC",
            AutomaticReaction => "AR_DIST",
            SecondaryTestDistribution => "ST_DIST",
            Utad => "UTAD",
            SignOfWeakness => "SOW",
            LastPointOfSupply => "LPSY",
            MarkdownTarget => "MARKDOWN_TARGET",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Threshold a detection was measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    MinPenetrationPct,
    MaxPenetrationPct,
    MinBreakoutPct,
    MaxBreakoutPct,
    MinVolumeRatio,
    MaxVolumeRatio,
    MinClosePosition,
    MaxClosePosition,
    MinSpreadMultiple,
    MaxDistancePct,
    MaxUndercutPct,
    MinPriorMovePct,
    MinReactionPct,
    TargetLevel,
}

/// One satisfied threshold: the measured value and the limit it cleared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub gate: Gate,
    pub actual: Decimal,
    pub limit: Decimal,
}

impl GateCheck {
    pub fn new(gate: Gate, actual: Decimal, limit: Decimal) -> Self {
        Self {
            gate,
            actual,
            limit,
        }
    }
}

/// Spring / UTAD: a penetration of a range boundary that closes back inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenetrationMetrics {
    pub reference_level: Decimal,
    /// Bar low for a spring, bar high for an upthrust.
    pub extreme: Decimal,
    pub penetration_pct: Decimal,
    pub volume_ratio: Decimal,
    pub close_position: Decimal,
}

/// SOS / SOW: a decisive close beyond the creek or ice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutMetrics {
    pub reference_level: Decimal,
    pub breakout_pct: Decimal,
    pub volume_ratio: Decimal,
    pub spread_multiple: Decimal,
    pub close_position: Decimal,
}

/// LPS / LPSY: a shallow retest of the broken level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullbackMetrics {
    pub reference_level: Decimal,
    /// Signed distance of the probing extreme from the reference, in percent.
    /// Positive means the retest held on the breakout side.
    pub distance_pct: Decimal,
    pub extreme: Decimal,
    pub volume_ratio: Decimal,
    pub close_position: Decimal,
}

/// SC / BC: exhaustion bar on extreme volume and spread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimaxMetrics {
    pub extreme: Decimal,
    pub volume_ratio: Decimal,
    pub spread_multiple: Decimal,
    pub prior_move_pct: Decimal,
    pub close_position: Decimal,
}

/// AR: the reflex move away from the climax extreme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionMetrics {
    pub anchor: Decimal,
    pub extreme: Decimal,
    pub reaction_pct: Decimal,
}

/// ST: a low-volume revisit of the climax level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetestMetrics {
    pub reference_level: Decimal,
    pub extreme: Decimal,
    pub distance_pct: Decimal,
    pub volume_ratio: Decimal,
}

/// Measured-move marker: price reached the range-height projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetMetrics {
    pub target_level: Decimal,
    pub close: Decimal,
}

/// Detection payload, one variant per classified shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum PatternMetrics {
    Penetration(PenetrationMetrics),
    Breakout(BreakoutMetrics),
    Pullback(PullbackMetrics),
    Climax(ClimaxMetrics),
    Reaction(ReactionMetrics),
    Retest(RetestMetrics),
    Target(TargetMetrics),
    /// Event supplied by an external feed without detection metrics.
    Reported,
}

impl PatternMetrics {
    /// Price extreme the pattern printed, when the shape has one.
    pub fn extreme(&self) -> Option<Decimal> {
        match self {
            PatternMetrics::Penetration(m) => Some(m.extreme),
            PatternMetrics::Pullback(m) => Some(m.extreme),
            PatternMetrics::Climax(m) => Some(m.extreme),
            PatternMetrics::Reaction(m) => Some(m.extreme),
            PatternMetrics::Retest(m) => Some(m.extreme),
            PatternMetrics::Breakout(_) | PatternMetrics::Target(_) | PatternMetrics::Reported => {
                None
            }
        }
    }
}

/// A detected pattern bound to the range snapshot it was measured against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInstance {
    pub id: PatternId,
    pub kind: PatternKind,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub bar_index: usize,
    pub timestamp: DateTime<Utc>,
    /// Close of the detection bar.
    pub close: Decimal,
    pub range: Arc<TradingRange>,
    pub metrics: PatternMetrics,
    pub gates: Vec<GateCheck>,
}

impl PatternInstance {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        kind: PatternKind,
        symbol: &str,
        timeframe: Timeframe,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        close: Decimal,
        range: Arc<TradingRange>,
        metrics: PatternMetrics,
        gates: Vec<GateCheck>,
    ) -> Self {
        Self {
            id: PatternId::for_detection(symbol, timeframe, timestamp, kind),
            kind,
            symbol: symbol.to_string(),
            timeframe,
            bar_index,
            timestamp,
            close,
            range,
            metrics,
            gates,
        }
    }

    /// An externally reported event (e.g. preliminary support from an upstream feed).
    pub fn reported(
        kind: PatternKind,
        symbol: &str,
        timeframe: Timeframe,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        close: Decimal,
        range: Arc<TradingRange>,
    ) -> Self {
        Self::new(
            kind,
            symbol,
            timeframe,
            bar_index,
            timestamp,
            close,
            range,
            PatternMetrics::Reported,
            Vec::new(),
        )
    }

    pub fn family(&self) -> Family {
        self.kind.family()
    }
}
