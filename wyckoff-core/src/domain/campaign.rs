//! Campaign record and its lifecycle state.
//!
//! States: Forming → {Active, Dormant, Failed}; Active → {Completed, Failed,
//! Dormant}; Dormant → {Active, Failed}. Completed and Failed are terminal.
//! The table lives on [`CampaignState::can_transition_to`]; the lifecycle
//! registry is the only component that applies transitions.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::ids::CampaignId;
use super::pattern::{Family, PatternInstance, PatternKind, WyckoffPhase};
use super::range::TradingRange;
use super::timeframe::Timeframe;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignState {
    Forming,
    Active,
    Dormant,
    Completed,
    Failed,
}

impl CampaignState {
    pub const ALL: [CampaignState; 5] = [
        CampaignState::Forming,
        CampaignState::Active,
        CampaignState::Dormant,
        CampaignState::Completed,
        CampaignState::Failed,
    ];

    /// Legal targets from this state.
    pub fn allowed_targets(self) -> &'static [CampaignState] {
        use CampaignState::*;
        match self {
            Forming => &[Active, Dormant, Failed],
            Active => &[Completed, Failed, Dormant],
            Dormant => &[Active, Failed],
            Completed | Failed => &[],
        }
    }

    pub fn can_transition_to(self, target: CampaignState) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, CampaignState::Completed | CampaignState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CampaignState::Forming => "FORMING",
            CampaignState::Active => "ACTIVE",
            CampaignState::Dormant => "DORMANT",
            CampaignState::Completed => "COMPLETED",
            CampaignState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for CampaignState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected attempt to append a pattern to a campaign.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppendError {
    #[error("campaign {id} is {state} and accepts no further patterns")]
    Terminal { id: CampaignId, state: CampaignState },

    #[error("campaign {id} is {expected:?}; cannot append {found} pattern")]
    FamilyMismatch {
        id: CampaignId,
        expected: Family,
        found: PatternKind,
    },

    #[error("campaign {id}: pattern at {at} precedes the last recorded pattern")]
    OutOfOrder { id: CampaignId, at: DateTime<Utc> },
}

/// Audit record of one applied state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: CampaignState,
    pub to: CampaignState,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// Trade framing derived from the campaign's first entry pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskMetadata {
    pub entry_kind: PatternKind,
    pub entry_bar: usize,
    pub entry_price: Decimal,
    /// Structural stop: the penetration extreme, or the opposite range reference.
    pub stop_price: Decimal,
    /// Measured-move projection of the range height beyond the breakout level.
    pub target_price: Decimal,
    pub risk_per_unit: Decimal,
    /// Reward-to-risk of the target, in R.
    pub target_r: Decimal,
}

impl RiskMetadata {
    /// Frame a trade from an entry pattern. Returns `None` for non-entry
    /// patterns and for degenerate zero-risk framings.
    pub fn from_entry(pattern: &PatternInstance) -> Option<Self> {
        if !pattern.kind.is_entry() {
            return None;
        }
        let range: &TradingRange = &pattern.range;
        let upward = pattern.family().is_upward();
        let stop_price = match pattern.metrics.extreme() {
            Some(extreme) => extreme,
            None if upward => range.ice_or_support(),
            None => range.creek_or_resistance(),
        };
        let target_price = if upward {
            range.creek_or_resistance() + range.height()
        } else {
            range.ice_or_support() - range.height()
        };
        let entry_price = pattern.close;
        let risk_per_unit = (entry_price - stop_price).abs();
        if risk_per_unit.is_zero() {
            return None;
        }
        let target_r = ((target_price - entry_price).abs() / risk_per_unit)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Some(Self {
            entry_kind: pattern.kind,
            entry_bar: pattern.bar_index,
            entry_price,
            stop_price,
            target_price,
            risk_per_unit,
            target_r,
        })
    }

    /// Outcome of exiting at `exit_price`, expressed in R.
    pub fn r_multiple(&self, family: Family, exit_price: Decimal) -> Decimal {
        let pnl = if family.is_upward() {
            exit_price - self.entry_price
        } else {
            self.entry_price - exit_price
        };
        (pnl / self.risk_per_unit)
            .round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
    }
}

/// Realised result, filled when the campaign reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignPerformance {
    pub exit_price: Decimal,
    pub exit_bar: usize,
    pub realized_r: Decimal,
    pub bars_held: usize,
}

/// One accumulation or distribution cycle for a symbol and timeframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub family: Family,
    pub state: CampaignState,
    pub phase: WyckoffPhase,
    /// Latest range snapshot the campaign is measured against.
    pub range: Arc<TradingRange>,
    pub risk: Option<RiskMetadata>,
    pub performance: Option<CampaignPerformance>,
    pub opened_at: DateTime<Utc>,
    pub last_pattern_at: DateTime<Utc>,
    /// Why the campaign reached its terminal state.
    pub outcome_reason: Option<String>,
    pub transitions: Vec<StateTransition>,
    patterns: Vec<PatternInstance>,
}

impl Campaign {
    /// New campaign in `Forming`, seeded with its opening pattern.
    pub fn open(id: CampaignId, first: PatternInstance) -> Self {
        Self {
            id,
            symbol: first.symbol.clone(),
            timeframe: first.timeframe,
            family: first.family(),
            state: CampaignState::Forming,
            phase: first.kind.phase(),
            range: Arc::clone(&first.range),
            risk: RiskMetadata::from_entry(&first),
            performance: None,
            opened_at: first.timestamp,
            last_pattern_at: first.timestamp,
            outcome_reason: None,
            transitions: Vec::new(),
            patterns: vec![first],
        }
    }

    /// Patterns in insertion order.
    pub fn patterns(&self) -> &[PatternInstance] {
        &self.patterns
    }

    pub fn pattern_kinds(&self) -> Vec<PatternKind> {
        self.patterns.iter().map(|p| p.kind).collect()
    }

    pub fn last_pattern(&self) -> Option<&PatternInstance> {
        self.patterns.last()
    }

    /// Append a pattern. Terminal campaigns, the other family and patterns
    /// older than the last recorded one are refused.
    pub fn append_pattern(&mut self, pattern: PatternInstance) -> Result<(), AppendError> {
        if self.state.is_terminal() {
            return Err(AppendError::Terminal {
                id: self.id.clone(),
                state: self.state,
            });
        }
        if pattern.family() != self.family {
            return Err(AppendError::FamilyMismatch {
                id: self.id.clone(),
                expected: self.family,
                found: pattern.kind,
            });
        }
        if pattern.timestamp < self.last_pattern_at {
            return Err(AppendError::OutOfOrder {
                id: self.id.clone(),
                at: pattern.timestamp,
            });
        }

        self.phase = self.phase.max(pattern.kind.phase());
        self.last_pattern_at = pattern.timestamp;
        self.range = Arc::clone(&pattern.range);
        if self.risk.is_none() {
            self.risk = RiskMetadata::from_entry(&pattern);
        }
        self.patterns.push(pattern);
        Ok(())
    }

    /// Close out performance at `exit_price`. No-op without risk framing.
    pub fn record_exit(&mut self, exit_price: Decimal, exit_bar: usize) {
        if let Some(risk) = &self.risk {
            self.performance = Some(CampaignPerformance {
                exit_price,
                exit_bar,
                realized_r: risk.r_multiple(self.family, exit_price),
                bars_held: exit_bar.saturating_sub(risk.entry_bar),
            });
        }
    }
}
