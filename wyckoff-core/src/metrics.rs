//! Campaign metrics: pure functions over a finished campaign list.
//!
//! Sums and means of realized R stay in `Decimal`. Rates and the compounded
//! growth figure are `f64` and display-only; nothing here feeds back into
//! classification or state transitions.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::{Campaign, CampaignState};

/// Fraction of equity risked per campaign when compounding R multiples.
pub const DEFAULT_RISK_FRACTION: f64 = 0.01;

/// Decimal places kept on mean R.
const R_DECIMALS: u32 = 4;

/// Aggregate statistics for one pipeline's campaigns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignMetrics {
    pub total: usize,
    /// Count per state, keyed by the state's wire name.
    pub by_state: BTreeMap<String, usize>,
    /// COMPLETED over all terminal campaigns.
    pub completion_rate: f64,
    /// Campaigns with a positive realized R over those with any.
    pub win_rate: f64,
    pub total_realized_r: Decimal,
    pub mean_realized_r: Option<Decimal>,
    pub best_r: Option<Decimal>,
    pub worst_r: Option<Decimal>,
    pub mean_bars_held: f64,
    /// Recorded patterns per kind code.
    pub pattern_counts: BTreeMap<String, usize>,
    /// Per-campaign geometric growth at [`DEFAULT_RISK_FRACTION`].
    pub compounded_growth: f64,
}

impl CampaignMetrics {
    pub fn compute(campaigns: &[Campaign]) -> Self {
        let rs = realized_r_multiples(campaigns);
        let mut by_state = BTreeMap::new();
        for state in CampaignState::ALL {
            let n = campaigns.iter().filter(|c| c.state == state).count();
            by_state.insert(state.as_str().to_string(), n);
        }
        Self {
            total: campaigns.len(),
            by_state,
            completion_rate: completion_rate(campaigns),
            win_rate: win_rate(&rs),
            total_realized_r: rs.iter().copied().sum(),
            mean_realized_r: mean_r(&rs),
            best_r: rs.iter().copied().max(),
            worst_r: rs.iter().copied().min(),
            mean_bars_held: mean_bars_held(campaigns),
            pattern_counts: pattern_counts(campaigns),
            compounded_growth: compounded_growth(&rs, DEFAULT_RISK_FRACTION),
        }
    }

    pub fn count(&self, state: CampaignState) -> usize {
        self.by_state.get(state.as_str()).copied().unwrap_or(0)
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Realized R of every campaign that recorded performance, in campaign order.
pub fn realized_r_multiples(campaigns: &[Campaign]) -> Vec<Decimal> {
    campaigns
        .iter()
        .filter_map(|c| c.performance.as_ref().map(|p| p.realized_r))
        .collect()
}

/// COMPLETED / (COMPLETED + FAILED). 0.0 with no terminal campaign.
pub fn completion_rate(campaigns: &[Campaign]) -> f64 {
    let completed = campaigns
        .iter()
        .filter(|c| c.state == CampaignState::Completed)
        .count();
    let terminal = campaigns.iter().filter(|c| c.state.is_terminal()).count();
    if terminal == 0 {
        return 0.0;
    }
    completed as f64 / terminal as f64
}

pub fn win_rate(r_multiples: &[Decimal]) -> f64 {
    if r_multiples.is_empty() {
        return 0.0;
    }
    let wins = r_multiples.iter().filter(|r| r.is_sign_positive() && !r.is_zero()).count();
    wins as f64 / r_multiples.len() as f64
}

/// Arithmetic mean, rounded half away from zero.
pub fn mean_r(r_multiples: &[Decimal]) -> Option<Decimal> {
    if r_multiples.is_empty() {
        return None;
    }
    let total: Decimal = r_multiples.iter().copied().sum();
    let mean = total / Decimal::from(r_multiples.len() as u64);
    Some(mean.round_dp_with_strategy(R_DECIMALS, RoundingStrategy::MidpointAwayFromZero))
}

pub fn mean_bars_held(campaigns: &[Campaign]) -> f64 {
    let held: Vec<usize> = campaigns
        .iter()
        .filter_map(|c| c.performance.as_ref().map(|p| p.bars_held))
        .collect();
    if held.is_empty() {
        return 0.0;
    }
    held.iter().sum::<usize>() as f64 / held.len() as f64
}

pub fn pattern_counts(campaigns: &[Campaign]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for campaign in campaigns {
        for pattern in campaign.patterns() {
            *counts.entry(pattern.kind.code().to_string()).or_insert(0) += 1;
        }
    }
    counts
}

/// Geometric mean growth per campaign when each risks `risk_fraction` of equity.
///
/// Equity compounds by `1 + r * risk_fraction` per campaign; the result is
/// `equity^(1/n) - 1`. This is the one place binary floating-point
/// exponentiation is used. Returns -1.0 once equity is wiped out.
pub fn compounded_growth(r_multiples: &[Decimal], risk_fraction: f64) -> f64 {
    if r_multiples.is_empty() {
        return 0.0;
    }
    let mut equity = 1.0_f64;
    for r in r_multiples {
        let factor = 1.0 + r.to_f64().unwrap_or(0.0) * risk_fraction;
        if factor <= 0.0 {
            return -1.0;
        }
        equity *= factor;
    }
    equity.powf(1.0 / r_multiples.len() as f64) - 1.0
}
