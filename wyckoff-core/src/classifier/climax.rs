//! Phase A events: the climax that stops the prior trend and the automatic
//! rally (or reaction) that follows it.
//!
//! A climax is an ultra-wide bar on extreme volume at the end of an extended
//! move. Its extreme anchors one side of the new trading range; the reflex
//! move off that extreme anchors the other.

use rust_decimal::Decimal;

use crate::domain::{ClimaxMetrics, Gate, GateCheck, PatternKind, PatternMetrics, ReactionMetrics};

use super::{
    accept, directional_close_position, pct, reject, require_ratio, spread_multiple,
    Classification, ClassifierInput, RejectionReason,
};

/// SC: capitulation low after a decline.
pub fn classify_selling_climax(input: &ClassifierInput<'_>) -> Classification {
    classify_climax(PatternKind::SellingClimax, input, true)
}

/// BC: exhaustion high after an advance.
pub fn classify_buying_climax(input: &ClassifierInput<'_>) -> Classification {
    classify_climax(PatternKind::BuyingClimax, input, false)
}

/// AR: rally off the selling-climax low.
pub fn classify_automatic_rally(input: &ClassifierInput<'_>) -> Classification {
    classify_reaction(PatternKind::AutomaticRally, input, true)
}

/// Distribution AR: drop off the buying-climax high.
pub fn classify_automatic_reaction(input: &ClassifierInput<'_>) -> Classification {
    classify_reaction(PatternKind::AutomaticReaction, input, false)
}

/// `selling` is true for SC, false for BC.
fn classify_climax(kind: PatternKind, input: &ClassifierInput<'_>, selling: bool) -> Classification {
    let t = &input.thresholds.climax;
    let bar = input.bar;

    let ratio = require_ratio(kind, input)?;
    if ratio < t.min_volume_ratio {
        return Err(reject(
            kind,
            input,
            RejectionReason::VolumeTooLow {
                ratio,
                min: t.min_volume_ratio,
            },
        ));
    }

    let multiple = spread_multiple(kind, input)?;
    if multiple < t.min_spread_multiple {
        return Err(reject(
            kind,
            input,
            RejectionReason::NarrowSpread {
                actual: multiple,
                min: t.min_spread_multiple,
            },
        ));
    }

    // spread_multiple guarantees a non-empty trailing window
    let origin = input.trailing.first().map_or(bar.open, |b| b.close);
    let (extreme, moved) = if selling {
        (bar.low, origin - bar.low)
    } else {
        (bar.high, bar.high - origin)
    };
    let prior_move_pct = if origin > Decimal::ZERO {
        pct(moved, origin)
    } else {
        Decimal::ZERO
    };
    if prior_move_pct < t.min_prior_move_pct {
        return Err(reject(
            kind,
            input,
            RejectionReason::PriorMoveTooSmall {
                actual: prior_move_pct,
                min: t.min_prior_move_pct,
            },
        ));
    }

    // a selling climax is judged on how far it closed off the low
    let close_position = directional_close_position(bar, selling);
    let gates = vec![
        GateCheck::new(Gate::MinVolumeRatio, ratio, t.min_volume_ratio),
        GateCheck::new(Gate::MinSpreadMultiple, multiple, t.min_spread_multiple),
        GateCheck::new(Gate::MinPriorMovePct, prior_move_pct, t.min_prior_move_pct),
    ];
    let metrics = PatternMetrics::Climax(ClimaxMetrics {
        extreme,
        volume_ratio: ratio,
        spread_multiple: multiple,
        prior_move_pct,
        close_position,
    });
    Ok(accept(kind, input, metrics, gates))
}

fn classify_reaction(kind: PatternKind, input: &ClassifierInput<'_>, upward: bool) -> Classification {
    let t = &input.thresholds.reaction;
    let bar = input.bar;
    let anchor = input
        .climax_extreme
        .filter(|a| *a > Decimal::ZERO)
        .ok_or_else(|| reject(kind, input, RejectionReason::MissingClimax))?;

    let (extreme, moved) = if upward {
        (bar.high, bar.high - anchor)
    } else {
        (bar.low, anchor - bar.low)
    };
    let reaction_pct = pct(moved, anchor);
    if reaction_pct < t.min_reaction_pct {
        return Err(reject(
            kind,
            input,
            RejectionReason::ReactionTooSmall {
                actual: reaction_pct,
                min: t.min_reaction_pct,
            },
        ));
    }

    let gates = vec![GateCheck::new(
        Gate::MinReactionPct,
        reaction_pct,
        t.min_reaction_pct,
    )];
    let metrics = PatternMetrics::Reaction(ReactionMetrics {
        anchor,
        extreme,
        reaction_pct,
    });
    Ok(accept(kind, input, metrics, gates))
}
