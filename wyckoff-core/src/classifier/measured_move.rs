//! Measured-move marker: the close reaches the range height projected from
//! the breakout level. Upward target is `creek + height * multiple`,
//! downward is `ice - height * multiple`.

use crate::domain::{Gate, GateCheck, PatternKind, PatternMetrics, TargetMetrics, TradingRange};
use rust_decimal::Decimal;

use super::{accept, reject, require_range, Classification, ClassifierInput, RejectionReason};

/// Projected price for a range and height multiple.
pub fn projected_target(range: &TradingRange, multiple: Decimal, upward: bool) -> Decimal {
    let leg = range.height() * multiple;
    if upward {
        range.creek_or_resistance() + leg
    } else {
        range.ice_or_support() - leg
    }
}

pub fn classify_markup_target(input: &ClassifierInput<'_>) -> Classification {
    classify_target(PatternKind::MarkupTarget, input, true)
}

pub fn classify_markdown_target(input: &ClassifierInput<'_>) -> Classification {
    classify_target(PatternKind::MarkdownTarget, input, false)
}

fn classify_target(kind: PatternKind, input: &ClassifierInput<'_>, upward: bool) -> Classification {
    require_range(kind, input)?;
    let multiple = input.thresholds.measured_move.height_multiple;
    let target = projected_target(input.range, multiple, upward);
    let close = input.bar.close;
    let reached = if upward { close >= target } else { close <= target };
    if !reached {
        return Err(reject(
            kind,
            input,
            RejectionReason::TargetNotReached { close, target },
        ));
    }
    let gates = vec![GateCheck::new(Gate::TargetLevel, close, target)];
    let metrics = PatternMetrics::Target(TargetMetrics {
        target_level: target,
        close,
    });
    Ok(accept(kind, input, metrics, gates))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::ThresholdSet;
    use rust_decimal_macros::dec;

    #[test]
    fn projection_uses_range_height() {
        let range = range_90_110();
        assert_eq!(projected_target(&range, dec!(1), true), dec!(130));
        assert_eq!(projected_target(&range, dec!(0.5), false), dec!(80));
    }

    #[test]
    fn markup_target_fires_once_reached() {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        let below = bar_at(60, dec!(127), dec!(129.5), dec!(126), dec!(129));
        let input = ClassifierInput {
            bar: &below,
            bar_index: 60,
            range: &range,
            volume_ratio: Some(dec!(1)),
            trailing: &trailing,
            climax_extreme: Some(dec!(90)),
            thresholds: &thresholds,
        };
        assert!(matches!(
            classify_markup_target(&input).unwrap_err().reason,
            RejectionReason::TargetNotReached { .. }
        ));

        let at = bar_at(61, dec!(129), dec!(131), dec!(128.5), dec!(130.5));
        let target = classify_markup_target(&ClassifierInput {
            bar: &at,
            bar_index: 61,
            ..input
        })
        .unwrap();
        assert_eq!(target.kind, PatternKind::MarkupTarget);
        assert!(target.kind.is_terminal());
    }
}
