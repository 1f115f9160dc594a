//! SOS / SOW: a wide-spread close beyond the creek (or through the ice) on
//! expanding volume.

use rust_decimal::Decimal;

use crate::domain::{BreakoutMetrics, Gate, GateCheck, PatternKind, PatternMetrics};

use super::{
    accept, directional_close_position, pct, reject, require_range, require_ratio,
    spread_multiple, Classification, ClassifierInput, RejectionReason,
};

pub fn classify_sign_of_strength(input: &ClassifierInput<'_>) -> Classification {
    classify_breakout(PatternKind::SignOfStrength, input, true)
}

pub fn classify_sign_of_weakness(input: &ClassifierInput<'_>) -> Classification {
    classify_breakout(PatternKind::SignOfWeakness, input, false)
}

fn classify_breakout(kind: PatternKind, input: &ClassifierInput<'_>, upward: bool) -> Classification {
    require_range(kind, input)?;
    let t = &input.thresholds.breakout;
    let bar = input.bar;
    let (level, beyond) = if upward {
        let level = input.range.creek_or_resistance();
        (level, bar.close - level)
    } else {
        let level = input.range.ice_or_support();
        (level, level - bar.close)
    };

    if beyond <= Decimal::ZERO {
        return Err(reject(
            kind,
            input,
            RejectionReason::NoBreakout {
                close: bar.close,
                level,
            },
        ));
    }
    let breakout_pct = pct(beyond, level);
    if breakout_pct < t.min_breakout_pct || breakout_pct > t.max_breakout_pct {
        return Err(reject(
            kind,
            input,
            RejectionReason::BreakoutOutOfBounds {
                actual: breakout_pct,
                min: t.min_breakout_pct,
                max: t.max_breakout_pct,
            },
        ));
    }

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

    let close_position = directional_close_position(bar, upward);
    if close_position < t.min_close_position {
        return Err(reject(
            kind,
            input,
            RejectionReason::WeakClose {
                actual: close_position,
                min: t.min_close_position,
            },
        ));
    }

    let gates = vec![
        GateCheck::new(Gate::MinBreakoutPct, breakout_pct, t.min_breakout_pct),
        GateCheck::new(Gate::MaxBreakoutPct, breakout_pct, t.max_breakout_pct),
        GateCheck::new(Gate::MinVolumeRatio, ratio, t.min_volume_ratio),
        GateCheck::new(Gate::MinSpreadMultiple, multiple, t.min_spread_multiple),
        GateCheck::new(Gate::MinClosePosition, close_position, t.min_close_position),
    ];
    let metrics = PatternMetrics::Breakout(BreakoutMetrics {
        reference_level: level,
        breakout_pct,
        volume_ratio: ratio,
        spread_multiple: multiple,
        close_position,
    });
    Ok(accept(kind, input, metrics, gates))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::ThresholdSet;
    use crate::domain::Bar;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn sos(bar: &Bar, ratio: Decimal) -> Classification {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        classify_sign_of_strength(&ClassifierInput {
            bar,
            bar_index: 40,
            range: &range,
            volume_ratio: Some(ratio),
            trailing: &trailing,
            climax_extreme: Some(dec!(90)),
            thresholds: &thresholds,
        })
    }

    #[test]
    fn wide_bar_through_creek_is_sos() {
        // close 113 is 2.7273% over 110; spread 5 vs trailing 2 -> 2.5x
        let bar = bar_at(40, dec!(109), dec!(113.5), dec!(108.5), dec!(113));
        let sos = sos(&bar, dec!(2.1)).unwrap();
        assert_eq!(sos.kind, PatternKind::SignOfStrength);
        match sos.metrics {
            PatternMetrics::Breakout(m) => {
                assert_eq!(m.breakout_pct, dec!(2.7273));
                assert_eq!(m.spread_multiple, dec!(2.5));
                assert_eq!(m.close_position, dec!(0.9));
            }
            other => panic!("unexpected metrics {other:?}"),
        }
        assert!(sos.gates.iter().any(|g| g.gate == Gate::MinVolumeRatio));
    }

    #[test]
    fn low_volume_breakout_is_suspect() {
        let bar = bar_at(40, dec!(109), dec!(113.5), dec!(108.5), dec!(113));
        let rejection = sos(&bar, dec!(1.1)).unwrap_err();
        assert!(matches!(rejection.reason, RejectionReason::VolumeTooLow { .. }));
    }

    #[test]
    fn marginal_poke_is_not_a_breakout() {
        // 110.5 is 0.4545% over the creek
        let bar = bar_at(40, dec!(109), dec!(111), dec!(106), dec!(110.5));
        let rejection = sos(&bar, dec!(2.0)).unwrap_err();
        assert!(matches!(
            rejection.reason,
            RejectionReason::BreakoutOutOfBounds { .. }
        ));
    }

    #[test]
    fn sow_closes_through_ice() {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        // close 87 is 3.3333% under 90, near the low
        let bar = bar_at(40, dec!(91), dec!(91.5), dec!(86.5), dec!(87));
        let sow = classify_sign_of_weakness(&ClassifierInput {
            bar: &bar,
            bar_index: 40,
            range: &range,
            volume_ratio: Some(dec!(1.8)),
            trailing: &trailing,
            climax_extreme: Some(dec!(110)),
            thresholds: &thresholds,
        })
        .unwrap();
        assert_eq!(sow.kind, PatternKind::SignOfWeakness);
        match sow.metrics {
            PatternMetrics::Breakout(m) => assert_eq!(m.breakout_pct, dec!(3.3333)),
            other => panic!("unexpected metrics {other:?}"),
        }
    }
}
