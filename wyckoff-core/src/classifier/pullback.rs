//! LPS / LPSY: a quiet retest of the level the breakout cleared.
//!
//! The retest may stop short of the level by up to `max_distance_pct` or
//! undercut it by up to `max_undercut_pct`, but the close has to hold on the
//! breakout side, in the upper part of the bar for LPS (lower for LPSY).

use rust_decimal::Decimal;

use crate::domain::{Gate, GateCheck, PatternKind, PatternMetrics, PullbackMetrics};

use super::{
    accept, directional_close_position, pct, reject, require_range, require_ratio,
    Classification, ClassifierInput, RejectionReason,
};

pub fn classify_last_point_of_support(input: &ClassifierInput<'_>) -> Classification {
    classify_pullback(PatternKind::LastPointOfSupport, input, true)
}

pub fn classify_last_point_of_supply(input: &ClassifierInput<'_>) -> Classification {
    classify_pullback(PatternKind::LastPointOfSupply, input, false)
}

fn classify_pullback(kind: PatternKind, input: &ClassifierInput<'_>, upward: bool) -> Classification {
    require_range(kind, input)?;
    let t = &input.thresholds.pullback;
    let bar = input.bar;

    let (level, extreme, held) = if upward {
        let level = input.range.creek_or_resistance();
        (level, bar.low, bar.close >= level)
    } else {
        let level = input.range.ice_or_support();
        (level, bar.high, bar.close <= level)
    };
    // positive: the retest stayed on the breakout side
    let distance_pct = if upward {
        pct(extreme - level, level)
    } else {
        pct(level - extreme, level)
    };

    if distance_pct > t.max_distance_pct {
        return Err(reject(
            kind,
            input,
            RejectionReason::TooFarFromLevel {
                distance_pct,
                max: t.max_distance_pct,
            },
        ));
    }
    if distance_pct < Decimal::ZERO && -distance_pct > t.max_undercut_pct {
        return Err(reject(
            kind,
            input,
            RejectionReason::Undercut {
                undercut_pct: -distance_pct,
                max: t.max_undercut_pct,
            },
        ));
    }
    if !held {
        return Err(reject(
            kind,
            input,
            RejectionReason::NoRecovery {
                close: bar.close,
                level,
            },
        ));
    }

    let ratio = require_ratio(kind, input)?;
    if ratio > t.max_volume_ratio {
        return Err(reject(
            kind,
            input,
            RejectionReason::VolumeTooHigh {
                ratio,
                max: t.max_volume_ratio,
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
        GateCheck::new(Gate::MaxDistancePct, distance_pct, t.max_distance_pct),
        GateCheck::new(Gate::MaxUndercutPct, -distance_pct, t.max_undercut_pct),
        GateCheck::new(Gate::MaxVolumeRatio, ratio, t.max_volume_ratio),
        GateCheck::new(Gate::MinClosePosition, close_position, t.min_close_position),
    ];
    let metrics = PatternMetrics::Pullback(PullbackMetrics {
        reference_level: level,
        distance_pct,
        extreme,
        volume_ratio: ratio,
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
    use rust_decimal_macros::dec;

    fn lps(bar: &Bar, ratio: Decimal) -> Classification {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        classify_last_point_of_support(&ClassifierInput {
            bar,
            bar_index: 45,
            range: &range,
            volume_ratio: Some(ratio),
            trailing: &trailing,
            climax_extreme: Some(dec!(90)),
            thresholds: &thresholds,
        })
    }

    #[test]
    fn shallow_retest_is_lps() {
        // low 111 is 0.9091% above the creek
        let bar = bar_at(45, dec!(112), dec!(113), dec!(111), dec!(112.5));
        let lps = lps(&bar, dec!(0.6)).unwrap();
        match lps.metrics {
            PatternMetrics::Pullback(m) => {
                assert_eq!(m.distance_pct, dec!(0.9091));
                assert_eq!(m.extreme, dec!(111));
            }
            other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn slight_undercut_still_holds() {
        // low 109 is 0.9091% under the creek, close back above
        let bar = bar_at(45, dec!(111), dec!(112), dec!(109), dec!(111));
        assert!(lps(&bar, dec!(0.8)).is_ok());
    }

    #[test]
    fn deep_undercut_fails() {
        // low 107 is 2.7273% under the creek
        let bar = bar_at(45, dec!(111), dec!(112), dec!(107), dec!(111));
        let rejection = lps(&bar, dec!(0.8)).unwrap_err();
        assert!(matches!(rejection.reason, RejectionReason::Undercut { .. }));
    }

    #[test]
    fn pullback_that_never_comes_back_is_not_lps() {
        // low 116 is 5.4545% above the creek
        let bar = bar_at(45, dec!(117), dec!(118), dec!(116), dec!(117));
        let rejection = lps(&bar, dec!(0.5)).unwrap_err();
        assert!(matches!(
            rejection.reason,
            RejectionReason::TooFarFromLevel { .. }
        ));
    }

    #[test]
    fn heavy_volume_retest_rejected() {
        let bar = bar_at(45, dec!(112), dec!(113), dec!(111), dec!(112.5));
        let rejection = lps(&bar, dec!(1.6)).unwrap_err();
        assert_eq!(rejection.reason.code(), "volume_too_high");
    }

    #[test]
    fn retest_closing_near_its_low_is_weak() {
        // holds above the 110 creek but closes in the bottom fifth of the bar
        let bar = bar_at(45, dec!(113), dec!(113.5), dec!(111), dec!(111.5));
        let rejection = lps(&bar, dec!(0.6)).unwrap_err();
        assert_eq!(
            rejection.reason,
            RejectionReason::WeakClose {
                actual: dec!(0.2),
                min: dec!(0.5),
            }
        );
    }

    #[test]
    fn accepted_lps_records_close_gate() {
        let bar = bar_at(45, dec!(112), dec!(113), dec!(111), dec!(112.5));
        let lps = lps(&bar, dec!(0.6)).unwrap();
        let gate = lps
            .gates
            .iter()
            .find(|g| g.gate == Gate::MinClosePosition)
            .unwrap();
        assert_eq!(gate.actual, dec!(0.75));
    }

    #[test]
    fn lpsy_rallies_toward_ice_and_fails() {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        // high 89.5 is 0.5556% below the ice, close 88
        let bar = bar_at(45, dec!(88.5), dec!(89.5), dec!(87.5), dec!(88));
        let lpsy = classify_last_point_of_supply(&ClassifierInput {
            bar: &bar,
            bar_index: 45,
            range: &range,
            volume_ratio: Some(dec!(0.7)),
            trailing: &trailing,
            climax_extreme: Some(dec!(110)),
            thresholds: &thresholds,
        })
        .unwrap();
        assert_eq!(lpsy.kind, PatternKind::LastPointOfSupply);
        match lpsy.metrics {
            PatternMetrics::Pullback(m) => assert_eq!(m.distance_pct, dec!(0.5556)),
            other => panic!("unexpected metrics {other:?}"),
        }
    }
}
