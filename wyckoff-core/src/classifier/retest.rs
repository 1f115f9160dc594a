//! Secondary test: price revisits the climax side of the range on lighter
//! volume and holds.

use crate::domain::{Gate, GateCheck, PatternKind, PatternMetrics, RetestMetrics};

use super::{
    accept, pct, reject, require_range, require_ratio, Classification, ClassifierInput,
    RejectionReason,
};

pub fn classify_secondary_test(input: &ClassifierInput<'_>) -> Classification {
    classify_retest(PatternKind::SecondaryTest, input, true)
}

pub fn classify_secondary_test_distribution(input: &ClassifierInput<'_>) -> Classification {
    classify_retest(PatternKind::SecondaryTestDistribution, input, false)
}

fn classify_retest(kind: PatternKind, input: &ClassifierInput<'_>, upward: bool) -> Classification {
    require_range(kind, input)?;
    let t = &input.thresholds.secondary_test;
    let bar = input.bar;

    let (level, extreme, held) = if upward {
        let level = input.range.ice_or_support();
        (level, bar.low, bar.close >= level)
    } else {
        let level = input.range.creek_or_resistance();
        (level, bar.high, bar.close <= level)
    };
    let distance_pct = pct((extreme - level).abs(), level);
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

    let gates = vec![
        GateCheck::new(Gate::MaxDistancePct, distance_pct, t.max_distance_pct),
        GateCheck::new(Gate::MaxVolumeRatio, ratio, t.max_volume_ratio),
    ];
    let metrics = PatternMetrics::Retest(RetestMetrics {
        reference_level: level,
        extreme,
        distance_pct,
        volume_ratio: ratio,
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
    fn quiet_revisit_of_support_is_secondary_test() {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        let bar = bar_at(25, dec!(92), dec!(93), dec!(90.9), dec!(92.5));
        let st = classify_secondary_test(&ClassifierInput {
            bar: &bar,
            bar_index: 25,
            range: &range,
            volume_ratio: Some(dec!(0.8)),
            trailing: &trailing,
            climax_extreme: Some(dec!(90)),
            thresholds: &thresholds,
        })
        .unwrap();
        match st.metrics {
            PatternMetrics::Retest(m) => assert_eq!(m.distance_pct, dec!(1)),
            other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn heavy_retest_rejected() {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        let bar = bar_at(25, dec!(92), dec!(93), dec!(90.9), dec!(92.5));
        let rejection = classify_secondary_test(&ClassifierInput {
            bar: &bar,
            bar_index: 25,
            range: &range,
            volume_ratio: Some(dec!(1.4)),
            trailing: &trailing,
            climax_extreme: Some(dec!(90)),
            thresholds: &thresholds,
        })
        .unwrap_err();
        assert!(matches!(rejection.reason, RejectionReason::VolumeTooHigh { .. }));
    }

    #[test]
    fn distribution_retest_tests_resistance() {
        let thresholds = ThresholdSet::real_volume();
        let range = range_90_110();
        let trailing = quiet_trailing();
        let bar = bar_at(25, dec!(108), dec!(109.5), dec!(107), dec!(108));
        let st = classify_secondary_test_distribution(&ClassifierInput {
            bar: &bar,
            bar_index: 25,
            range: &range,
            volume_ratio: Some(dec!(0.9)),
            trailing: &trailing,
            climax_extreme: Some(dec!(110)),
            thresholds: &thresholds,
        })
        .unwrap();
        assert_eq!(st.kind, PatternKind::SecondaryTestDistribution);
    }
}
