//! UTAD: the upthrust mirror of a spring. A poke above resistance on light
//! volume that closes back inside.

use crate::domain::{Gate, GateCheck, PatternKind, PatternMetrics, PenetrationMetrics};

use super::{
    accept, directional_close_position, pct, reject, require_range, require_ratio, Classification,
    ClassifierInput, RejectionReason,
};

pub fn classify_utad(input: &ClassifierInput<'_>) -> Classification {
    const KIND: PatternKind = PatternKind::Utad;
    require_range(KIND, input)?;
    let t = &input.thresholds.utad;
    let bar = input.bar;
    let level = input.range.creek_or_resistance();

    if bar.high <= level {
        return Err(reject(
            KIND,
            input,
            RejectionReason::NoPenetration {
                level,
                extreme: bar.high,
            },
        ));
    }
    let penetration_pct = pct(bar.high - level, level);
    if penetration_pct < t.min_penetration_pct || penetration_pct > t.max_penetration_pct {
        return Err(reject(
            KIND,
            input,
            RejectionReason::PenetrationOutOfBounds {
                actual: penetration_pct,
                min: t.min_penetration_pct,
                max: t.max_penetration_pct,
            },
        ));
    }
    if bar.close > level {
        return Err(reject(
            KIND,
            input,
            RejectionReason::NoRecovery {
                close: bar.close,
                level,
            },
        ));
    }

    let ratio = require_ratio(KIND, input)?;
    if ratio > t.max_volume_ratio {
        return Err(reject(
            KIND,
            input,
            RejectionReason::VolumeTooHigh {
                ratio,
                max: t.max_volume_ratio,
            },
        ));
    }

    // measured from the high: 1 means it closed on the low
    let close_position = directional_close_position(bar, false);
    if close_position < t.min_close_position {
        return Err(reject(
            KIND,
            input,
            RejectionReason::WeakClose {
                actual: close_position,
                min: t.min_close_position,
            },
        ));
    }

    let gates = vec![
        GateCheck::new(Gate::MinPenetrationPct, penetration_pct, t.min_penetration_pct),
        GateCheck::new(Gate::MaxPenetrationPct, penetration_pct, t.max_penetration_pct),
        GateCheck::new(Gate::MaxVolumeRatio, ratio, t.max_volume_ratio),
        GateCheck::new(Gate::MinClosePosition, close_position, t.min_close_position),
    ];
    let metrics = PatternMetrics::Penetration(PenetrationMetrics {
        reference_level: level,
        extreme: bar.high,
        penetration_pct,
        volume_ratio: ratio,
        close_position,
    });
    Ok(accept(KIND, input, metrics, gates))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::config::ThresholdTable;
    use crate::domain::AssetClass;
    use rust_decimal_macros::dec;

    #[test]
    fn upthrust_above_resistance_accepted() {
        let thresholds = ThresholdTable::default();
        let range = range_90_110();
        let trailing = quiet_trailing();
        // high 112 over 110 (1.8182%), close 108 near the low
        let bar = bar_at(30, dec!(110), dec!(112), dec!(107), dec!(108));
        let utad = classify_utad(&ClassifierInput {
            bar: &bar,
            bar_index: 30,
            range: &range,
            volume_ratio: Some(dec!(0.6)),
            trailing: &trailing,
            climax_extreme: Some(dec!(110)),
            thresholds: thresholds.for_asset(AssetClass::Equity),
        })
        .unwrap();
        match utad.metrics {
            PatternMetrics::Penetration(m) => {
                assert_eq!(m.penetration_pct, dec!(1.8182));
                assert_eq!(m.extreme, dec!(112));
                assert_eq!(m.close_position, dec!(0.8));
            }
            other => panic!("unexpected metrics {other:?}"),
        }
    }

    #[test]
    fn tick_proxy_tolerates_heavier_volume() {
        let thresholds = ThresholdTable::default();
        let range = range_90_110();
        let trailing = quiet_trailing();
        let bar = bar_at(30, dec!(110), dec!(112), dec!(107), dec!(108));
        let input = |asset: AssetClass| ClassifierInput {
            bar: &bar,
            bar_index: 30,
            range: &range,
            volume_ratio: Some(dec!(0.85)),
            trailing: &trailing,
            climax_extreme: None,
            thresholds: thresholds.for_asset(asset),
        };
        assert!(classify_utad(&input(AssetClass::Equity)).is_err());
        assert!(classify_utad(&input(AssetClass::Cfd)).is_ok());
    }
}
