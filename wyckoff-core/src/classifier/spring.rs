//! Spring: a dip under support on light volume that closes back inside the range.

use crate::domain::{Gate, GateCheck, PatternKind, PatternMetrics, PenetrationMetrics};

use super::{
    accept, directional_close_position, pct, reject, require_range, require_ratio, Classification,
    ClassifierInput, RejectionReason,
};

pub fn classify_spring(input: &ClassifierInput<'_>) -> Classification {
    const KIND: PatternKind = PatternKind::Spring;
    require_range(KIND, input)?;
    let t = &input.thresholds.spring;
    let bar = input.bar;
    let level = input.range.ice_or_support();

    if bar.low >= level {
        return Err(reject(
            KIND,
            input,
            RejectionReason::NoPenetration {
                level,
                extreme: bar.low,
            },
        ));
    }
    let penetration_pct = pct(level - bar.low, level);
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
    if bar.close < level {
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

    let close_position = directional_close_position(bar, true);
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
        extreme: bar.low,
        penetration_pct,
        volume_ratio: ratio,
        close_position,
    });
    Ok(accept(KIND, input, metrics, gates))
}
