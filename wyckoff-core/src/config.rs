//! Engine configuration: window sizes, classifier thresholds, campaign windows.
//!
//! Every threshold is a `Decimal`. In TOML they are written as strings
//! (`max_volume_ratio = "0.7"`) so no binary float is ever parsed on the way
//! to a classification decision.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{AssetClass, Timeframe, VolumeKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: String, reason: String },

    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

impl ConfigError {
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Spring / UTAD: penetrate a boundary on low volume, close back inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenetrationThresholds {
    pub min_penetration_pct: Decimal,
    pub max_penetration_pct: Decimal,
    /// Absorption: volume must stay at or below this multiple of the average.
    pub max_volume_ratio: Decimal,
    /// Close position measured from the rejected side (1 = closed at the far end).
    pub min_close_position: Decimal,
}

/// SOS / SOW: decisive close beyond creek or ice on expanding volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutThresholds {
    pub min_breakout_pct: Decimal,
    pub max_breakout_pct: Decimal,
    pub min_volume_ratio: Decimal,
    /// Bar spread relative to the trailing average spread.
    pub min_spread_multiple: Decimal,
    pub min_close_position: Decimal,
}

/// LPS / LPSY: shallow retest of the broken level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullbackThresholds {
    /// How far above the level (below, for LPSY) the retest may stay.
    pub max_distance_pct: Decimal,
    /// How far the retest may undercut the level and still hold.
    pub max_undercut_pct: Decimal,
    pub max_volume_ratio: Decimal,
    /// Close position measured from the breakout side's far end.
    pub min_close_position: Decimal,
}

/// SC / BC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClimaxThresholds {
    pub min_volume_ratio: Decimal,
    pub min_spread_multiple: Decimal,
    /// Move into the climax across the trailing window, in percent.
    pub min_prior_move_pct: Decimal,
}

/// AR: reflex move off the climax extreme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReactionThresholds {
    pub min_reaction_pct: Decimal,
}

/// ST: revisit of the climax level on lighter volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetestThresholds {
    pub max_distance_pct: Decimal,
    pub max_volume_ratio: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasuredMoveThresholds {
    /// Projection = breakout level ± range height × multiple.
    pub height_multiple: Decimal,
}

/// One complete set of classifier thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdSet {
    pub spring: PenetrationThresholds,
    pub utad: PenetrationThresholds,
    pub breakout: BreakoutThresholds,
    pub pullback: PullbackThresholds,
    pub climax: ClimaxThresholds,
    pub reaction: ReactionThresholds,
    pub secondary_test: RetestThresholds,
    pub measured_move: MeasuredMoveThresholds,
}

impl ThresholdSet {
    /// Defaults for instruments with exchange-reported volume.
    pub fn real_volume() -> Self {
        let spring = PenetrationThresholds {
            min_penetration_pct: dec!(0.05),
            max_penetration_pct: dec!(5),
            max_volume_ratio: dec!(0.7),
            min_close_position: dec!(0.5),
        };
        Self {
            utad: spring.clone(),
            spring,
            breakout: BreakoutThresholds {
                min_breakout_pct: dec!(1),
                max_breakout_pct: dec!(10),
                min_volume_ratio: dec!(1.5),
                min_spread_multiple: dec!(1.2),
                min_close_position: dec!(0.6),
            },
            pullback: PullbackThresholds {
                max_distance_pct: dec!(3),
                max_undercut_pct: dec!(1.5),
                max_volume_ratio: dec!(1.0),
                min_close_position: dec!(0.5),
            },
            climax: ClimaxThresholds {
                min_volume_ratio: dec!(2.0),
                min_spread_multiple: dec!(1.5),
                min_prior_move_pct: dec!(5),
            },
            reaction: ReactionThresholds {
                min_reaction_pct: dec!(3),
            },
            secondary_test: RetestThresholds {
                max_distance_pct: dec!(2),
                max_volume_ratio: dec!(1.0),
            },
            measured_move: MeasuredMoveThresholds {
                height_multiple: dec!(1),
            },
        }
    }

    /// Tick-count volume is noisier; volume gates are relaxed.
    pub fn tick_proxy() -> Self {
        let mut set = Self::real_volume();
        set.spring.max_volume_ratio = dec!(0.9);
        set.utad.max_volume_ratio = dec!(0.9);
        set.breakout.min_volume_ratio = dec!(1.3);
        set.pullback.max_volume_ratio = dec!(1.1);
        set.climax.min_volume_ratio = dec!(1.8);
        set.secondary_test.max_volume_ratio = dec!(1.1);
        set
    }

    fn validate(&self, prefix: &str) -> Result<(), ConfigError> {
        for (name, p) in [("spring", &self.spring), ("utad", &self.utad)] {
            let field = format!("{prefix}.{name}");
            non_negative(&field, "min_penetration_pct", p.min_penetration_pct)?;
            ordered(
                &field,
                "penetration_pct",
                p.min_penetration_pct,
                p.max_penetration_pct,
            )?;
            positive(&field, "max_volume_ratio", p.max_volume_ratio)?;
            unit_interval(&field, "min_close_position", p.min_close_position)?;
        }

        let field = format!("{prefix}.breakout");
        let b = &self.breakout;
        non_negative(&field, "min_breakout_pct", b.min_breakout_pct)?;
        ordered(&field, "breakout_pct", b.min_breakout_pct, b.max_breakout_pct)?;
        positive(&field, "min_volume_ratio", b.min_volume_ratio)?;
        non_negative(&field, "min_spread_multiple", b.min_spread_multiple)?;
        unit_interval(&field, "min_close_position", b.min_close_position)?;

        let field = format!("{prefix}.pullback");
        non_negative(&field, "max_distance_pct", self.pullback.max_distance_pct)?;
        non_negative(&field, "max_undercut_pct", self.pullback.max_undercut_pct)?;
        positive(&field, "max_volume_ratio", self.pullback.max_volume_ratio)?;
        unit_interval(&field, "min_close_position", self.pullback.min_close_position)?;

        let field = format!("{prefix}.climax");
        positive(&field, "min_volume_ratio", self.climax.min_volume_ratio)?;
        non_negative(&field, "min_spread_multiple", self.climax.min_spread_multiple)?;
        non_negative(&field, "min_prior_move_pct", self.climax.min_prior_move_pct)?;

        let field = format!("{prefix}.reaction");
        positive(&field, "min_reaction_pct", self.reaction.min_reaction_pct)?;

        let field = format!("{prefix}.secondary_test");
        non_negative(&field, "max_distance_pct", self.secondary_test.max_distance_pct)?;
        positive(&field, "max_volume_ratio", self.secondary_test.max_volume_ratio)?;

        let field = format!("{prefix}.measured_move");
        positive(&field, "height_multiple", self.measured_move.height_multiple)?;
        Ok(())
    }
}

/// Threshold sets keyed by what the volume column measures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub real_volume: ThresholdSet,
    pub tick_proxy: ThresholdSet,
}

impl ThresholdTable {
    pub fn for_asset(&self, asset_class: AssetClass) -> &ThresholdSet {
        match asset_class.volume_kind() {
            VolumeKind::Real => &self.real_volume,
            VolumeKind::TickProxy => &self.tick_proxy,
        }
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            real_volume: ThresholdSet::real_volume(),
            tick_proxy: ThresholdSet::tick_proxy(),
        }
    }
}

/// Campaign grouping windows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignConfig {
    /// A pattern further than this from its predecessor starts a new campaign.
    pub daily_gap_days: i64,
    pub intraday_gap_hours: i64,
    /// Inactivity after which an open campaign goes dormant.
    pub daily_dormancy_days: i64,
    pub intraday_dormancy_hours: i64,
}

impl CampaignConfig {
    pub fn gap_for(&self, timeframe: Timeframe) -> Duration {
        if timeframe.is_intraday() {
            hours(self.intraday_gap_hours)
        } else {
            days(self.daily_gap_days)
        }
    }

    pub fn dormancy_for(&self, timeframe: Timeframe) -> Duration {
        if timeframe.is_intraday() {
            hours(self.intraday_dormancy_hours)
        } else {
            days(self.daily_dormancy_days)
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("daily_gap_days", self.daily_gap_days),
            ("intraday_gap_hours", self.intraday_gap_hours),
            ("daily_dormancy_days", self.daily_dormancy_days),
            ("intraday_dormancy_hours", self.intraday_dormancy_hours),
        ];
        for (name, value) in checks {
            if value <= 0 {
                return Err(ConfigError::invalid(
                    format!("campaign.{name}"),
                    format!("must be positive, got {value}"),
                ));
            }
        }
        let windows = [
            ("daily_gap_days", Duration::try_days(self.daily_gap_days)),
            ("intraday_gap_hours", Duration::try_hours(self.intraday_gap_hours)),
            ("daily_dormancy_days", Duration::try_days(self.daily_dormancy_days)),
            (
                "intraday_dormancy_hours",
                Duration::try_hours(self.intraday_dormancy_hours),
            ),
        ];
        for (name, window) in windows {
            if window.is_none() {
                return Err(ConfigError::invalid(
                    format!("campaign.{name}"),
                    "exceeds the representable time span",
                ));
            }
        }
        if self.daily_dormancy_days >= self.daily_gap_days {
            return Err(ConfigError::invalid(
                "campaign.daily_dormancy_days",
                "must be shorter than the gap window",
            ));
        }
        if self.intraday_dormancy_hours >= self.intraday_gap_hours {
            return Err(ConfigError::invalid(
                "campaign.intraday_dormancy_hours",
                "must be shorter than the gap window",
            ));
        }
        Ok(())
    }
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            daily_gap_days: 90,
            intraday_gap_hours: 48,
            daily_dormancy_days: 30,
            intraday_dormancy_hours: 16,
        }
    }
}

/// Everything one detection pipeline needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// W: bars in the rolling volume mean.
    pub volume_window: usize,
    /// Bars spanned by the rolling trading range.
    pub range_lookback: usize,
    /// N: trailing bars handed to classifiers.
    pub trailing_bars: usize,
    pub asset_class: AssetClass,
    pub thresholds: ThresholdTable,
    pub campaign: CampaignConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            volume_window: 20,
            range_lookback: 20,
            trailing_bars: 20,
            asset_class: AssetClass::Equity,
            thresholds: ThresholdTable::default(),
            campaign: CampaignConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Thresholds for the configured asset class.
    pub fn active_thresholds(&self) -> &ThresholdSet {
        self.thresholds.for_asset(self.asset_class)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.volume_window == 0 {
            return Err(ConfigError::invalid("volume_window", "must be at least 1"));
        }
        if self.range_lookback < 2 {
            return Err(ConfigError::invalid(
                "range_lookback",
                format!("must be at least 2, got {}", self.range_lookback),
            ));
        }
        if self.trailing_bars == 0 {
            return Err(ConfigError::invalid("trailing_bars", "must be at least 1"));
        }
        self.thresholds.real_volume.validate("thresholds.real_volume")?;
        self.thresholds.tick_proxy.validate("thresholds.tick_proxy")?;
        self.campaign.validate()
    }
}

// Saturating window constructors; `CampaignConfig::validate` rejects
// values that would saturate.

fn days(n: i64) -> Duration {
    Duration::try_days(n).unwrap_or(Duration::MAX)
}

fn hours(n: i64) -> Duration {
    Duration::try_hours(n).unwrap_or(Duration::MAX)
}

// ── Validation helpers ──────────────────────────────────────────────

fn non_negative(section: &str, name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO {
        return Err(ConfigError::invalid(
            format!("{section}.{name}"),
            format!("must not be negative, got {value}"),
        ));
    }
    Ok(())
}

fn positive(section: &str, name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value <= Decimal::ZERO {
        return Err(ConfigError::invalid(
            format!("{section}.{name}"),
            format!("must be positive, got {value}"),
        ));
    }
    Ok(())
}

fn unit_interval(section: &str, name: &str, value: Decimal) -> Result<(), ConfigError> {
    if value < Decimal::ZERO || value > Decimal::ONE {
        return Err(ConfigError::invalid(
            format!("{section}.{name}"),
            format!("must be within [0, 1], got {value}"),
        ));
    }
    Ok(())
}

fn ordered(section: &str, name: &str, min: Decimal, max: Decimal) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::invalid(
            format!("{section}.{name}"),
            format!("min {min} exceeds max {max}"),
        ));
    }
    Ok(())
}
