//! Trading range: support/resistance context a pattern is measured against.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle of a trading range as seen by the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RangeStatus {
    /// Rolling boundaries, no climax anchor yet.
    Forming,
    /// Both boundaries anchored by a climax and its automatic rally/reaction.
    Active,
    /// Price broke out above the creek.
    Breakout,
    /// Price broke down through the ice.
    Breakdown,
}

/// Immutable snapshot of a trading range.
///
/// Patterns hold an `Arc<TradingRange>` taken at detection time; the scanner
/// never mutates a snapshot, it publishes a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingRange {
    pub support: Decimal,
    pub resistance: Decimal,
    /// Wavy resistance line used as the breakout reference.
    pub creek: Option<Decimal>,
    /// Support line used as the breakdown reference.
    pub ice: Option<Decimal>,
    pub status: RangeStatus,
    /// Timestamp of the bar that produced this snapshot.
    pub as_of: DateTime<Utc>,
}

impl TradingRange {
    pub fn forming(support: Decimal, resistance: Decimal, as_of: DateTime<Utc>) -> Self {
        Self {
            support,
            resistance,
            creek: None,
            ice: None,
            status: RangeStatus::Forming,
            as_of,
        }
    }

    /// Range with both anchors set; creek and ice coincide with the boundaries.
    pub fn anchored(support: Decimal, resistance: Decimal, as_of: DateTime<Utc>) -> Self {
        Self {
            support,
            resistance,
            creek: Some(resistance),
            ice: Some(support),
            status: RangeStatus::Active,
            as_of,
        }
    }

    pub fn creek_or_resistance(&self) -> Decimal {
        self.creek.unwrap_or(self.resistance)
    }

    pub fn ice_or_support(&self) -> Decimal {
        self.ice.unwrap_or(self.support)
    }

    /// Distance between the breakout and breakdown references.
    pub fn height(&self) -> Decimal {
        self.creek_or_resistance() - self.ice_or_support()
    }

    /// Copy of this snapshot with a different status and timestamp.
    pub fn with_status(&self, status: RangeStatus, as_of: DateTime<Utc>) -> Self {
        Self {
            status,
            as_of,
            ..self.clone()
        }
    }

    pub fn is_valid(&self) -> bool {
        self.support > Decimal::ZERO && self.resistance > self.support
    }
}
