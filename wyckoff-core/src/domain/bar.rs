//! Bar: the fundamental market data unit.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::timeframe::Timeframe;

/// Why a bar was rejected before entering the pipeline.
///
/// Validation errors are per-bar and recoverable: the bar is skipped, the
/// issue is recorded and the replay continues unless strict mode is on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("zero volume")]
    ZeroVolume,

    #[error("high {high} below low {low}")]
    HighBelowLow { high: Decimal, low: Decimal },

    #[error("non-positive price")]
    NonPositivePrice,

    #[error("open {open} outside [{low}, {high}]")]
    OpenOutsideRange {
        open: Decimal,
        low: Decimal,
        high: Decimal,
    },

    #[error("close {close} outside [{low}, {high}]")]
    CloseOutsideRange {
        close: Decimal,
        low: Decimal,
        high: Decimal,
    },

    #[error("duplicate timestamp {0}")]
    DuplicateTimestamp(DateTime<Utc>),

    #[error("bar belongs to {found}, series is {expected}")]
    SeriesMismatch { expected: String, found: String },
}

/// OHLCV bar for one symbol at one timeframe.
///
/// Prices are fixed-point decimals; volume is an integer count (traded units
/// or ticks, depending on the instrument's asset class).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: u64,
}

impl Bar {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: u64,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// High minus low.
    pub fn spread(&self) -> Decimal {
        self.high - self.low
    }

    /// Absolute open-to-close distance.
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    /// Where the close sits inside the bar: 0 at the low, 1 at the high.
    /// A zero-spread bar reports the midpoint.
    pub fn close_position(&self) -> Decimal {
        let spread = self.spread();
        if spread.is_zero() {
            return dec!(0.5);
        }
        (self.close - self.low) / spread
    }

    /// Intrinsic OHLCV sanity checks. Ordering and series membership are
    /// checked by the replay driver, which knows the neighbouring bars.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.volume == 0 {
            return Err(ValidationError::ZeroVolume);
        }
        if self.high < self.low {
            return Err(ValidationError::HighBelowLow {
                high: self.high,
                low: self.low,
            });
        }
        if self.low <= Decimal::ZERO || self.open <= Decimal::ZERO || self.close <= Decimal::ZERO {
            return Err(ValidationError::NonPositivePrice);
        }
        if self.open < self.low || self.open > self.high {
            return Err(ValidationError::OpenOutsideRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }
        if self.close < self.low || self.close > self.high {
            return Err(ValidationError::CloseOutsideRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }
        Ok(())
    }
}
