use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::pattern::PatternKind;
use super::timeframe::Timeframe;

/// Deterministic campaign identifier.
///
/// Derived from the campaign scope and its opening pattern so that replaying
/// the same bars twice yields the same ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CampaignId(pub String);

impl CampaignId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// BLAKE3 over `(symbol, timeframe, opening timestamp, opening kind)`,
    /// truncated to 16 hex characters.
    pub fn derive(
        symbol: &str,
        timeframe: Timeframe,
        opened_at: DateTime<Utc>,
        opening_kind: PatternKind,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(symbol.as_bytes());
        hasher.update(timeframe.as_str().as_bytes());
        hasher.update(&opened_at.timestamp_millis().to_le_bytes());
        hasher.update(opening_kind.code().as_bytes());
        let hex = hasher.finalize().to_hex();
        Self(hex.as_str()[..16].to_string())
    }
}

impl fmt::Display for CampaignId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pattern identifier: `{symbol}:{timeframe}:{epoch millis}:{kind code}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn for_detection(
        symbol: &str,
        timeframe: Timeframe,
        timestamp: DateTime<Utc>,
        kind: PatternKind,
    ) -> Self {
        Self(format!(
            "{symbol}:{timeframe}:{}:{}",
            timestamp.timestamp_millis(),
            kind.code()
        ))
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn campaign_id_is_deterministic() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let a = CampaignId::derive("SPY", Timeframe::D1, ts, PatternKind::SellingClimax);
        let b = CampaignId::derive("SPY", Timeframe::D1, ts, PatternKind::SellingClimax);
        assert_eq!(a, b);
        assert_eq!(a.0.len(), 16);
    }

    #[test]
    fn campaign_id_depends_on_scope() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let daily = CampaignId::derive("SPY", Timeframe::D1, ts, PatternKind::SellingClimax);
        let hourly = CampaignId::derive("SPY", Timeframe::H1, ts, PatternKind::SellingClimax);
        assert_ne!(daily, hourly);
    }

    #[test]
    fn pattern_id_format() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let id = PatternId::for_detection("SPY", Timeframe::D1, ts, PatternKind::Spring);
        assert_eq!(id.0, format!("SPY:1d:{}:SPRING", ts.timestamp_millis()));
    }
}
