//! Domain types for the Wyckoff campaign engine

pub mod bar;
pub mod campaign;
pub mod ids;
pub mod instrument;
pub mod pattern;
pub mod range;
pub mod timeframe;

pub use bar::{Bar, ValidationError};
pub use campaign::{
    AppendError, Campaign, CampaignPerformance, CampaignState, RiskMetadata, StateTransition,
};
pub use ids::{CampaignId, PatternId};
pub use instrument::{AssetClass, VolumeKind};
pub use pattern::{
    BreakoutMetrics, ClimaxMetrics, Family, Gate, GateCheck, PatternInstance, PatternKind,
    PatternMetrics, PenetrationMetrics, PullbackMetrics, ReactionMetrics, RetestMetrics,
    TargetMetrics, WyckoffPhase,
};
pub use range::{RangeStatus, TradingRange};
pub use timeframe::{ParseTimeframeError, Timeframe};

/// Symbol type alias
pub type Symbol = String;
