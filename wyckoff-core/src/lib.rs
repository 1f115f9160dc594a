//! Wyckoff Core: domain types, volume statistics, pattern classification,
//! campaign sequencing and lifecycle.
//!
//! This crate contains the detection engine:
//! - Domain types (bars, trading ranges, pattern instances, campaigns)
//! - Rolling volume-ratio cache with O(1) lookup
//! - Stateless pattern classifiers with typed rejection reasons
//! - Campaign sequence detector (prerequisite table, closing rule, time gap)
//! - Campaign lifecycle registry with secondary indexes
//! - Per-bar scanner and detection pipeline

pub mod classifier;
pub mod config;
pub mod domain;
pub mod lifecycle;
pub mod metrics;
pub mod pipeline;
pub mod scanner;
pub mod sequence;
pub mod tracker;
pub mod volume;

pub use config::{CampaignConfig, ConfigError, EngineConfig, ThresholdSet, ThresholdTable};
pub use lifecycle::{CampaignLifecycle, LifecycleError};
pub use metrics::CampaignMetrics;
pub use pipeline::{BarOutcome, DetectionPipeline, PipelineError, PipelineResult};
pub use scanner::{NullScanner, PatternScanner, ScanContext, ScanOutcome, WyckoffScanner};
pub use sequence::{CampaignSequenceDetector, CloseReason, SequenceEvent};
pub use tracker::{CampaignTracker, TrackerStats};
pub use volume::{CacheError, VolumeStatisticsCache};
