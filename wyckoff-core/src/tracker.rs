//! Campaign tracker: applies sequence events to the lifecycle registry.
//!
//! - opened → registered in FORMING
//! - first phase C (or later) pattern → ACTIVE
//! - no pattern for the dormancy window → DORMANT
//! - pattern on a DORMANT campaign → ACTIVE
//! - closed → COMPLETED or FAILED, with the closing reason and realised R

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::CampaignConfig;
use crate::domain::{
    Bar, Campaign, CampaignId, CampaignState, PatternInstance, Timeframe, WyckoffPhase,
};
use crate::lifecycle::{CampaignLifecycle, LifecycleError};
use crate::sequence::{CampaignSequenceDetector, CloseReason, SequenceEvent};

/// Event counters for one tracker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub patterns_accepted: usize,
    pub patterns_discarded: usize,
    pub opened: usize,
    pub completed: usize,
    pub failed: usize,
    pub went_dormant: usize,
    pub reactivated: usize,
}

#[derive(Debug, Clone)]
pub struct CampaignTracker {
    config: CampaignConfig,
    detector: CampaignSequenceDetector,
    lifecycle: CampaignLifecycle,
    stats: TrackerStats,
    last_bar: Option<(usize, DateTime<Utc>, Decimal)>,
}

impl CampaignTracker {
    pub fn new(config: CampaignConfig) -> Self {
        Self {
            detector: CampaignSequenceDetector::new(config.clone()),
            config,
            lifecycle: CampaignLifecycle::new(),
            stats: TrackerStats::default(),
            last_bar: None,
        }
    }

    pub fn lifecycle(&self) -> &CampaignLifecycle {
        &self.lifecycle
    }

    pub fn detector(&self) -> &CampaignSequenceDetector {
        &self.detector
    }

    pub fn stats(&self) -> TrackerStats {
        self.stats
    }

    /// The open campaign for a scope, if any.
    pub fn open_campaign(&self, symbol: &str, timeframe: Timeframe) -> Option<&Campaign> {
        self.detector
            .active(symbol, timeframe)
            .and_then(|seq| self.lifecycle.get(&seq.campaign_id))
    }

    /// Bar-boundary housekeeping: remember the close and send idle campaigns dormant.
    pub fn on_bar(&mut self, bar_index: usize, bar: &Bar) -> Result<(), LifecycleError> {
        self.last_bar = Some((bar_index, bar.timestamp, bar.close));
        let dormancy = self.config.dormancy_for(bar.timeframe);
        let idle: Vec<CampaignId> = self
            .detector
            .active_sequences()
            .filter(|seq| bar.timestamp - seq.last_at > dormancy)
            .map(|seq| seq.campaign_id.clone())
            .collect();
        for id in idle {
            let state = self.lifecycle.get(&id).map(|c| c.state);
            if matches!(state, Some(CampaignState::Forming | CampaignState::Active)) {
                self.lifecycle
                    .transition_to(&id, CampaignState::Dormant, "no new pattern", bar.timestamp)?;
                self.stats.went_dormant += 1;
            }
        }
        Ok(())
    }

    /// Route one detected pattern through the sequence detector and apply
    /// the resulting events. Returns the events for the caller's audit.
    pub fn on_pattern(
        &mut self,
        pattern: PatternInstance,
    ) -> Result<Vec<SequenceEvent>, LifecycleError> {
        let events = self.detector.observe(&pattern);
        for event in &events {
            match event {
                SequenceEvent::Opened { campaign_id, .. } => {
                    let campaign = Campaign::open(campaign_id.clone(), pattern.clone());
                    self.lifecycle.register(campaign)?;
                    self.stats.opened += 1;
                    self.stats.patterns_accepted += 1;
                    self.activate_if_testing(campaign_id, pattern.timestamp)?;
                    info!(
                        campaign = %campaign_id,
                        symbol = %pattern.symbol,
                        kind = %pattern.kind,
                        "campaign opened"
                    );
                }
                SequenceEvent::Extended { campaign_id, .. } => {
                    if self.state_of(campaign_id)? == CampaignState::Dormant {
                        self.lifecycle.transition_to(
                            campaign_id,
                            CampaignState::Active,
                            format!("resumed on {}", pattern.kind),
                            pattern.timestamp,
                        )?;
                        self.stats.reactivated += 1;
                    }
                    self.lifecycle.append_pattern(campaign_id, pattern.clone())?;
                    self.stats.patterns_accepted += 1;
                    self.activate_if_testing(campaign_id, pattern.timestamp)?;
                }
                SequenceEvent::Closed {
                    campaign_id,
                    reason,
                    ..
                } => {
                    self.close(
                        campaign_id,
                        *reason,
                        pattern.bar_index,
                        pattern.timestamp,
                        pattern.close,
                    )?;
                }
                SequenceEvent::Discarded { kind, reason } => {
                    debug!(%kind, ?reason, "pattern discarded");
                    self.stats.patterns_discarded += 1;
                }
            }
        }
        Ok(events)
    }

    /// Close every open campaign at the last seen bar, or at its own last
    /// pattern when no bar was seen.
    pub fn finish(&mut self) -> Result<Vec<SequenceEvent>, LifecycleError> {
        let events = self.detector.finish_all();
        for event in &events {
            if let SequenceEvent::Closed {
                campaign_id,
                reason,
                ..
            } = event
            {
                let exit = match self.last_bar {
                    Some(last) => Some(last),
                    None => self
                        .lifecycle
                        .get(campaign_id)
                        .and_then(Campaign::last_pattern)
                        .map(|p| (p.bar_index, p.timestamp, p.close)),
                };
                let (bar_index, at, close) =
                    exit.ok_or_else(|| LifecycleError::NotFound(campaign_id.clone()))?;
                self.close(campaign_id, *reason, bar_index, at, close)?;
            }
        }
        Ok(events)
    }

    pub fn into_lifecycle(self) -> CampaignLifecycle {
        self.lifecycle
    }

    fn state_of(&self, id: &CampaignId) -> Result<CampaignState, LifecycleError> {
        self.lifecycle
            .get(id)
            .map(|c| c.state)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))
    }

    fn activate_if_testing(
        &mut self,
        id: &CampaignId,
        at: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let Some(campaign) = self.lifecycle.get(id) else {
            return Err(LifecycleError::NotFound(id.clone()));
        };
        if campaign.state == CampaignState::Forming && campaign.phase >= WyckoffPhase::C {
            let reason = format!("phase {:?} reached", campaign.phase);
            self.lifecycle
                .transition_to(id, CampaignState::Active, reason, at)?;
        }
        Ok(())
    }

    fn close(
        &mut self,
        id: &CampaignId,
        reason: CloseReason,
        exit_bar: usize,
        at: DateTime<Utc>,
        exit_price: Decimal,
    ) -> Result<(), LifecycleError> {
        let target = reason.terminal_state();
        // COMPLETED is only reachable from ACTIVE
        if target == CampaignState::Completed && self.state_of(id)? != CampaignState::Active {
            self.lifecycle
                .transition_to(id, CampaignState::Active, "resumed on target", at)?;
        }
        if let Some(campaign) = self.lifecycle.campaign_mut(id) {
            campaign.record_exit(exit_price, exit_bar);
        }
        self.lifecycle.transition_to(id, target, reason.as_str(), at)?;
        match target {
            CampaignState::Completed => self.stats.completed += 1,
            _ => self.stats.failed += 1,
        }
        info!(campaign = %id, state = %target, %reason, "campaign closed");
        Ok(())
    }
}
