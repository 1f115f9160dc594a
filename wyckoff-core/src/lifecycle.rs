//! Campaign lifecycle registry.
//!
//! Owns every campaign of one pipeline: a primary map by id plus secondary
//! indexes by state and by timeframe. All state changes go through
//! [`CampaignLifecycle::transition_to`], which validates against the
//! transition table and updates the record and both indexes together.
//!
//! [`CampaignLifecycle::campaign_mut`] hands out the record directly. Changing
//! `state` or `timeframe` through it desynchronises the indexes until
//! [`CampaignLifecycle::rebuild_indexes`] is called.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{
    AppendError, Campaign, CampaignId, CampaignState, PatternInstance, StateTransition, Timeframe,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("campaign {0} is already registered")]
    DuplicateRegistration(CampaignId),

    #[error("campaign {0} not found")]
    NotFound(CampaignId),

    #[error("invalid transition for campaign {id}: {from} → {to}")]
    InvalidTransition {
        id: CampaignId,
        from: CampaignState,
        to: CampaignState,
    },

    #[error(transparent)]
    Append(#[from] AppendError),
}

/// Ordered copy of both secondary indexes, for comparison and display.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSnapshot {
    pub by_state: BTreeMap<CampaignState, BTreeSet<CampaignId>>,
    pub by_timeframe: BTreeMap<Timeframe, BTreeSet<CampaignId>>,
}

#[derive(Debug, Clone, Default)]
pub struct CampaignLifecycle {
    campaigns: HashMap<CampaignId, Campaign>,
    by_state: HashMap<CampaignState, HashSet<CampaignId>>,
    by_timeframe: HashMap<Timeframe, HashSet<CampaignId>>,
}

impl CampaignLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, campaign: Campaign) -> Result<(), LifecycleError> {
        if self.campaigns.contains_key(&campaign.id) {
            return Err(LifecycleError::DuplicateRegistration(campaign.id));
        }
        self.index(&campaign);
        debug!(campaign = %campaign.id, state = %campaign.state, "campaign registered");
        self.campaigns.insert(campaign.id.clone(), campaign);
        Ok(())
    }

    /// Remove a campaign from the registry and every index.
    pub fn unregister(&mut self, id: &CampaignId) -> Result<Campaign, LifecycleError> {
        let campaign = self
            .campaigns
            .remove(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        self.unindex(&campaign);
        Ok(campaign)
    }

    pub fn get(&self, id: &CampaignId) -> Option<&Campaign> {
        self.campaigns.get(id)
    }

    pub fn contains(&self, id: &CampaignId) -> bool {
        self.campaigns.contains_key(id)
    }

    /// Direct mutable access. See the module docs on index drift.
    pub fn campaign_mut(&mut self, id: &CampaignId) -> Option<&mut Campaign> {
        self.campaigns.get_mut(id)
    }

    /// Pure pre-flight check; `false` for unknown ids.
    pub fn can_transition_to(&self, id: &CampaignId, target: CampaignState) -> bool {
        self.campaigns
            .get(id)
            .is_some_and(|c| c.state.can_transition_to(target))
    }

    /// Apply a transition. Returns the previous state.
    ///
    /// On error nothing changes: not the record, not the indexes.
    pub fn transition_to(
        &mut self,
        id: &CampaignId,
        target: CampaignState,
        reason: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Result<CampaignState, LifecycleError> {
        let campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        let from = campaign.state;
        if !from.can_transition_to(target) {
            warn!(campaign = %id, %from, to = %target, "rejected campaign transition");
            return Err(LifecycleError::InvalidTransition {
                id: id.clone(),
                from,
                to: target,
            });
        }

        let reason = reason.into();
        campaign.state = target;
        if target.is_terminal() {
            campaign.outcome_reason = Some(reason.clone());
        }
        campaign.transitions.push(StateTransition {
            from,
            to: target,
            at,
            reason,
        });

        if let Some(ids) = self.by_state.get_mut(&from) {
            ids.remove(id);
            if ids.is_empty() {
                self.by_state.remove(&from);
            }
        }
        self.by_state.entry(target).or_default().insert(id.clone());
        debug!(campaign = %id, %from, to = %target, "campaign transition");
        Ok(from)
    }

    /// Append a pattern to a registered campaign.
    pub fn append_pattern(
        &mut self,
        id: &CampaignId,
        pattern: PatternInstance,
    ) -> Result<(), LifecycleError> {
        let campaign = self
            .campaigns
            .get_mut(id)
            .ok_or_else(|| LifecycleError::NotFound(id.clone()))?;
        campaign.append_pattern(pattern)?;
        Ok(())
    }

    /// Copy of the ids currently in `state`.
    pub fn ids_in_state(&self, state: CampaignState) -> HashSet<CampaignId> {
        self.by_state.get(&state).cloned().unwrap_or_default()
    }

    /// Copy of the ids at `timeframe`.
    pub fn ids_in_timeframe(&self, timeframe: Timeframe) -> HashSet<CampaignId> {
        self.by_timeframe.get(&timeframe).cloned().unwrap_or_default()
    }

    pub fn count_in_state(&self, state: CampaignState) -> usize {
        self.by_state.get(&state).map_or(0, HashSet::len)
    }

    /// Recompute both secondary indexes from the primary map. Idempotent.
    pub fn rebuild_indexes(&mut self) {
        self.by_state.clear();
        self.by_timeframe.clear();
        let campaigns = std::mem::take(&mut self.campaigns);
        for campaign in campaigns.values() {
            self.index(campaign);
        }
        self.campaigns = campaigns;
    }

    /// True when the indexes match what a rebuild would produce.
    pub fn verify_indexes(&self) -> bool {
        let mut rebuilt = Self {
            campaigns: HashMap::new(),
            by_state: HashMap::new(),
            by_timeframe: HashMap::new(),
        };
        for campaign in self.campaigns.values() {
            rebuilt.index(campaign);
        }
        rebuilt.index_snapshot() == self.index_snapshot()
    }

    pub fn index_snapshot(&self) -> IndexSnapshot {
        fn ordered<K: Ord + Copy>(
            map: &HashMap<K, HashSet<CampaignId>>,
        ) -> BTreeMap<K, BTreeSet<CampaignId>> {
            map.iter()
                .filter(|(_, ids)| !ids.is_empty())
                .map(|(k, ids)| (*k, ids.iter().cloned().collect()))
                .collect()
        }
        IndexSnapshot {
            by_state: ordered(&self.by_state),
            by_timeframe: ordered(&self.by_timeframe),
        }
    }

    pub fn len(&self) -> usize {
        self.campaigns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.campaigns.is_empty()
    }

    pub fn campaigns(&self) -> impl Iterator<Item = &Campaign> {
        self.campaigns.values()
    }

    /// All campaigns ordered by opening time, then id.
    pub fn into_campaigns(self) -> Vec<Campaign> {
        let mut campaigns: Vec<Campaign> = self.campaigns.into_values().collect();
        campaigns.sort_by(|a, b| a.opened_at.cmp(&b.opened_at).then_with(|| a.id.cmp(&b.id)));
        campaigns
    }

    // ── Index maintenance ──

    fn index(&mut self, campaign: &Campaign) {
        self.by_state
            .entry(campaign.state)
            .or_default()
            .insert(campaign.id.clone());
        self.by_timeframe
            .entry(campaign.timeframe)
            .or_default()
            .insert(campaign.id.clone());
    }

    fn unindex(&mut self, campaign: &Campaign) {
        // the record may have drifted, so scan every bucket
        for ids in self.by_state.values_mut() {
            ids.remove(&campaign.id);
        }
        for ids in self.by_timeframe.values_mut() {
            ids.remove(&campaign.id);
        }
        self.by_state.retain(|_, ids| !ids.is_empty());
        self.by_timeframe.retain(|_, ids| !ids.is_empty());
    }
}
