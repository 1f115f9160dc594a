//! Campaign sequence detection.
//!
//! Decides, token by token, whether a detected pattern extends the open
//! campaign for its symbol and timeframe, closes it, or starts a new one.
//!
//! Prerequisites (upward family; the downward family mirrors it role for role):
//!
//! | candidate      | requires                                        |
//! |----------------|-------------------------------------------------|
//! | PS             | empty history                                   |
//! | SC             | no climax yet                                   |
//! | AR             | SC, no AR yet                                   |
//! | ST             | SC and AR, no SOS yet                           |
//! | Spring         | SC and AR, no SOS yet                           |
//! | SOS            | Spring or ST                                    |
//! | LPS            | SOS                                             |
//! | Markup target  | LPS                                             |
//!
//! Nothing follows the target marker and families never mix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::config::CampaignConfig;
use crate::domain::{
    CampaignId, CampaignState, Family, PatternInstance, PatternKind, Timeframe, WyckoffPhase,
};

/// Position of a token within its family, shared by both mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Preliminary,
    Climax,
    Reaction,
    Retest,
    Test,
    Breakout,
    Pullback,
    Target,
}

fn role(kind: PatternKind) -> Role {
    use PatternKind::*;
    match kind {
        PreliminarySupport | PreliminarySupply => Role::Preliminary,
        SellingClimax | BuyingClimax => Role::Climax,
        AutomaticRally | AutomaticReaction => Role::Reaction,
        SecondaryTest | SecondaryTestDistribution => Role::Retest,
        Spring | Utad => Role::Test,
        SignOfStrength | SignOfWeakness => Role::Breakout,
        LastPointOfSupport | LastPointOfSupply => Role::Pullback,
        MarkupTarget | MarkdownTarget => Role::Target,
    }
}

/// True if `candidate` may legally follow `history`.
///
/// An empty history accepts exactly the family starters.
pub fn is_valid_next(history: &[PatternKind], candidate: PatternKind) -> bool {
    let Some(first) = history.first() else {
        return candidate.is_starter();
    };
    if first.family() != candidate.family() {
        return false;
    }
    if history.iter().any(|k| k.is_terminal()) {
        return false;
    }
    let has = |r: Role| history.iter().any(|k| role(*k) == r);
    match role(candidate) {
        Role::Preliminary => false,
        Role::Climax => !has(Role::Climax),
        Role::Reaction => has(Role::Climax) && !has(Role::Reaction),
        Role::Retest | Role::Test => {
            has(Role::Climax) && has(Role::Reaction) && !has(Role::Breakout)
        }
        Role::Breakout => has(Role::Test) || has(Role::Retest),
        Role::Pullback => has(Role::Breakout),
        Role::Target => has(Role::Pullback),
    }
}

/// Every prefix transition of `kinds` satisfies [`is_valid_next`].
pub fn is_valid_sequence(kinds: &[PatternKind]) -> bool {
    (0..kinds.len()).all(|i| is_valid_next(&kinds[..i], kinds[i]))
}

/// Why a campaign reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    TargetReached,
    MarkupFailed,
    MarkdownFailed,
    LaterPhaseNeverReached,
}

impl CloseReason {
    pub fn terminal_state(self) -> CampaignState {
        match self {
            CloseReason::TargetReached => CampaignState::Completed,
            _ => CampaignState::Failed,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CloseReason::TargetReached => "measured move reached",
            CloseReason::MarkupFailed => "markup failed",
            CloseReason::MarkdownFailed => "markdown failed",
            CloseReason::LaterPhaseNeverReached => "later phase never reached",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closing rule applied to a token history.
///
/// Terminal marker → completed; breakout phase (D) reached without it →
/// markup/markdown failed; otherwise → later phase never reached.
pub fn close_outcome(history: &[PatternKind]) -> CloseReason {
    if history.iter().any(|k| k.is_terminal()) {
        return CloseReason::TargetReached;
    }
    let max_phase = history.iter().map(|k| k.phase()).max();
    match (max_phase, history.first()) {
        (Some(phase), Some(first)) if phase >= WyckoffPhase::D => {
            if first.family().is_upward() {
                CloseReason::MarkupFailed
            } else {
                CloseReason::MarkdownFailed
            }
        }
        _ => CloseReason::LaterPhaseNeverReached,
    }
}

/// What made the detector close a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    TerminalMarker,
    InvalidNext(PatternKind),
    TimeGap,
    EndOfInput,
}

/// Why a candidate was dropped without touching any campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardReason {
    /// Not a starter and nothing open to extend.
    NoOpenCampaign,
    /// Broke the open sequence and cannot start one.
    InvalidNext,
    /// Arrived after the gap window and cannot start one.
    AfterTimeGap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SequenceEvent {
    Opened {
        campaign_id: CampaignId,
        kind: PatternKind,
    },
    Extended {
        campaign_id: CampaignId,
        kind: PatternKind,
    },
    Closed {
        campaign_id: CampaignId,
        reason: CloseReason,
        trigger: CloseTrigger,
    },
    Discarded {
        kind: PatternKind,
        reason: DiscardReason,
    },
}

/// Token history of the open campaign in one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSequence {
    pub campaign_id: CampaignId,
    pub family: Family,
    pub kinds: Vec<PatternKind>,
    pub opened_at: DateTime<Utc>,
    pub last_at: DateTime<Utc>,
}

type Scope = (String, Timeframe);

#[derive(Debug, Clone)]
pub struct CampaignSequenceDetector {
    config: CampaignConfig,
    active: BTreeMap<Scope, ActiveSequence>,
}

impl CampaignSequenceDetector {
    pub fn new(config: CampaignConfig) -> Self {
        Self {
            config,
            active: BTreeMap::new(),
        }
    }

    pub fn active(&self, symbol: &str, timeframe: Timeframe) -> Option<&ActiveSequence> {
        self.active.get(&(symbol.to_string(), timeframe))
    }

    pub fn active_sequences(&self) -> impl Iterator<Item = &ActiveSequence> {
        self.active.values()
    }

    /// Whether `kind` would extend the open campaign or start a new one.
    pub fn would_accept(&self, symbol: &str, timeframe: Timeframe, kind: PatternKind) -> bool {
        match self.active(symbol, timeframe) {
            Some(seq) => kind.is_starter() || is_valid_next(&seq.kinds, kind),
            None => kind.is_starter(),
        }
    }

    /// Feed one detected pattern. Events are returned in the order they apply.
    pub fn observe(&mut self, pattern: &PatternInstance) -> Vec<SequenceEvent> {
        let scope = (pattern.symbol.clone(), pattern.timeframe);
        let kind = pattern.kind;
        let mut events = Vec::with_capacity(2);
        let gap = self.config.gap_for(pattern.timeframe);

        let Some(mut seq) = self.active.remove(&scope) else {
            if kind.is_starter() {
                events.push(self.open(scope, pattern));
            } else {
                events.push(SequenceEvent::Discarded {
                    kind,
                    reason: DiscardReason::NoOpenCampaign,
                });
            }
            return events;
        };

        if pattern.timestamp - seq.last_at > gap {
            events.push(closed(seq, CloseTrigger::TimeGap));
            if kind.is_starter() {
                events.push(self.open(scope, pattern));
            } else {
                events.push(SequenceEvent::Discarded {
                    kind,
                    reason: DiscardReason::AfterTimeGap,
                });
            }
            return events;
        }

        if is_valid_next(&seq.kinds, kind) {
            seq.kinds.push(kind);
            seq.last_at = pattern.timestamp;
            events.push(SequenceEvent::Extended {
                campaign_id: seq.campaign_id.clone(),
                kind,
            });
            if kind.is_terminal() {
                events.push(closed(seq, CloseTrigger::TerminalMarker));
            } else {
                self.active.insert(scope, seq);
            }
            return events;
        }

        events.push(closed(seq, CloseTrigger::InvalidNext(kind)));
        if kind.is_starter() {
            events.push(self.open(scope, pattern));
        } else {
            events.push(SequenceEvent::Discarded {
                kind,
                reason: DiscardReason::InvalidNext,
            });
        }
        events
    }

    /// Close the open campaign in one scope, if any.
    pub fn finish(&mut self, symbol: &str, timeframe: Timeframe) -> Option<SequenceEvent> {
        self.active
            .remove(&(symbol.to_string(), timeframe))
            .map(|seq| closed(seq, CloseTrigger::EndOfInput))
    }

    /// Close every open campaign, in scope order.
    pub fn finish_all(&mut self) -> Vec<SequenceEvent> {
        std::mem::take(&mut self.active)
            .into_values()
            .map(|seq| closed(seq, CloseTrigger::EndOfInput))
            .collect()
    }

    fn open(&mut self, scope: Scope, pattern: &PatternInstance) -> SequenceEvent {
        let campaign_id = CampaignId::derive(
            &pattern.symbol,
            pattern.timeframe,
            pattern.timestamp,
            pattern.kind,
        );
        debug!(campaign = %campaign_id, kind = %pattern.kind, "sequence opened");
        self.active.insert(
            scope,
            ActiveSequence {
                campaign_id: campaign_id.clone(),
                family: pattern.family(),
                kinds: vec![pattern.kind],
                opened_at: pattern.timestamp,
                last_at: pattern.timestamp,
            },
        );
        SequenceEvent::Opened {
            campaign_id,
            kind: pattern.kind,
        }
    }
}

fn closed(seq: ActiveSequence, trigger: CloseTrigger) -> SequenceEvent {
    let reason = close_outcome(&seq.kinds);
    debug!(campaign = %seq.campaign_id, %reason, ?trigger, "sequence closed");
    SequenceEvent::Closed {
        campaign_id: seq.campaign_id,
        reason,
        trigger,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TradingRange;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use PatternKind::*;

    const UPWARD: [PatternKind; 6] = [
        SellingClimax,
        AutomaticRally,
        Spring,
        SignOfStrength,
        LastPointOfSupport,
        MarkupTarget,
    ];

    fn pattern(kind: PatternKind, day: i64) -> PatternInstance {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = Arc::new(TradingRange::anchored(dec!(90), dec!(110), start));
        PatternInstance::reported(
            kind,
            "SPY",
            Timeframe::D1,
            day as usize,
            start + Duration::days(day),
            dec!(100),
            range,
        )
    }

    fn feed(detector: &mut CampaignSequenceDetector, kinds: &[PatternKind]) -> Vec<SequenceEvent> {
        kinds
            .iter()
            .enumerate()
            .flat_map(|(i, k)| detector.observe(&pattern(*k, i as i64 * 3)))
            .collect()
    }

    #[test]
    fn full_upward_sequence_is_valid() {
        assert!(is_valid_sequence(&UPWARD));
    }

    #[test]
    fn spring_needs_climax_and_rally() {
        assert!(!is_valid_next(&[SellingClimax], Spring));
        assert!(is_valid_next(&[SellingClimax, AutomaticRally], Spring));
        assert!(!is_valid_next(&[PreliminarySupport], Spring));
    }

    #[test]
    fn breakout_needs_test_or_retest() {
        assert!(!is_valid_next(&[SellingClimax, AutomaticRally], SignOfStrength));
        assert!(is_valid_next(
            &[SellingClimax, AutomaticRally, SecondaryTest],
            SignOfStrength
        ));
        assert!(is_valid_next(
            &[SellingClimax, AutomaticRally, Spring],
            SignOfStrength
        ));
    }

    #[test]
    fn families_never_mix() {
        assert!(!is_valid_next(&[SellingClimax, AutomaticRally], Utad));
        assert!(!is_valid_next(&[BuyingClimax], AutomaticRally));
        assert!(is_valid_next(&[BuyingClimax], AutomaticReaction));
    }

    #[test]
    fn nothing_follows_the_target() {
        for kind in PatternKind::ALL {
            assert!(!is_valid_next(&UPWARD, kind));
        }
    }

    #[test]
    fn closing_rule() {
        assert_eq!(close_outcome(&UPWARD), CloseReason::TargetReached);
        assert_eq!(close_outcome(&UPWARD[..3]), CloseReason::LaterPhaseNeverReached);
        assert_eq!(close_outcome(&UPWARD[..5]), CloseReason::MarkupFailed);
        assert_eq!(
            close_outcome(&[BuyingClimax, AutomaticReaction, Utad, SignOfWeakness]),
            CloseReason::MarkdownFailed
        );
        assert_eq!(CloseReason::MarkupFailed.terminal_state(), CampaignState::Failed);
    }

    #[test]
    fn terminal_marker_closes_immediately() {
        let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
        let events = feed(&mut detector, &UPWARD);
        assert!(matches!(events[0], SequenceEvent::Opened { .. }));
        assert!(matches!(
            events.last(),
            Some(SequenceEvent::Closed {
                reason: CloseReason::TargetReached,
                trigger: CloseTrigger::TerminalMarker,
                ..
            })
        ));
        assert!(detector.active("SPY", Timeframe::D1).is_none());
    }

    #[test]
    fn invalid_starter_reopens() {
        let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
        let events = feed(&mut detector, &[SellingClimax, AutomaticRally, SellingClimax]);
        let tail = &events[2..];
        assert!(matches!(
            tail[0],
            SequenceEvent::Closed {
                trigger: CloseTrigger::InvalidNext(SellingClimax),
                ..
            }
        ));
        assert!(matches!(tail[1], SequenceEvent::Opened { .. }));
        assert_eq!(
            detector.active("SPY", Timeframe::D1).map(|s| s.kinds.len()),
            Some(1)
        );
    }

    #[test]
    fn invalid_non_starter_is_discarded() {
        let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
        let events = feed(&mut detector, &[SellingClimax, SignOfStrength]);
        assert!(matches!(events[1], SequenceEvent::Closed { .. }));
        assert_eq!(
            events[2],
            SequenceEvent::Discarded {
                kind: SignOfStrength,
                reason: DiscardReason::InvalidNext,
            }
        );
        assert!(detector.active("SPY", Timeframe::D1).is_none());
    }

    #[test]
    fn time_gap_starts_over() {
        let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
        detector.observe(&pattern(SellingClimax, 0));
        detector.observe(&pattern(AutomaticRally, 5));
        // 100 days later: valid next, but too late
        let events = detector.observe(&pattern(SecondaryTest, 105));
        assert!(matches!(
            events[0],
            SequenceEvent::Closed {
                trigger: CloseTrigger::TimeGap,
                reason: CloseReason::LaterPhaseNeverReached,
                ..
            }
        ));
        assert_eq!(
            events[1],
            SequenceEvent::Discarded {
                kind: SecondaryTest,
                reason: DiscardReason::AfterTimeGap,
            }
        );

        let events = detector.observe(&pattern(SellingClimax, 300));
        assert!(matches!(events[0], SequenceEvent::Opened { .. }));
    }

    #[test]
    fn scopes_are_independent() {
        let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
        detector.observe(&pattern(SellingClimax, 0));
        let mut hourly = pattern(BuyingClimax, 1);
        hourly.timeframe = Timeframe::H1;
        detector.observe(&hourly);
        assert_eq!(detector.active_sequences().count(), 2);
        assert_eq!(detector.finish_all().len(), 2);
        assert_eq!(detector.active_sequences().count(), 0);
    }

    #[test]
    fn would_accept_reflects_open_history() {
        let mut detector = CampaignSequenceDetector::new(CampaignConfig::default());
        assert!(detector.would_accept("SPY", Timeframe::D1, SellingClimax));
        assert!(!detector.would_accept("SPY", Timeframe::D1, Spring));
        detector.observe(&pattern(SellingClimax, 0));
        assert!(detector.would_accept("SPY", Timeframe::D1, AutomaticRally));
        assert!(!detector.would_accept("SPY", Timeframe::D1, Spring));
    }
}
