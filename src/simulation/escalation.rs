use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bevy_utils::tracing::{debug, info};
use serde::{Deserialize, Serialize};

use crate::core::config::EscalationTuning;
use crate::core::error::EngineError;
use crate::simulation::collaborators::InvestigationContext;
use crate::simulation::economy::Money;
use crate::simulation::events::{ConsequenceEvent, ConsequenceEventLog};
use crate::simulation::ledger::{ScalarLedger, ValueChange};
use crate::simulation::time::GameInstant;
use crate::simulation::track::{OwnerId, TrackId};

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationKind {
    Surveillance,
    IrsAudit,
    Raid,
    ArrestWarrant,
}

impl InvestigationKind {
    pub const ALL: [InvestigationKind; 4] = [
        InvestigationKind::Surveillance,
        InvestigationKind::IrsAudit,
        InvestigationKind::Raid,
        InvestigationKind::ArrestWarrant,
    ];

    pub fn severity(self) -> u8 {
        match self {
            InvestigationKind::Surveillance => 1,
            InvestigationKind::IrsAudit => 2,
            InvestigationKind::Raid => 3,
            InvestigationKind::ArrestWarrant => 4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InvestigationKind::Surveillance => "SURVEILLANCE",
            InvestigationKind::IrsAudit => "IRS_AUDIT",
            InvestigationKind::Raid => "RAID",
            InvestigationKind::ArrestWarrant => "ARREST_WARRANT",
        }
    }
}

impl fmt::Display for InvestigationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvestigationKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        InvestigationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| EngineError::UnknownInvestigationKind(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvestigationOutcome {
    Cleared,
    Penalized,
}

impl InvestigationOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            InvestigationOutcome::Cleared => "CLEARED",
            InvestigationOutcome::Penalized => "PENALIZED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EscalationPhase {
    Dormant,
    Elevated,
    UnderSurveillance,
    UnderInvestigation(InvestigationKind),
    Resolved(InvestigationOutcome),
}

impl EscalationPhase {
    fn rank(self) -> u8 {
        match self {
            EscalationPhase::Dormant | EscalationPhase::Resolved(_) => 0,
            EscalationPhase::Elevated => 1,
            EscalationPhase::UnderSurveillance => 2,
            EscalationPhase::UnderInvestigation(_) => 3,
        }
    }

    /// Flat storage name; the investigation kind / outcome is stored alongside.
    pub fn as_str(self) -> &'static str {
        match self {
            EscalationPhase::Dormant => "DORMANT",
            EscalationPhase::Elevated => "ELEVATED",
            EscalationPhase::UnderSurveillance => "UNDER_SURVEILLANCE",
            EscalationPhase::UnderInvestigation(_) => "UNDER_INVESTIGATION",
            EscalationPhase::Resolved(_) => "RESOLVED",
        }
    }
}

impl fmt::Display for EscalationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EscalationPhase::UnderInvestigation(kind) => write!(f, "UNDER_INVESTIGATION({})", kind),
            EscalationPhase::Resolved(outcome) => write!(f, "RESOLVED({})", outcome.as_str()),
            other => f.write_str(other.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    pub kind: InvestigationKind,
    pub started_at: GameInstant,
    pub resolution_deadline: GameInstant,
    pub frozen: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationState {
    pub owner: OwnerId,
    pub level: f64,
    pub last_increase_at: GameInstant,
    /// Decay has been applied up to this instant.
    pub last_decay_at: GameInstant,
    #[serde(default)]
    pub source_breakdown: BTreeMap<String, f64>,
    pub phase: EscalationPhase,
    #[serde(default)]
    pub investigation: Option<Investigation>,
}

impl EscalationState {
    pub fn new(owner: OwnerId, now: GameInstant) -> Self {
        Self {
            owner,
            level: 0.0,
            last_increase_at: now,
            last_decay_at: now,
            source_breakdown: BTreeMap::new(),
            phase: EscalationPhase::Dormant,
            investigation: None,
        }
    }

    pub fn breakdown_total(&self) -> f64 {
        self.source_breakdown.values().sum()
    }
}

/// Heat per owner: a decaying track on the ledger plus the investigation state machine.
#[derive(Debug, Clone)]
pub struct EscalationLadder {
    tuning: EscalationTuning,
    states: BTreeMap<OwnerId, EscalationState>,
}

impl EscalationLadder {
    pub fn new(tuning: EscalationTuning) -> Self {
        Self {
            tuning,
            states: BTreeMap::new(),
        }
    }

    pub fn tuning(&self) -> &EscalationTuning {
        &self.tuning
    }

    pub fn state(&self, owner: OwnerId) -> Option<&EscalationState> {
        self.states.get(&owner)
    }

    pub fn states(&self) -> impl Iterator<Item = &EscalationState> {
        self.states.values()
    }

    pub fn restore(&mut self, states: Vec<EscalationState>) {
        self.states = states
            .into_iter()
            .map(|state| (state.owner, state))
            .collect();
    }

    pub fn level(&self, owner: OwnerId) -> f64 {
        self.states.get(&owner).map_or(0.0, |state| state.level)
    }

    pub fn phase(&self, owner: OwnerId) -> EscalationPhase {
        self.states
            .get(&owner)
            .map_or(EscalationPhase::Dormant, |state| state.phase)
    }

    /// Detection multiplier applied by witnesses, cameras and auditors.
    pub fn sensitivity(&self, owner: OwnerId) -> f64 {
        let sensitivity = &self.tuning.sensitivity;
        match self.phase(owner) {
            EscalationPhase::Dormant | EscalationPhase::Resolved(_) => sensitivity.dormant,
            EscalationPhase::Elevated => sensitivity.elevated,
            EscalationPhase::UnderSurveillance => sensitivity.surveillance,
            EscalationPhase::UnderInvestigation(_) => sensitivity.investigation,
        }
    }

    /// Owners whose investigation deadline has passed.
    pub fn due_for_resolution(&self, now: GameInstant) -> Vec<OwnerId> {
        self.states
            .values()
            .filter(|state| {
                state
                    .investigation
                    .as_ref()
                    .map_or(false, |open| open.resolution_deadline <= now)
            })
            .map(|state| state.owner)
            .collect()
    }

    fn state_mut(&mut self, owner: OwnerId, now: GameInstant) -> &mut EscalationState {
        self.states
            .entry(owner)
            .or_insert_with(|| EscalationState::new(owner, now))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_level(
        &mut self,
        owner: OwnerId,
        amount: f64,
        source: &str,
        now: GameInstant,
        ledger: &mut ScalarLedger,
        ctx: &mut dyn InvestigationContext,
        log: &mut ConsequenceEventLog,
    ) -> f64 {
        self.settle(owner, now, ledger, log);
        let amount = if amount.is_nan() { 0.0 } else { amount.max(0.0) };

        let change = ledger.apply_base_delta(owner, TrackId::HEAT, amount, source, now, log);
        let applied = change.applied();
        let state = self.state_mut(owner, now);
        if amount > 0.0 {
            state.last_increase_at = now;
        }
        state.level = change.new;
        if applied > 0.0 {
            *state.source_breakdown.entry(source.to_string()).or_insert(0.0) += applied;
            log.push(ConsequenceEvent::LevelChanged {
                owner,
                amount: applied,
                level: change.new,
            });
        }

        let crossed: Vec<f64> = change.rising_levels().collect();
        for level in crossed {
            self.escalate(owner, level, now, ctx, log);
        }
        change.new
    }

    /// Named bucket only, or largest buckets first when `source` is `None`.
    pub fn reduce_level(
        &mut self,
        owner: OwnerId,
        amount: f64,
        source: Option<&str>,
        now: GameInstant,
        ledger: &mut ScalarLedger,
        log: &mut ConsequenceEventLog,
    ) -> f64 {
        self.settle(owner, now, ledger, log);
        let amount = if amount.is_nan() { 0.0 } else { amount.max(0.0) };
        let Some(state) = self.states.get_mut(&owner) else {
            return 0.0;
        };
        if state.level <= 0.0 || amount <= 0.0 {
            return state.level;
        }

        let taken = match source {
            Some(source) => take_from_bucket(&mut state.source_breakdown, source, amount),
            None => take_from_largest(&mut state.source_breakdown, amount),
        };
        if taken <= 0.0 {
            return state.level;
        }
        let reason = source.unwrap_or("reduction");
        let change = ledger.apply_base_delta(owner, TrackId::HEAT, -taken, reason, now, log);
        self.finish_reduction(owner, change, log);
        self.level(owner)
    }

    /// Tiered decay over the last `elapsed_hours`, never reaching back before
    /// the previous decay or the last increase.
    pub fn decay_tick(
        &mut self,
        owner: OwnerId,
        elapsed_hours: f64,
        now: GameInstant,
        ledger: &mut ScalarLedger,
        log: &mut ConsequenceEventLog,
    ) -> f64 {
        let tuning = &self.tuning;
        let Some(state) = self.states.get_mut(&owner) else {
            return 0.0;
        };
        let window_start = state.last_decay_at.max(state.last_increase_at);
        state.last_decay_at = state.last_decay_at.max(now);
        if state.level <= 0.0 || !(elapsed_hours > 0.0) {
            return 0.0;
        }

        let end_days = now.days_since(state.last_increase_at);
        let start_days = (end_days - elapsed_hours / 24.0)
            .max(window_start.days_since(state.last_increase_at))
            .max(0.0);
        if end_days <= start_days {
            return 0.0;
        }
        let amount = decay_amount(tuning, start_days, end_days).min(state.level);
        if amount <= 0.0 {
            return 0.0;
        }

        let remaining = state.level - amount;
        let factor = if state.level > 0.0 { remaining / state.level } else { 0.0 };
        for value in state.source_breakdown.values_mut() {
            *value *= factor;
        }

        let change = ledger.apply_base_delta(owner, TrackId::HEAT, -amount, "decay", now, log);
        self.finish_reduction(owner, change, log);
        amount
    }

    /// Catches decay up to `now` so later changes start from the right level.
    fn settle(
        &mut self,
        owner: OwnerId,
        now: GameInstant,
        ledger: &mut ScalarLedger,
        log: &mut ConsequenceEventLog,
    ) {
        let Some(state) = self.states.get(&owner) else {
            return;
        };
        let pending = now.hours_since(state.last_decay_at);
        if pending > 0.0 {
            self.decay_tick(owner, pending, now, ledger, log);
        }
    }

    fn finish_reduction(&mut self, owner: OwnerId, change: ValueChange, log: &mut ConsequenceEventLog) {
        let Some(state) = self.states.get_mut(&owner) else {
            return;
        };
        state.level = change.new;
        if change.new <= EPSILON {
            state.source_breakdown.clear();
        } else {
            state.source_breakdown.retain(|_, value| *value > EPSILON);
        }
        if change.applied() != 0.0 {
            log.push(ConsequenceEvent::LevelChanged {
                owner,
                amount: change.applied(),
                level: change.new,
            });
        }
        if change.old > 0.0 && change.new <= 0.0 {
            debug!(%owner, "heat cleared");
            log.push(ConsequenceEvent::Cleared { owner });
        }
        let crossed: Vec<f64> = change.falling_levels().collect();
        for level in crossed {
            self.relax(owner, level, log);
        }
    }

    fn escalate(
        &mut self,
        owner: OwnerId,
        level: f64,
        now: GameInstant,
        ctx: &mut dyn InvestigationContext,
        log: &mut ConsequenceEventLog,
    ) {
        let EscalationTuning {
            elevated_level,
            surveillance_level,
            investigation_level,
            critical_level,
            audit_legitimacy_floor,
            ..
        } = self.tuning;
        if level == elevated_level {
            self.advance_phase(owner, EscalationPhase::Elevated, log);
        } else if level == surveillance_level {
            self.advance_phase(owner, EscalationPhase::UnderSurveillance, log);
        } else if level == investigation_level {
            let kind = if ctx.has_evidence(owner) {
                InvestigationKind::Raid
            } else if ctx.legitimacy(owner) < audit_legitimacy_floor {
                InvestigationKind::IrsAudit
            } else {
                InvestigationKind::Surveillance
            };
            self.trigger_investigation(owner, kind, now, ctx, log);
        } else if level == critical_level {
            let kind = if ctx.has_evidence(owner) {
                InvestigationKind::ArrestWarrant
            } else {
                InvestigationKind::Raid
            };
            self.trigger_investigation(owner, kind, now, ctx, log);
        }
    }

    fn relax(&mut self, owner: OwnerId, level: f64, log: &mut ConsequenceEventLog) {
        let phase = self.phase(owner);
        if level == self.tuning.surveillance_level && phase == EscalationPhase::UnderSurveillance {
            self.set_phase(owner, EscalationPhase::Elevated, log);
        } else if level == self.tuning.elevated_level && phase == EscalationPhase::Elevated {
            self.set_phase(owner, EscalationPhase::Dormant, log);
        }
    }

    /// Leaves a resolved investigation on the phase the current level implies.
    fn settle_phase(&mut self, owner: OwnerId, log: &mut ConsequenceEventLog) {
        let settled = if self.level(owner) >= self.tuning.elevated_level {
            EscalationPhase::Elevated
        } else {
            EscalationPhase::Dormant
        };
        self.set_phase(owner, settled, log);
    }

    fn advance_phase(&mut self, owner: OwnerId, next: EscalationPhase, log: &mut ConsequenceEventLog) {
        if next.rank() > self.phase(owner).rank() {
            self.set_phase(owner, next, log);
        }
    }

    fn set_phase(&mut self, owner: OwnerId, next: EscalationPhase, log: &mut ConsequenceEventLog) {
        let Some(state) = self.states.get_mut(&owner) else {
            return;
        };
        let from = state.phase;
        if from == next {
            return;
        }
        state.phase = next;
        debug!(%owner, %from, to = %next, "escalation phase changed");
        log.push(ConsequenceEvent::PhaseChanged {
            owner,
            from,
            to: next,
        });
    }

    /// Opens an investigation unless an equally or more severe one is already open.
    pub fn trigger_investigation(
        &mut self,
        owner: OwnerId,
        kind: InvestigationKind,
        now: GameInstant,
        ctx: &mut dyn InvestigationContext,
        log: &mut ConsequenceEventLog,
    ) -> bool {
        let Some(profile) = self.tuning.investigation(kind).copied() else {
            return false;
        };
        let state = self.state_mut(owner, now);
        let already_frozen = match &state.investigation {
            Some(open) if open.kind.severity() >= kind.severity() => return false,
            Some(open) => open.frozen,
            None => Money::zero(),
        };

        let frozen = if profile.freeze_fraction > 0.0 {
            ctx.freeze_funds(owner, profile.freeze_fraction)
        } else {
            Money::zero()
        };
        state.investigation = Some(Investigation {
            kind,
            started_at: now,
            resolution_deadline: now.plus_hours(profile.deadline_hours),
            frozen: already_frozen.add(frozen),
        });
        info!(%owner, %kind, %frozen, deadline_hours = profile.deadline_hours, "investigation opened");
        self.set_phase(owner, EscalationPhase::UnderInvestigation(kind), log);
        log.push(ConsequenceEvent::InvestigationTriggered { owner, kind });
        true
    }

    /// Closes a due investigation. `None` when nothing is open or the deadline is ahead.
    pub fn resolve_investigation(
        &mut self,
        owner: OwnerId,
        now: GameInstant,
        ledger: &mut ScalarLedger,
        ctx: &mut dyn InvestigationContext,
        log: &mut ConsequenceEventLog,
    ) -> Option<InvestigationOutcome> {
        let state = self.states.get_mut(&owner)?;
        if state.investigation.as_ref()?.resolution_deadline > now {
            return None;
        }
        let investigation = state.investigation.take()?;

        let passed = ctx.legitimacy(owner) >= self.tuning.pass_legitimacy && !ctx.has_evidence(owner);
        let outcome = if passed {
            ctx.release_funds(owner, investigation.frozen);
            InvestigationOutcome::Cleared
        } else {
            ctx.seize_funds(owner, investigation.frozen);
            InvestigationOutcome::Penalized
        };
        info!(%owner, kind = %investigation.kind, outcome = outcome.as_str(), "investigation resolved");
        self.set_phase(owner, EscalationPhase::Resolved(outcome), log);
        log.push(ConsequenceEvent::InvestigationResolved {
            owner,
            kind: investigation.kind,
            outcome,
        });

        match outcome {
            InvestigationOutcome::Cleared => {
                let relief = self.tuning.clearance_relief;
                self.reduce_level(owner, relief, None, now, ledger, log);
                self.settle_phase(owner, log);
            }
            InvestigationOutcome::Penalized => {
                self.settle_phase(owner, log);
                let penalty = self
                    .tuning
                    .investigation(investigation.kind)
                    .map_or(0.0, |profile| profile.failure_heat);
                if penalty > 0.0 {
                    self.add_level(owner, penalty, "investigation_penalty", now, ledger, ctx, log);
                }
            }
        }
        Some(outcome)
    }
}

/// Base rate times the integral of the tier multiplier over `[from_days, to_days]`.
pub fn decay_amount(tuning: &EscalationTuning, from_days: f64, to_days: f64) -> f64 {
    let tiers = &tuning.decay_tiers;
    let mut weighted_days = 0.0;
    for (index, tier) in tiers.iter().enumerate() {
        let tier_end = tiers
            .get(index + 1)
            .map_or(f64::INFINITY, |next| next.after_days);
        let lo = from_days.max(tier.after_days);
        let hi = to_days.min(tier_end);
        if hi > lo {
            weighted_days += (hi - lo) * tier.multiplier;
        }
    }
    weighted_days * tuning.base_decay_per_day
}

fn take_from_bucket(buckets: &mut BTreeMap<String, f64>, source: &str, amount: f64) -> f64 {
    let Some(value) = buckets.get_mut(source) else {
        return 0.0;
    };
    let taken = amount.min(*value);
    *value -= taken;
    taken
}

fn take_from_largest(buckets: &mut BTreeMap<String, f64>, amount: f64) -> f64 {
    let mut remaining = amount;
    let mut taken = 0.0;
    while remaining > EPSILON {
        let largest = buckets
            .iter()
            .filter(|(_, value)| **value > EPSILON)
            .min_by(|a, b| b.1.total_cmp(a.1))
            .map(|(source, _)| source.clone());
        let Some(source) = largest else {
            break;
        };
        let step = take_from_bucket(buckets, &source, remaining);
        remaining -= step;
        taken += step;
    }
    taken
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EngineConfig;
    use crate::simulation::collaborators::FixedContext;
    use crate::simulation::economy::FinanceState;

    const OWNER: OwnerId = OwnerId(0);

    struct Fixture {
        ladder: EscalationLadder,
        ledger: ScalarLedger,
        log: ConsequenceEventLog,
        ctx: FixedContext,
    }

    impl Fixture {
        fn new() -> Self {
            let config = EngineConfig::default();
            Self {
                ladder: EscalationLadder::new(config.escalation.clone()),
                ledger: ScalarLedger::new(&config).expect("default config"),
                log: ConsequenceEventLog::default(),
                ctx: FixedContext::default(),
            }
        }

        fn add(&mut self, amount: f64, source: &str, now: GameInstant) -> f64 {
            self.ladder.add_level(
                OWNER,
                amount,
                source,
                now,
                &mut self.ledger,
                &mut self.ctx,
                &mut self.log,
            )
        }

        fn reduce(&mut self, amount: f64, source: Option<&str>, now: GameInstant) -> f64 {
            self.ladder
                .reduce_level(OWNER, amount, source, now, &mut self.ledger, &mut self.log)
        }

        fn breakdown(&self) -> BTreeMap<String, f64> {
            self.ladder
                .state(OWNER)
                .map(|state| state.source_breakdown.clone())
                .unwrap_or_default()
        }
    }

    fn assert_breakdown_matches_level(fx: &Fixture) {
        let state = fx.ladder.state(OWNER).expect("state exists");
        assert!((state.breakdown_total() - state.level).abs() < 1e-6);
        assert_eq!(state.level, fx.ledger.peek(OWNER, TrackId::HEAT, GameInstant(u64::MAX / 2)));
    }

    #[test]
    fn add_level_accumulates_sources_and_clamps() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        fx.add(10.0, "flashy_purchase", now);
        fx.add(15.0, "bar_fight", now);
        let level = fx.add(200.0, "bank_job", now);

        assert_eq!(level, 100.0);
        let breakdown = fx.breakdown();
        assert_eq!(breakdown.get("bank_job"), Some(&75.0));
        assert_breakdown_matches_level(&fx);
    }

    #[test]
    fn reduce_without_source_hits_largest_bucket() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        fx.add(10.0, "flashy_purchase", now);
        fx.add(30.0, "bar_fight", now);
        fx.add(5.0, "jaywalking", now);

        fx.reduce(20.0, None, now);
        let breakdown = fx.breakdown();
        assert_eq!(breakdown.get("bar_fight"), Some(&10.0));
        assert_eq!(breakdown.get("flashy_purchase"), Some(&10.0));
        assert_eq!(breakdown.get("jaywalking"), Some(&5.0));
        assert_breakdown_matches_level(&fx);
    }

    #[test]
    fn reduce_without_source_spills_into_next_largest() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        fx.add(10.0, "a", now);
        fx.add(20.0, "b", now);

        fx.reduce(25.0, None, now);
        let breakdown = fx.breakdown();
        assert_eq!(breakdown.get("b"), None);
        assert_eq!(breakdown.get("a"), Some(&5.0));
        assert_eq!(fx.ladder.level(OWNER), 5.0);
    }

    #[test]
    fn reduce_named_source_never_goes_negative() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        fx.add(10.0, "flashy_purchase", now);
        fx.add(20.0, "bar_fight", now);

        let level = fx.reduce(50.0, Some("flashy_purchase"), now);
        assert_eq!(level, 20.0);
        assert_eq!(fx.breakdown().get("flashy_purchase"), None);
        assert_eq!(fx.reduce(5.0, Some("unknown"), now), 20.0);
        assert_breakdown_matches_level(&fx);
    }

    #[test]
    fn cleared_fires_once_when_level_hits_zero() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        fx.add(12.0, "loitering", now);
        fx.reduce(100.0, None, now);
        fx.reduce(5.0, None, now);
        fx.ladder
            .decay_tick(OWNER, 48.0, now.plus_days(2), &mut fx.ledger, &mut fx.log);

        let cleared = fx
            .log
            .iter()
            .filter(|event| matches!(event, ConsequenceEvent::Cleared { .. }))
            .count();
        assert_eq!(cleared, 1);
        assert_eq!(fx.ladder.level(OWNER), 0.0);
    }

    #[test]
    fn decay_rate_grows_with_time_since_increase() {
        let start = GameInstant(0);
        let mut recent = Fixture::new();
        let mut stale = Fixture::new();
        let mut middle = Fixture::new();
        for fx in [&mut recent, &mut stale, &mut middle] {
            fx.add(60.0, "robbery", start);
        }

        let recent_drop = recent.ladder.decay_tick(
            OWNER,
            24.0,
            start.plus_days(3),
            &mut recent.ledger,
            &mut recent.log,
        );
        let middle_drop = middle.ladder.decay_tick(
            OWNER,
            24.0,
            start.plus_days(11),
            &mut middle.ledger,
            &mut middle.log,
        );
        let stale_drop = stale.ladder.decay_tick(
            OWNER,
            24.0,
            start.plus_days(41),
            &mut stale.ledger,
            &mut stale.log,
        );

        assert!((recent_drop - 2.0).abs() < 1e-9);
        assert!((middle_drop - 2.0 * recent_drop).abs() < 1e-9);
        assert!((stale_drop - 3.0 * recent_drop).abs() < 1e-9);
    }

    #[test]
    fn one_long_decay_matches_many_short_ones() {
        let start = GameInstant(0);
        let mut whole = Fixture::new();
        let mut split = Fixture::new();
        for fx in [&mut whole, &mut split] {
            fx.add(45.0, "robbery", start);
            fx.add(25.0, "fraud", start);
        }

        let end = start.plus_days(12);
        whole
            .ladder
            .decay_tick(OWNER, end.hours_since(start), end, &mut whole.ledger, &mut whole.log);
        let mut now = start;
        while now < end {
            now = now.plus_hours(5);
            let now = now.min(end);
            split
                .ladder
                .decay_tick(OWNER, 5.0, now, &mut split.ledger, &mut split.log);
        }

        // 7 days at 2/day then 5 days at 4/day.
        assert!((whole.ladder.level(OWNER) - (70.0 - 14.0 - 20.0)).abs() < 1e-9);
        assert!((whole.ladder.level(OWNER) - split.ladder.level(OWNER)).abs() < 1e-9);
        for (source, value) in whole.breakdown() {
            let other = split.breakdown().get(&source).copied().unwrap_or_default();
            assert!((value - other).abs() < 1e-9);
        }
        assert_breakdown_matches_level(&whole);
    }

    #[test]
    fn decay_at_zero_is_silent() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        fx.add(0.0, "nothing", now);
        fx.log.drain();
        let decayed = fx
            .ladder
            .decay_tick(OWNER, 24.0, now.plus_days(1), &mut fx.ledger, &mut fx.log);
        assert_eq!(decayed, 0.0);
        assert!(fx.log.is_empty());
    }

    #[test]
    fn crossings_walk_the_phase_ladder() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);

        fx.add(35.0, "bar_fight", now);
        assert_eq!(fx.ladder.phase(OWNER), EscalationPhase::Elevated);
        assert_eq!(fx.ladder.sensitivity(OWNER), 1.25);

        fx.add(20.0, "bar_fight", now);
        assert_eq!(fx.ladder.phase(OWNER), EscalationPhase::UnderSurveillance);

        fx.reduce(10.0, None, now);
        assert_eq!(fx.ladder.phase(OWNER), EscalationPhase::Elevated);
        fx.reduce(20.0, None, now);
        assert_eq!(fx.ladder.phase(OWNER), EscalationPhase::Dormant);
    }

    #[test]
    fn investigation_kind_depends_on_evidence_and_legitimacy() {
        let now = GameInstant(0);

        let mut clean = Fixture::new();
        clean.add(75.0, "rumours", now);
        assert_eq!(
            clean.ladder.phase(OWNER),
            EscalationPhase::UnderInvestigation(InvestigationKind::Surveillance)
        );

        let mut shady = Fixture::new();
        shady.ctx.legitimacy = 0.2;
        shady.add(75.0, "cash_purchases", now);
        assert_eq!(
            shady.ladder.phase(OWNER),
            EscalationPhase::UnderInvestigation(InvestigationKind::IrsAudit)
        );

        let mut caught = Fixture::new();
        caught.ctx.evidence = true;
        caught.add(95.0, "heist", now);
        assert_eq!(
            caught.ladder.phase(OWNER),
            EscalationPhase::UnderInvestigation(InvestigationKind::ArrestWarrant)
        );
        let triggered: Vec<InvestigationKind> = caught
            .log
            .iter()
            .filter_map(|event| match event {
                ConsequenceEvent::InvestigationTriggered { kind, .. } => Some(*kind),
                _ => None,
            })
            .collect();
        assert_eq!(
            triggered,
            vec![InvestigationKind::Raid, InvestigationKind::ArrestWarrant]
        );
    }

    #[test]
    fn weaker_investigation_does_not_replace_open_one() {
        let mut fx = Fixture::new();
        let now = GameInstant(0);
        assert!(fx.ladder.trigger_investigation(
            OWNER,
            InvestigationKind::Raid,
            now,
            &mut fx.ctx,
            &mut fx.log
        ));
        assert!(!fx.ladder.trigger_investigation(
            OWNER,
            InvestigationKind::IrsAudit,
            now,
            &mut fx.ctx,
            &mut fx.log
        ));
        assert_eq!(
            fx.ladder.phase(OWNER),
            EscalationPhase::UnderInvestigation(InvestigationKind::Raid)
        );
    }

    #[test]
    fn audit_freezes_funds_until_resolution() {
        let config = EngineConfig::default();
        let mut ladder = EscalationLadder::new(config.escalation.clone());
        let mut ledger = ScalarLedger::new(&config).expect("default config");
        let mut log = ConsequenceEventLog::default();
        let mut finances = FinanceState::default();
        finances.record_income(OWNER, Money::from_dollars(1_000), true);
        let now = GameInstant(0);

        ladder.add_level(OWNER, 40.0, "flashy_purchase", now, &mut ledger, &mut finances, &mut log);
        assert!(ladder.trigger_investigation(OWNER, InvestigationKind::IrsAudit, now, &mut finances, &mut log));
        let frozen = finances.account(OWNER).map(|account| account.frozen);
        assert_eq!(frozen, Some(Money::from_dollars(500)));

        let early = now.plus_hours(71);
        assert_eq!(
            ladder.resolve_investigation(OWNER, early, &mut ledger, &mut finances, &mut log),
            None
        );

        let due = now.plus_hours(72);
        assert_eq!(ladder.due_for_resolution(due), vec![OWNER]);
        let outcome = ladder.resolve_investigation(OWNER, due, &mut ledger, &mut finances, &mut log);
        assert_eq!(outcome, Some(InvestigationOutcome::Cleared));
        let account = finances.account(OWNER).cloned().unwrap_or_default();
        assert_eq!(account.frozen, Money::zero());
        assert_eq!(account.liquid, Money::from_dollars(1_000));
        assert_eq!(ladder.phase(OWNER), EscalationPhase::Dormant);
        assert!(log.iter().any(|event| matches!(
            event,
            ConsequenceEvent::PhaseChanged {
                to: EscalationPhase::Resolved(InvestigationOutcome::Cleared),
                ..
            }
        )));
    }

    #[test]
    fn failed_review_seizes_funds_and_adds_heat() {
        let config = EngineConfig::default();
        let mut ladder = EscalationLadder::new(config.escalation.clone());
        let mut ledger = ScalarLedger::new(&config).expect("default config");
        let mut log = ConsequenceEventLog::default();
        let mut finances = FinanceState::default();
        finances.record_income(OWNER, Money::from_dollars(1_000), false);
        let now = GameInstant(0);

        ladder.add_level(OWNER, 45.0, "cash_purchases", now, &mut ledger, &mut finances, &mut log);
        assert!(ladder.trigger_investigation(OWNER, InvestigationKind::IrsAudit, now, &mut finances, &mut log));

        let due = now.plus_hours(72);
        let outcome = ladder.resolve_investigation(OWNER, due, &mut ledger, &mut finances, &mut log);
        assert_eq!(outcome, Some(InvestigationOutcome::Penalized));
        let account = finances.account(OWNER).cloned().unwrap_or_default();
        assert_eq!(account.frozen, Money::zero());
        assert_eq!(account.liquid, Money::from_dollars(500));
        // 45 less three days of decay, plus the audit penalty.
        assert!((ladder.level(OWNER) - 49.0).abs() < 1e-9);
        assert_eq!(ladder.phase(OWNER), EscalationPhase::Elevated);
        assert!(ladder
            .state(OWNER)
            .map_or(false, |state| state.source_breakdown.contains_key("investigation_penalty")));
    }

    #[test]
    fn failed_review_on_low_heat_returns_to_dormant() {
        let mut fx = Fixture::new();
        fx.ctx.legitimacy = 0.3;
        let now = GameInstant(0);

        fx.add(75.0, "street_fight", now);
        assert_eq!(
            fx.ladder.phase(OWNER),
            EscalationPhase::UnderInvestigation(InvestigationKind::IrsAudit)
        );
        fx.reduce(70.0, None, now);

        let due = now.plus_hours(72);
        let outcome = fx
            .ladder
            .resolve_investigation(OWNER, due, &mut fx.ledger, &mut fx.ctx, &mut fx.log);
        assert_eq!(outcome, Some(InvestigationOutcome::Penalized));
        assert!(fx.ladder.level(OWNER) < 30.0);
        assert_eq!(fx.ladder.phase(OWNER), EscalationPhase::Dormant);
        assert_eq!(fx.ladder.sensitivity(OWNER), 1.0);

        let later = due.plus_days(30);
        fx.ladder
            .decay_tick(OWNER, 30.0 * 24.0, later, &mut fx.ledger, &mut fx.log);
        assert_eq!(fx.ladder.level(OWNER), 0.0);
        assert_eq!(fx.ladder.phase(OWNER), EscalationPhase::Dormant);
        assert_breakdown_matches_level(&fx);
    }

    #[test]
    fn decay_amount_integrates_across_tiers() {
        let tuning = EscalationTuning::default();
        assert!((decay_amount(&tuning, 0.0, 7.0) - 14.0).abs() < 1e-9);
        assert!((decay_amount(&tuning, 6.0, 8.0) - (2.0 + 4.0)).abs() < 1e-9);
        assert!((decay_amount(&tuning, 29.0, 31.0) - (4.0 + 6.0)).abs() < 1e-9);
    }
}
