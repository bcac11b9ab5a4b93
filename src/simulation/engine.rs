use bevy_ecs::prelude::*;
use bevy_utils::tracing::{debug, info};

use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::serialization::EngineSnapshot;
use crate::simulation::collaborators::{InvestigationContext, ValueWeights};
use crate::simulation::escalation::{
    EscalationLadder, EscalationPhase, EscalationState, InvestigationKind, InvestigationOutcome,
};
use crate::simulation::events::{ConsequenceEvent, ConsequenceEventLog};
use crate::simulation::ledger::{HistoryRecord, ModifierId, ScalarLedger};
use crate::simulation::memory::{MemoryEntry, MemoryStore, ObservedAction};
use crate::simulation::patterns::{PatternDetector, PatternRecord};
use crate::simulation::time::GameInstant;
use crate::simulation::track::{Comparison, OwnerId, TrackId};

/// Facade over the ledger, memory, pattern and escalation subsystems.
///
/// Every time-dependent call takes the current `GameInstant`. Events raised by
/// any call are queued here until `drain_events`.
#[derive(Resource, Debug, Clone)]
pub struct ConsequenceEngine {
    config: EngineConfig,
    ledger: ScalarLedger,
    memory: MemoryStore,
    patterns: PatternDetector,
    escalation: EscalationLadder,
    events: ConsequenceEventLog,
    last_advanced: GameInstant,
}

impl ConsequenceEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let ledger = ScalarLedger::new(&config)?;
        Ok(Self {
            memory: MemoryStore::new(config.memory.clone()),
            patterns: PatternDetector::new(config.patterns.clone()),
            escalation: EscalationLadder::new(config.escalation.clone()),
            ledger,
            config,
            events: ConsequenceEventLog::default(),
            last_advanced: GameInstant::default(),
        })
    }

    pub fn starting_at(mut self, now: GameInstant) -> Self {
        self.last_advanced = now;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn ledger(&self) -> &ScalarLedger {
        &self.ledger
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn patterns(&self) -> &PatternDetector {
        &self.patterns
    }

    pub fn escalation(&self) -> &EscalationLadder {
        &self.escalation
    }

    pub fn last_advanced(&self) -> GameInstant {
        self.last_advanced
    }

    pub fn pending_events(&self) -> &ConsequenceEventLog {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<ConsequenceEvent> {
        self.events.drain()
    }

    // Scalar tracks

    pub fn value(&mut self, owner: OwnerId, track: TrackId, now: GameInstant) -> f64 {
        self.ledger.value(owner, track, now)
    }

    pub fn history(&self, owner: OwnerId, track: TrackId) -> &[HistoryRecord] {
        self.ledger.history(owner, track)
    }

    /// Heat is normally driven through `add_heat` / `reduce_heat` so the
    /// source breakdown stays in step.
    pub fn modify_base(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        delta: f64,
        reason: &str,
        now: GameInstant,
    ) -> f64 {
        self.ledger
            .modify_base(owner, track, delta, reason, now, &mut self.events)
    }

    pub fn add_modifier(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        delta: f64,
        duration_hours: u32,
        source: &str,
        now: GameInstant,
    ) -> ModifierId {
        self.ledger.add_modifier(
            owner,
            track,
            delta,
            duration_hours,
            source,
            now,
            &mut self.events,
        )
    }

    pub fn remove_modifier(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        id: ModifierId,
        now: GameInstant,
    ) -> bool {
        self.ledger
            .remove_modifier(owner, track, id, now, &mut self.events)
    }

    pub fn check_expired_modifiers(&mut self, now: GameInstant) -> usize {
        self.ledger.check_expired_modifiers(now, &mut self.events)
    }

    pub fn check_threshold(
        &self,
        owner: OwnerId,
        track: TrackId,
        level: f64,
        comparison: Comparison,
        now: GameInstant,
    ) -> bool {
        self.ledger
            .check_threshold(owner, track, level, comparison, now)
    }

    // Memory and patterns

    /// Counts the occurrence, then offers it to the owner's memory.
    pub fn observe(
        &mut self,
        owner: OwnerId,
        action: &ObservedAction,
        weights: &dyn ValueWeights,
    ) -> Option<MemoryEntry> {
        self.patterns
            .record(owner, &action.category, action.timestamp, &mut self.events);
        self.memory.observe(
            owner,
            action,
            &self.patterns,
            weights,
            &mut self.ledger,
            &mut self.events,
        )
    }

    pub fn record_pattern(
        &mut self,
        owner: OwnerId,
        category: &str,
        timestamp: GameInstant,
    ) -> PatternRecord {
        self.patterns
            .record(owner, category, timestamp, &mut self.events)
    }

    pub fn is_significant(&self, owner: OwnerId, category: &str) -> bool {
        self.patterns.is_significant(owner, category)
    }

    pub fn recall(&self, owner: OwnerId, count: usize) -> Vec<MemoryEntry> {
        self.memory.recall(owner, count)
    }

    pub fn recall_about(&self, owner: OwnerId, actor: OwnerId, count: usize) -> Vec<MemoryEntry> {
        self.memory.recall_about(owner, actor, count)
    }

    pub fn decay_memories(&mut self, owner: OwnerId, elapsed_days: f64) -> usize {
        self.memory.decay_tick(owner, elapsed_days)
    }

    // Heat

    pub fn heat(&self, owner: OwnerId) -> f64 {
        self.escalation.level(owner)
    }

    pub fn phase(&self, owner: OwnerId) -> EscalationPhase {
        self.escalation.phase(owner)
    }

    pub fn escalation_state(&self, owner: OwnerId) -> Option<&EscalationState> {
        self.escalation.state(owner)
    }

    pub fn sensitivity(&self, owner: OwnerId) -> f64 {
        self.escalation.sensitivity(owner)
    }

    pub fn add_heat(
        &mut self,
        owner: OwnerId,
        amount: f64,
        source: &str,
        now: GameInstant,
        ctx: &mut dyn InvestigationContext,
    ) -> f64 {
        self.escalation.add_level(
            owner,
            amount,
            source,
            now,
            &mut self.ledger,
            ctx,
            &mut self.events,
        )
    }

    pub fn reduce_heat(
        &mut self,
        owner: OwnerId,
        amount: f64,
        source: Option<&str>,
        now: GameInstant,
    ) -> f64 {
        self.escalation
            .reduce_level(owner, amount, source, now, &mut self.ledger, &mut self.events)
    }

    pub fn decay_heat(&mut self, owner: OwnerId, elapsed_hours: f64, now: GameInstant) -> f64 {
        self.escalation
            .decay_tick(owner, elapsed_hours, now, &mut self.ledger, &mut self.events)
    }

    pub fn trigger_investigation(
        &mut self,
        owner: OwnerId,
        kind: InvestigationKind,
        now: GameInstant,
        ctx: &mut dyn InvestigationContext,
    ) -> bool {
        self.escalation
            .trigger_investigation(owner, kind, now, ctx, &mut self.events)
    }

    pub fn resolve_investigation(
        &mut self,
        owner: OwnerId,
        now: GameInstant,
        ctx: &mut dyn InvestigationContext,
    ) -> Option<InvestigationOutcome> {
        self.escalation
            .resolve_investigation(owner, now, &mut self.ledger, ctx, &mut self.events)
    }

    /// Runs everything time-driven between the previous call and `now`:
    /// modifier expiry, memory decay, heat decay, then due investigations.
    /// One call across a long span lands where many short calls would.
    pub fn advance_to(&mut self, now: GameInstant, ctx: &mut dyn InvestigationContext) {
        if now <= self.last_advanced {
            return;
        }
        let elapsed_hours = now.hours_since(self.last_advanced);
        let queued = self.events.len();

        let expired = self.ledger.check_expired_modifiers(now, &mut self.events);
        let faded = self.memory.decay_all(elapsed_hours / 24.0, now);

        let owners: Vec<OwnerId> = self.escalation.states().map(|state| state.owner).collect();
        for owner in owners {
            self.escalation
                .decay_tick(owner, elapsed_hours, now, &mut self.ledger, &mut self.events);
        }
        for owner in self.escalation.due_for_resolution(now) {
            self.escalation
                .resolve_investigation(owner, now, &mut self.ledger, ctx, &mut self.events);
        }

        self.last_advanced = now;
        debug!(
            elapsed_hours,
            expired,
            faded,
            events = self.events.len() - queued,
            "consequences advanced"
        );
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            schema_version: EngineSnapshot::CURRENT_VERSION,
            saved_at: self.last_advanced,
            config: self.config.clone(),
            tracks: self.ledger.tracks().cloned().collect(),
            next_modifier_id: self.ledger.next_modifier_id(),
            memories: self.memory.all_entries().cloned().collect(),
            next_memory_id: self.memory.next_id(),
            patterns: self.patterns.records().cloned().collect(),
            escalation: self.escalation.states().cloned().collect(),
        }
    }

    /// Rebuilds an engine from a snapshot. Pending events are not part of a save.
    pub fn from_snapshot(snapshot: EngineSnapshot) -> Result<Self, EngineError> {
        snapshot.check_version()?;
        let mut engine = Self::new(snapshot.config)?.starting_at(snapshot.saved_at);
        engine
            .ledger
            .restore(snapshot.tracks, snapshot.next_modifier_id);
        engine
            .memory
            .restore(snapshot.memories, snapshot.next_memory_id);
        engine.patterns.restore(snapshot.patterns);
        engine.escalation.restore(snapshot.escalation);
        info!(saved_at = snapshot.saved_at.minutes(), "consequence engine restored");
        Ok(engine)
    }
}
