use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::simulation::escalation::{EscalationPhase, InvestigationKind, InvestigationOutcome};
use crate::simulation::memory::MemoryEntry;
use crate::simulation::track::{OwnerId, TrackId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingDirection {
    Rising,
    Falling,
}

/// Outbound notifications. Queued during a call and drained once per tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConsequenceEvent {
    ValueChanged {
        owner: OwnerId,
        track: TrackId,
        old: f64,
        new: f64,
    },
    ThresholdCrossed {
        owner: OwnerId,
        track: TrackId,
        level: f64,
        direction: CrossingDirection,
    },
    MemoryAdded {
        owner: OwnerId,
        entry: MemoryEntry,
    },
    PatternDetected {
        owner: OwnerId,
        category: String,
        count: u32,
    },
    LevelChanged {
        owner: OwnerId,
        amount: f64,
        level: f64,
    },
    Cleared {
        owner: OwnerId,
    },
    PhaseChanged {
        owner: OwnerId,
        from: EscalationPhase,
        to: EscalationPhase,
    },
    InvestigationTriggered {
        owner: OwnerId,
        kind: InvestigationKind,
    },
    InvestigationResolved {
        owner: OwnerId,
        kind: InvestigationKind,
        outcome: InvestigationOutcome,
    },
}

/// Resource capturing the consequence events published this tick.
#[derive(Resource, Debug, Default, Clone)]
pub struct ConsequenceEventLog(pub Vec<ConsequenceEvent>);

impl ConsequenceEventLog {
    pub fn push(&mut self, event: ConsequenceEvent) {
        self.0.push(event);
    }

    pub fn drain(&mut self) -> Vec<ConsequenceEvent> {
        std::mem::take(&mut self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConsequenceEvent> {
        self.0.iter()
    }

    /// Levels crossed on `track`, in the order they fired.
    pub fn crossings_for(&self, owner: OwnerId, track: TrackId) -> Vec<f64> {
        self.0
            .iter()
            .filter_map(|event| match event {
                ConsequenceEvent::ThresholdCrossed {
                    owner: o,
                    track: t,
                    level,
                    ..
                } if *o == owner && *t == track => Some(*level),
                _ => None,
            })
            .collect()
    }
}
