use bevy_ecs::prelude::*;

use crate::simulation::economy::FinanceState;
use crate::simulation::engine::ConsequenceEngine;
use crate::simulation::events::ConsequenceEventLog;
use crate::simulation::time::GameTime;

/// System: runs modifier expiry, decay and due investigations up to the current time.
pub fn consequence_tick_system(
    time: Res<GameTime>,
    mut engine: ResMut<ConsequenceEngine>,
    mut finances: ResMut<FinanceState>,
) {
    engine.advance_to(time.now(), &mut *finances);
}

/// System: moves this tick's queued events into the world log.
pub fn publish_events_system(
    mut engine: ResMut<ConsequenceEngine>,
    mut log: ResMut<ConsequenceEventLog>,
) {
    log.0.clear();
    log.0.extend(engine.drain_events());
}
