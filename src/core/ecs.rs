use bevy_ecs::prelude::*;
use bevy_ecs::schedule::SystemSet;

use crate::simulation::economy::FinanceState;
use crate::simulation::engine::ConsequenceEngine;
use crate::simulation::events::ConsequenceEventLog;
use crate::simulation::time::{advance_time_system, GameTime};
use crate::systems::{consequence_tick_system, publish_events_system};

/// Canonical tick ordering for the simulation.
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum TickSet {
    /// Gameplay systems report actions to the engine here.
    Simulation,
    Time,
    Publish,
}

/// Build the ECS world around a constructed engine. The clock resumes at the
/// engine's last advance when that is later than the default start.
pub fn create_world(engine: ConsequenceEngine) -> World {
    let mut world = World::new();
    let mut time = GameTime::default();
    if engine.last_advanced() > time.now() {
        time.now = engine.last_advanced();
    }
    world.insert_resource(time);
    world.insert_resource(engine);
    world.insert_resource(ConsequenceEventLog::default());
    world.insert_resource(FinanceState::default());
    world
}

/// Build the system schedule in the canonical order.
pub fn create_schedule() -> Schedule {
    let mut schedule = Schedule::default();

    schedule.configure_sets((TickSet::Simulation, TickSet::Time, TickSet::Publish).chain());

    schedule.add_systems((
        (advance_time_system, consequence_tick_system)
            .chain()
            .in_set(TickSet::Time),
        publish_events_system.in_set(TickSet::Publish),
    ));

    schedule
}
