pub mod consequence;

pub use consequence::{consequence_tick_system, publish_events_system};
