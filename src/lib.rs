// Re-export core modules for use by the binary or other consumers
pub mod core;
pub mod simulation;
pub mod systems;
pub mod world;

// Expose the engine facade and the types needed to drive it
pub use crate::core::config::{load_engine_config, EngineConfig};
pub use crate::core::error::EngineError;
pub use crate::core::serialization::EngineSnapshot;
pub use crate::simulation::engine::ConsequenceEngine;
pub use crate::simulation::events::{ConsequenceEvent, ConsequenceEventLog};
pub use crate::simulation::time::{GameInstant, GameTime};
pub use crate::simulation::track::{OwnerId, TrackId, TrackKind};
