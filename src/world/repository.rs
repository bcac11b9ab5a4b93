use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::serialization::EngineSnapshot;
use crate::world::sqlite::EngineDb;

/// Storage seam for engine snapshots.
pub trait SnapshotRepository {
    fn load_or_init(&mut self, config: &EngineConfig) -> Result<EngineSnapshot, EngineError>;
    fn save_snapshot(&mut self, snapshot: &EngineSnapshot) -> Result<(), EngineError>;
}

impl SnapshotRepository for EngineDb {
    fn load_or_init(&mut self, config: &EngineConfig) -> Result<EngineSnapshot, EngineError> {
        EngineDb::load_or_init(self, config)
    }

    fn save_snapshot(&mut self, snapshot: &EngineSnapshot) -> Result<(), EngineError> {
        EngineDb::save_snapshot(self, snapshot)
    }
}
