pub mod repository;
pub mod sqlite;

pub use repository::SnapshotRepository;
pub use sqlite::EngineDb;
