use thiserror::Error;

/// Configuration and storage failures. Missing gameplay data is never an error;
/// the engine normalizes it instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown track kind {0:?}")]
    UnknownTrackKind(String),
    #[error("unknown memory tier {0:?}")]
    UnknownMemoryTier(String),
    #[error("unknown investigation kind {0:?}")]
    UnknownInvestigationKind(String),
    #[error("unknown escalation phase {0:?}")]
    UnknownPhase(String),
    #[error("no track profile configured for {0}")]
    MissingTrackProfile(String),
    #[error("invalid thresholds for {kind}: {reason}")]
    InvalidThresholds { kind: String, reason: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization failed: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid stored data: {0}")]
    InvalidData(String),
}
