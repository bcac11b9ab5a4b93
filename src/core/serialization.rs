use std::fs;
use std::path::Path;

use bevy_utils::tracing::warn;
use serde::{Deserialize, Serialize};

use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::simulation::escalation::EscalationState;
use crate::simulation::ledger::ScalarTrack;
use crate::simulation::memory::MemoryEntry;
use crate::simulation::patterns::PatternRecord;
use crate::simulation::time::GameInstant;

/// Everything needed to rebuild a `ConsequenceEngine`. Queued events are not saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    #[serde(default = "default_snapshot_version")]
    pub schema_version: u32,
    pub saved_at: GameInstant,
    #[serde(default)]
    pub config: EngineConfig,
    #[serde(default)]
    pub tracks: Vec<ScalarTrack>,
    #[serde(default)]
    pub next_modifier_id: u64,
    #[serde(default)]
    pub memories: Vec<MemoryEntry>,
    #[serde(default)]
    pub next_memory_id: u64,
    #[serde(default)]
    pub patterns: Vec<PatternRecord>,
    #[serde(default)]
    pub escalation: Vec<EscalationState>,
}

fn default_snapshot_version() -> u32 {
    EngineSnapshot::CURRENT_VERSION
}

impl EngineSnapshot {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn empty(config: EngineConfig, saved_at: GameInstant) -> Self {
        Self {
            schema_version: Self::CURRENT_VERSION,
            saved_at,
            config,
            tracks: Vec::new(),
            next_modifier_id: 0,
            memories: Vec::new(),
            next_memory_id: 0,
            patterns: Vec::new(),
            escalation: Vec::new(),
        }
    }

    pub fn check_version(&self) -> Result<(), EngineError> {
        if self.schema_version == Self::CURRENT_VERSION {
            return Ok(());
        }
        warn!(
            found = self.schema_version,
            expected = Self::CURRENT_VERSION,
            "snapshot version rejected"
        );
        Err(EngineError::InvalidData(format!(
            "snapshot version {} (expected {})",
            self.schema_version,
            Self::CURRENT_VERSION
        )))
    }
}

pub fn snapshot_to_json(snapshot: &EngineSnapshot) -> Result<String, EngineError> {
    Ok(serde_json::to_string_pretty(snapshot)?)
}

pub fn snapshot_from_json(raw: &str) -> Result<EngineSnapshot, EngineError> {
    let snapshot: EngineSnapshot = serde_json::from_str(raw)?;
    snapshot.check_version()?;
    Ok(snapshot)
}

pub fn save_snapshot_to_path(
    snapshot: &EngineSnapshot,
    path: impl AsRef<Path>,
) -> Result<(), EngineError> {
    let path = path.as_ref();
    let raw = snapshot_to_json(snapshot)?;
    fs::write(path, raw).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })
}

pub fn load_snapshot_from_path(path: impl AsRef<Path>) -> Result<EngineSnapshot, EngineError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let snapshot: EngineSnapshot =
        serde_json::from_str(&raw).map_err(|source| EngineError::Json {
            path: path.display().to_string(),
            source,
        })?;
    snapshot.check_version()?;
    Ok(snapshot)
}
