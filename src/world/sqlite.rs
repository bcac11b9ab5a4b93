use std::collections::BTreeMap;
use std::path::Path;

use bevy_utils::tracing::{debug, warn};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::core::config::EngineConfig;
use crate::core::error::EngineError;
use crate::core::serialization::EngineSnapshot;
use crate::simulation::economy::Money;
use crate::simulation::escalation::{
    EscalationPhase, EscalationState, Investigation, InvestigationKind, InvestigationOutcome,
};
use crate::simulation::ledger::{HistoryRecord, Modifier, ModifierId, ScalarTrack};
use crate::simulation::memory::{MemoryEntry, MemoryId, MemoryTier};
use crate::simulation::patterns::PatternRecord;
use crate::simulation::time::GameInstant;
use crate::simulation::track::{OwnerId, TrackId, TrackKind};

const ENGINE_SCHEMA_VERSION: i64 = 1;

const ENGINE_DB_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS engine_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  schema_version INTEGER NOT NULL,
  save_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS engine_state (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  saved_at INTEGER NOT NULL,
  next_modifier_id INTEGER NOT NULL,
  next_memory_id INTEGER NOT NULL,
  config_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS tracks (
  owner_id INTEGER NOT NULL,
  kind TEXT NOT NULL,
  subject_id INTEGER NOT NULL,
  base_value REAL NOT NULL,
  PRIMARY KEY (owner_id, kind, subject_id)
);

CREATE TABLE IF NOT EXISTS track_modifiers (
  modifier_id INTEGER PRIMARY KEY,
  owner_id INTEGER NOT NULL,
  kind TEXT NOT NULL,
  subject_id INTEGER NOT NULL,
  delta REAL NOT NULL,
  applied_at INTEGER NOT NULL,
  expires_at INTEGER,
  source TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS track_history (
  owner_id INTEGER NOT NULL,
  kind TEXT NOT NULL,
  subject_id INTEGER NOT NULL,
  seq INTEGER NOT NULL,
  delta REAL NOT NULL,
  reason TEXT NOT NULL,
  recorded_at INTEGER NOT NULL,
  PRIMARY KEY (owner_id, kind, subject_id, seq)
);

CREATE TABLE IF NOT EXISTS memories (
  memory_id INTEGER PRIMARY KEY,
  owner_id INTEGER NOT NULL,
  actor_id INTEGER NOT NULL,
  category TEXT NOT NULL,
  tier TEXT NOT NULL,
  initial_intensity REAL NOT NULL,
  current_intensity REAL NOT NULL,
  is_permanent INTEGER NOT NULL,
  observed_at INTEGER NOT NULL,
  payload TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS patterns (
  owner_id INTEGER NOT NULL,
  category TEXT NOT NULL,
  count INTEGER NOT NULL,
  first_occurrence INTEGER NOT NULL,
  last_occurrence INTEGER NOT NULL,
  memorability REAL NOT NULL,
  PRIMARY KEY (owner_id, category)
);

CREATE TABLE IF NOT EXISTS escalation (
  owner_id INTEGER PRIMARY KEY,
  level REAL NOT NULL,
  last_increase_at INTEGER NOT NULL,
  last_decay_at INTEGER NOT NULL,
  phase TEXT NOT NULL,
  phase_detail TEXT,
  investigation_kind TEXT,
  investigation_started_at INTEGER,
  investigation_deadline INTEGER,
  frozen_cents INTEGER
);

CREATE TABLE IF NOT EXISTS heat_sources (
  owner_id INTEGER NOT NULL,
  source TEXT NOT NULL,
  amount REAL NOT NULL,
  PRIMARY KEY (owner_id, source)
);
"#;

/// Stored in `subject_id` for tracks that are not about another owner.
const NO_SUBJECT: i64 = -1;

fn subject_to_column(track: TrackId) -> i64 {
    track.subject.map_or(NO_SUBJECT, |subject| i64::from(subject.0))
}

fn track_from_columns(kind: &str, subject: i64) -> Result<TrackId, EngineError> {
    let kind: TrackKind = kind.parse()?;
    let subject = if subject == NO_SUBJECT {
        None
    } else {
        let id = u32::try_from(subject)
            .map_err(|_| EngineError::InvalidData(format!("bad subject id {}", subject)))?;
        Some(OwnerId(id))
    };
    Ok(TrackId { kind, subject })
}

fn owner_from_column(value: i64) -> Result<OwnerId, EngineError> {
    u32::try_from(value)
        .map(OwnerId)
        .map_err(|_| EngineError::InvalidData(format!("bad owner id {}", value)))
}

fn outcome_from_str(value: &str) -> Result<InvestigationOutcome, EngineError> {
    match value {
        "CLEARED" => Ok(InvestigationOutcome::Cleared),
        "PENALIZED" => Ok(InvestigationOutcome::Penalized),
        _ => Err(EngineError::InvalidData(format!(
            "unknown investigation outcome {}",
            value
        ))),
    }
}

fn phase_detail(phase: EscalationPhase) -> Option<&'static str> {
    match phase {
        EscalationPhase::UnderInvestigation(kind) => Some(kind.as_str()),
        EscalationPhase::Resolved(outcome) => Some(outcome.as_str()),
        _ => None,
    }
}

fn phase_from_columns(phase: &str, detail: Option<&str>) -> Result<EscalationPhase, EngineError> {
    let missing = || EngineError::InvalidData(format!("phase {} needs a detail column", phase));
    match phase {
        "DORMANT" => Ok(EscalationPhase::Dormant),
        "ELEVATED" => Ok(EscalationPhase::Elevated),
        "UNDER_SURVEILLANCE" => Ok(EscalationPhase::UnderSurveillance),
        "UNDER_INVESTIGATION" => {
            let kind: InvestigationKind = detail.ok_or_else(missing)?.parse()?;
            Ok(EscalationPhase::UnderInvestigation(kind))
        }
        "RESOLVED" => Ok(EscalationPhase::Resolved(outcome_from_str(
            detail.ok_or_else(missing)?,
        )?)),
        _ => Err(EngineError::UnknownPhase(phase.to_string())),
    }
}

fn instant(value: i64) -> GameInstant {
    GameInstant(value.max(0) as u64)
}

/// SQLite-backed snapshot store. Each save replaces the previous one.
pub struct EngineDb {
    conn: Connection,
}

impl EngineDb {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, EngineError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, EngineError> {
        let mut db = Self { conn };
        db.conn.execute_batch(ENGINE_DB_SCHEMA)?;
        db.ensure_engine_meta()?;
        Ok(db)
    }

    pub fn load_or_init(&mut self, config: &EngineConfig) -> Result<EngineSnapshot, EngineError> {
        if let Some(snapshot) = self.load_snapshot()? {
            Ok(snapshot)
        } else {
            let snapshot = EngineSnapshot::empty(config.clone(), GameInstant::default());
            self.save_snapshot(&snapshot)?;
            Ok(snapshot)
        }
    }

    pub fn load_snapshot(&self) -> Result<Option<EngineSnapshot>, EngineError> {
        let state = self
            .conn
            .query_row(
                "SELECT saved_at, next_modifier_id, next_memory_id, config_json FROM engine_state WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let Some((saved_at, next_modifier_id, next_memory_id, config_json)) = state else {
            return Ok(None);
        };
        let config: EngineConfig = serde_json::from_str(&config_json)?;

        Ok(Some(EngineSnapshot {
            schema_version: EngineSnapshot::CURRENT_VERSION,
            saved_at: instant(saved_at),
            config,
            tracks: self.load_tracks()?,
            next_modifier_id: next_modifier_id.max(0) as u64,
            memories: self.load_memories()?,
            next_memory_id: next_memory_id.max(0) as u64,
            patterns: self.load_patterns()?,
            escalation: self.load_escalation()?,
        }))
    }

    pub fn save_snapshot(&mut self, snapshot: &EngineSnapshot) -> Result<(), EngineError> {
        snapshot.check_version()?;
        let tx = self.conn.transaction()?;

        tx.execute("DELETE FROM engine_state", [])?;
        tx.execute(
            "INSERT INTO engine_state (id, saved_at, next_modifier_id, next_memory_id, config_json) VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                snapshot.saved_at.minutes() as i64,
                snapshot.next_modifier_id as i64,
                snapshot.next_memory_id as i64,
                serde_json::to_string(&snapshot.config)?,
            ],
        )?;

        save_tracks(&tx, &snapshot.tracks)?;
        save_memories(&tx, &snapshot.memories)?;
        save_patterns(&tx, &snapshot.patterns)?;
        save_escalation(&tx, &snapshot.escalation)?;

        tx.commit()?;
        debug!(
            saved_at = snapshot.saved_at.minutes(),
            tracks = snapshot.tracks.len(),
            memories = snapshot.memories.len(),
            "engine snapshot saved"
        );
        Ok(())
    }

    fn ensure_engine_meta(&mut self) -> Result<(), EngineError> {
        let meta = self
            .conn
            .query_row(
                "SELECT schema_version, save_version FROM engine_meta WHERE id = 1",
                [],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        let save_version = i64::from(EngineSnapshot::CURRENT_VERSION);
        match meta {
            Some((schema, save)) if schema == ENGINE_SCHEMA_VERSION && save == save_version => {}
            Some((schema, save)) => {
                warn!(schema, save, "engine database version rejected");
                return Err(EngineError::InvalidData(format!(
                    "engine_meta version mismatch (schema {}, save {}, expected {}, {})",
                    schema, save, ENGINE_SCHEMA_VERSION, save_version
                )));
            }
            None => {
                self.conn.execute(
                    "INSERT INTO engine_meta (id, schema_version, save_version) VALUES (1, ?1, ?2)",
                    params![ENGINE_SCHEMA_VERSION, save_version],
                )?;
            }
        }
        Ok(())
    }

    fn load_tracks(&self) -> Result<Vec<ScalarTrack>, EngineError> {
        let mut tracks: BTreeMap<(OwnerId, TrackId), ScalarTrack> = BTreeMap::new();

        let mut stmt = self
            .conn
            .prepare("SELECT owner_id, kind, subject_id, base_value FROM tracks")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?;
        for row in rows {
            let (owner, kind, subject, base_value) = row?;
            let owner = owner_from_column(owner)?;
            let track = track_from_columns(&kind, subject)?;
            tracks.insert((owner, track), ScalarTrack::new(owner, track, base_value));
        }

        let mut stmt = self.conn.prepare(
            "SELECT modifier_id, owner_id, kind, subject_id, delta, applied_at, expires_at, source FROM track_modifiers ORDER BY modifier_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, i64>(5)?,
                row.get::<_, Option<i64>>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;
        for row in rows {
            let (id, owner, kind, subject, delta, applied_at, expires_at, source) = row?;
            let key = (owner_from_column(owner)?, track_from_columns(&kind, subject)?);
            let track = tracks.get_mut(&key).ok_or_else(|| {
                EngineError::InvalidData(format!("modifier {} has no track", id))
            })?;
            track.modifiers.push(Modifier {
                id: ModifierId(id.max(0) as u64),
                delta,
                applied_at: instant(applied_at),
                expires_at: expires_at.map(instant),
                source,
            });
        }

        let mut stmt = self.conn.prepare(
            "SELECT owner_id, kind, subject_id, delta, reason, recorded_at FROM track_history ORDER BY owner_id, kind, subject_id, seq",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, f64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;
        for row in rows {
            let (owner, kind, subject, delta, reason, recorded_at) = row?;
            let key = (owner_from_column(owner)?, track_from_columns(&kind, subject)?);
            if let Some(track) = tracks.get_mut(&key) {
                track.history.push(HistoryRecord {
                    delta,
                    reason,
                    timestamp: instant(recorded_at),
                });
            }
        }

        Ok(tracks.into_values().collect())
    }

    fn load_memories(&self) -> Result<Vec<MemoryEntry>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT memory_id, owner_id, actor_id, category, tier, initial_intensity, current_intensity, is_permanent, observed_at, payload FROM memories ORDER BY memory_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, f64>(6)?,
                row.get::<_, i64>(7)?,
                row.get::<_, i64>(8)?,
                row.get::<_, String>(9)?,
            ))
        })?;

        let mut memories = Vec::new();
        for row in rows {
            let (id, owner, actor, category, tier, initial, current, permanent, observed_at, payload) =
                row?;
            let tier: MemoryTier = tier.parse()?;
            memories.push(MemoryEntry {
                id: MemoryId(id.max(0) as u64),
                owner: owner_from_column(owner)?,
                actor: owner_from_column(actor)?,
                category,
                tier,
                initial_intensity: initial,
                current_intensity: current,
                is_permanent: permanent != 0,
                timestamp: instant(observed_at),
                payload: serde_json::from_str(&payload)?,
            });
        }
        Ok(memories)
    }

    fn load_patterns(&self) -> Result<Vec<PatternRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT owner_id, category, count, first_occurrence, last_occurrence, memorability FROM patterns ORDER BY owner_id, category",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, f64>(5)?,
            ))
        })?;

        let mut patterns = Vec::new();
        for row in rows {
            let (owner, category, count, first, last, memorability) = row?;
            patterns.push(PatternRecord {
                owner: owner_from_column(owner)?,
                category,
                count: u32::try_from(count).unwrap_or(u32::MAX),
                first_occurrence: instant(first),
                last_occurrence: instant(last),
                memorability,
            });
        }
        Ok(patterns)
    }

    fn load_escalation(&self) -> Result<Vec<EscalationState>, EngineError> {
        let mut sources: BTreeMap<OwnerId, BTreeMap<String, f64>> = BTreeMap::new();
        let mut stmt = self
            .conn
            .prepare("SELECT owner_id, source, amount FROM heat_sources")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, f64>(2)?,
            ))
        })?;
        for row in rows {
            let (owner, source, amount) = row?;
            sources
                .entry(owner_from_column(owner)?)
                .or_default()
                .insert(source, amount);
        }

        let mut stmt = self.conn.prepare(
            "SELECT owner_id, level, last_increase_at, last_decay_at, phase, phase_detail, investigation_kind, investigation_started_at, investigation_deadline, frozen_cents FROM escalation ORDER BY owner_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<i64>>(7)?,
                row.get::<_, Option<i64>>(8)?,
                row.get::<_, Option<i64>>(9)?,
            ))
        })?;

        let mut states = Vec::new();
        for row in rows {
            let (
                owner,
                level,
                last_increase_at,
                last_decay_at,
                phase,
                detail,
                kind,
                started_at,
                deadline,
                frozen_cents,
            ) = row?;
            let owner = owner_from_column(owner)?;
            let investigation = match kind {
                Some(kind) => Some(Investigation {
                    kind: kind.parse()?,
                    started_at: instant(started_at.unwrap_or_default()),
                    resolution_deadline: instant(deadline.unwrap_or_default()),
                    frozen: Money::from_cents(frozen_cents.unwrap_or_default()),
                }),
                None => None,
            };
            states.push(EscalationState {
                owner,
                level,
                last_increase_at: instant(last_increase_at),
                last_decay_at: instant(last_decay_at),
                source_breakdown: sources.remove(&owner).unwrap_or_default(),
                phase: phase_from_columns(&phase, detail.as_deref())?,
                investigation,
            });
        }
        Ok(states)
    }
}

fn save_tracks(tx: &Transaction<'_>, tracks: &[ScalarTrack]) -> Result<(), EngineError> {
    tx.execute("DELETE FROM tracks", [])?;
    tx.execute("DELETE FROM track_modifiers", [])?;
    tx.execute("DELETE FROM track_history", [])?;
    for track in tracks {
        let owner = i64::from(track.owner.0);
        let kind = track.track.kind.as_str();
        let subject = subject_to_column(track.track);
        tx.execute(
            "INSERT INTO tracks (owner_id, kind, subject_id, base_value) VALUES (?1, ?2, ?3, ?4)",
            params![owner, kind, subject, track.base_value],
        )?;
        for modifier in &track.modifiers {
            tx.execute(
                "INSERT INTO track_modifiers (modifier_id, owner_id, kind, subject_id, delta, applied_at, expires_at, source) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    modifier.id.0 as i64,
                    owner,
                    kind,
                    subject,
                    modifier.delta,
                    modifier.applied_at.minutes() as i64,
                    modifier.expires_at.map(|at| at.minutes() as i64),
                    modifier.source.as_str(),
                ],
            )?;
        }
        for (seq, record) in track.history.iter().enumerate() {
            tx.execute(
                "INSERT INTO track_history (owner_id, kind, subject_id, seq, delta, reason, recorded_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    owner,
                    kind,
                    subject,
                    seq as i64,
                    record.delta,
                    record.reason.as_str(),
                    record.timestamp.minutes() as i64,
                ],
            )?;
        }
    }
    Ok(())
}

fn save_memories(tx: &Transaction<'_>, memories: &[MemoryEntry]) -> Result<(), EngineError> {
    tx.execute("DELETE FROM memories", [])?;
    for entry in memories {
        tx.execute(
            "INSERT INTO memories (memory_id, owner_id, actor_id, category, tier, initial_intensity, current_intensity, is_permanent, observed_at, payload) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.0 as i64,
                i64::from(entry.owner.0),
                i64::from(entry.actor.0),
                entry.category.as_str(),
                entry.tier.as_str(),
                entry.initial_intensity,
                entry.current_intensity,
                if entry.is_permanent { 1 } else { 0 },
                entry.timestamp.minutes() as i64,
                serde_json::to_string(&entry.payload)?,
            ],
        )?;
    }
    Ok(())
}

fn save_patterns(tx: &Transaction<'_>, patterns: &[PatternRecord]) -> Result<(), EngineError> {
    tx.execute("DELETE FROM patterns", [])?;
    for record in patterns {
        tx.execute(
            "INSERT INTO patterns (owner_id, category, count, first_occurrence, last_occurrence, memorability) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                i64::from(record.owner.0),
                record.category.as_str(),
                i64::from(record.count),
                record.first_occurrence.minutes() as i64,
                record.last_occurrence.minutes() as i64,
                record.memorability,
            ],
        )?;
    }
    Ok(())
}

fn save_escalation(tx: &Transaction<'_>, states: &[EscalationState]) -> Result<(), EngineError> {
    tx.execute("DELETE FROM escalation", [])?;
    tx.execute("DELETE FROM heat_sources", [])?;
    for state in states {
        let owner = i64::from(state.owner.0);
        let investigation = state.investigation.as_ref();
        tx.execute(
            "INSERT INTO escalation (owner_id, level, last_increase_at, last_decay_at, phase, phase_detail, investigation_kind, investigation_started_at, investigation_deadline, frozen_cents) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                owner,
                state.level,
                state.last_increase_at.minutes() as i64,
                state.last_decay_at.minutes() as i64,
                state.phase.as_str(),
                phase_detail(state.phase),
                investigation.map(|open| open.kind.as_str()),
                investigation.map(|open| open.started_at.minutes() as i64),
                investigation.map(|open| open.resolution_deadline.minutes() as i64),
                investigation.map(|open| open.frozen.cents()),
            ],
        )?;
        for (source, amount) in &state.source_breakdown {
            tx.execute(
                "INSERT INTO heat_sources (owner_id, source, amount) VALUES (?1, ?2, ?3)",
                params![owner, source.as_str(), amount],
            )?;
        }
    }
    Ok(())
}
