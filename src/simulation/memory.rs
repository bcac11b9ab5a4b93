use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use bevy_utils::tracing::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::config::{MemoryTuning, MAX_MEMORABILITY, MAX_VALUE};
use crate::core::error::EngineError;
use crate::simulation::collaborators::ValueWeights;
use crate::simulation::events::{ConsequenceEvent, ConsequenceEventLog};
use crate::simulation::ledger::ScalarLedger;
use crate::simulation::patterns::PatternDetector;
use crate::simulation::time::GameInstant;
use crate::simulation::track::{OwnerId, TrackId};

/// Intensity at or below this counts as forgotten.
const FADED: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MemoryTier {
    Permanent,
    Standard,
    Volatile,
}

impl MemoryTier {
    pub fn as_str(self) -> &'static str {
        match self {
            MemoryTier::Permanent => "PERMANENT",
            MemoryTier::Standard => "STANDARD",
            MemoryTier::Volatile => "VOLATILE",
        }
    }
}

impl fmt::Display for MemoryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryTier {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PERMANENT" => Ok(MemoryTier::Permanent),
            "STANDARD" => Ok(MemoryTier::Standard),
            "VOLATILE" => Ok(MemoryTier::Volatile),
            _ => Err(EngineError::UnknownMemoryTier(value.to_string())),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct MemoryId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: MemoryId,
    pub owner: OwnerId,
    pub actor: OwnerId,
    pub category: String,
    pub tier: MemoryTier,
    pub initial_intensity: f64,
    pub current_intensity: f64,
    pub is_permanent: bool,
    pub timestamp: GameInstant,
    #[serde(default)]
    pub payload: Value,
}

/// Something an owner witnessed or suffered, reported by a gameplay system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedAction {
    pub actor: OwnerId,
    pub category: String,
    /// 0 (trivial) to 10 (unforgettable).
    pub memorability: u8,
    /// -1.0 hurts the relationship with `actor`, 1.0 helps it.
    pub valence: f64,
    pub timestamp: GameInstant,
    #[serde(default)]
    pub payload: Value,
}

impl ObservedAction {
    pub fn new(
        actor: OwnerId,
        category: &str,
        memorability: u8,
        valence: f64,
        timestamp: GameInstant,
    ) -> Self {
        Self {
            actor,
            category: category.to_string(),
            memorability,
            valence,
            timestamp,
            payload: Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MemoryStore {
    tuning: MemoryTuning,
    entries: BTreeMap<OwnerId, Vec<MemoryEntry>>,
    next_id: u64,
}

impl MemoryStore {
    pub fn new(tuning: MemoryTuning) -> Self {
        Self {
            tuning,
            entries: BTreeMap::new(),
            next_id: 0,
        }
    }

    pub fn tuning(&self) -> &MemoryTuning {
        &self.tuning
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.tuning.capacity = capacity;
    }

    /// Tier for an event, or `None` when it is not worth remembering.
    pub fn classify(&self, memorability: u8, significant: bool) -> Option<MemoryTier> {
        if memorability >= self.tuning.permanent_min_memorability {
            Some(MemoryTier::Permanent)
        } else if memorability >= self.tuning.standard_min_memorability {
            Some(MemoryTier::Standard)
        } else if significant {
            Some(MemoryTier::Volatile)
        } else {
            None
        }
    }

    /// Admits `action` into the owner's memory. Patterns must already include
    /// this occurrence; `ConsequenceEngine::observe` records it first.
    pub fn observe(
        &mut self,
        owner: OwnerId,
        action: &ObservedAction,
        patterns: &PatternDetector,
        weights: &dyn ValueWeights,
        ledger: &mut ScalarLedger,
        log: &mut ConsequenceEventLog,
    ) -> Option<MemoryEntry> {
        let memorability = action.memorability.min(MAX_MEMORABILITY);
        let significant = patterns.is_significant(owner, &action.category);
        let Some(tier) = self.classify(memorability, significant) else {
            debug!(%owner, category = %action.category, memorability, "event forgotten");
            return None;
        };

        let mut intensity = f64::from(memorability) * self.tuning.intensity_per_point;
        if tier == MemoryTier::Volatile {
            intensity += patterns.boost(owner, &action.category) * self.tuning.intensity_per_point;
        }
        let intensity = intensity.min(MAX_VALUE);

        self.next_id += 1;
        let entry = MemoryEntry {
            id: MemoryId(self.next_id),
            owner,
            actor: action.actor,
            category: action.category.clone(),
            tier,
            initial_intensity: intensity,
            current_intensity: intensity,
            is_permanent: tier == MemoryTier::Permanent,
            timestamp: action.timestamp,
            payload: action.payload.clone(),
        };
        self.entries.entry(owner).or_default().push(entry.clone());

        let evicted = self.enforce_capacity(owner);
        if evicted.iter().any(|gone| gone.id == entry.id) {
            debug!(%owner, category = %entry.category, "new memory displaced immediately");
            return None;
        }

        if action.actor != owner {
            let weight = weights.weight(owner, &action.category);
            let delta = action.valence.clamp(-1.0, 1.0)
                * f64::from(memorability)
                * weight
                * self.tuning.relationship_impact_per_point;
            if delta != 0.0 {
                ledger.modify_base(
                    owner,
                    TrackId::relationship(action.actor),
                    delta,
                    &action.category,
                    action.timestamp,
                    log,
                );
            }
        }

        debug!(%owner, category = %entry.category, tier = %entry.tier, intensity, "memory stored");
        log.push(ConsequenceEvent::MemoryAdded {
            owner,
            entry: entry.clone(),
        });
        Some(entry)
    }

    /// Evicts the weakest non-permanent memories until the owner is within capacity.
    fn enforce_capacity(&mut self, owner: OwnerId) -> Vec<MemoryEntry> {
        let capacity = self.tuning.capacity;
        let Some(entries) = self.entries.get_mut(&owner) else {
            return Vec::new();
        };
        let mut evicted = Vec::new();
        loop {
            let transient = entries.iter().filter(|entry| !entry.is_permanent).count();
            if transient <= capacity {
                break;
            }
            let weakest = entries
                .iter()
                .enumerate()
                .filter(|(_, entry)| !entry.is_permanent)
                .min_by(|(_, a), (_, b)| eviction_order(a, b))
                .map(|(index, _)| index);
            let Some(index) = weakest else {
                break;
            };
            let gone = entries.remove(index);
            debug!(%owner, category = %gone.category, intensity = gone.current_intensity, "memory evicted");
            evicted.push(gone);
        }
        evicted
    }

    /// Linear decay by tier. Entries that hit zero are removed in the same tick.
    pub fn decay_tick(&mut self, owner: OwnerId, elapsed_days: f64) -> usize {
        self.decay_owner(owner, elapsed_days, None)
    }

    /// Decays every owner over the window ending at `now`. An entry formed
    /// inside the window only decays from its own timestamp.
    pub fn decay_all(&mut self, elapsed_days: f64, now: GameInstant) -> usize {
        let owners: Vec<OwnerId> = self.entries.keys().copied().collect();
        owners
            .into_iter()
            .map(|owner| self.decay_owner(owner, elapsed_days, Some(now)))
            .sum()
    }

    fn decay_owner(&mut self, owner: OwnerId, elapsed_days: f64, now: Option<GameInstant>) -> usize {
        if elapsed_days <= 0.0 || !elapsed_days.is_finite() {
            return 0;
        }
        let tuning = &self.tuning;
        let Some(entries) = self.entries.get_mut(&owner) else {
            return 0;
        };
        for entry in entries.iter_mut() {
            let elapsed_days = now.map_or(elapsed_days, |now| {
                elapsed_days.min(now.days_since(entry.timestamp))
            });
            if elapsed_days <= 0.0 {
                continue;
            }
            let rate = match entry.tier {
                MemoryTier::Permanent => tuning.permanent_decay_per_day,
                MemoryTier::Standard => tuning.standard_decay_per_day,
                MemoryTier::Volatile => tuning.volatile_decay_per_day,
            };
            let decayed = entry.current_intensity - rate * elapsed_days;
            entry.current_intensity = if entry.is_permanent {
                decayed.max(entry.initial_intensity * tuning.permanent_floor)
            } else {
                decayed.max(0.0)
            };
        }
        let before = entries.len();
        entries.retain(|entry| entry.is_permanent || entry.current_intensity > FADED);
        let removed = before - entries.len();
        if removed > 0 {
            debug!(%owner, removed, "memories faded");
        }
        removed
    }

    /// Strongest memories first; equal intensity favours the more recent one.
    pub fn recall(&self, owner: OwnerId, count: usize) -> Vec<MemoryEntry> {
        self.ranked(owner, |_| true, count)
    }

    pub fn recall_about(&self, owner: OwnerId, actor: OwnerId, count: usize) -> Vec<MemoryEntry> {
        self.ranked(owner, |entry| entry.actor == actor, count)
    }

    fn ranked(
        &self,
        owner: OwnerId,
        keep: impl Fn(&MemoryEntry) -> bool,
        count: usize,
    ) -> Vec<MemoryEntry> {
        let mut ranked: Vec<MemoryEntry> = self
            .entries(owner)
            .iter()
            .filter(|entry| keep(entry))
            .cloned()
            .collect();
        ranked.sort_by(|a, b| {
            b.current_intensity
                .total_cmp(&a.current_intensity)
                .then(b.timestamp.cmp(&a.timestamp))
                .then(b.id.cmp(&a.id))
        });
        ranked.truncate(count);
        ranked
    }

    pub fn entries(&self, owner: OwnerId) -> &[MemoryEntry] {
        self.entries
            .get(&owner)
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    pub fn all_entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.entries.values().flatten()
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    pub fn restore(&mut self, entries: Vec<MemoryEntry>, next_id: u64) {
        self.entries.clear();
        let mut highest = 0;
        for entry in entries {
            highest = highest.max(entry.id.0);
            self.entries.entry(entry.owner).or_default().push(entry);
        }
        self.next_id = next_id.max(highest);
    }
}

fn eviction_order(a: &MemoryEntry, b: &MemoryEntry) -> Ordering {
    a.current_intensity
        .total_cmp(&b.current_intensity)
        .then(a.timestamp.cmp(&b.timestamp))
        .then(a.id.cmp(&b.id))
}
