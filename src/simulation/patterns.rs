use std::collections::BTreeMap;

use bevy_utils::tracing::debug;
use serde::{Deserialize, Serialize};

use crate::core::config::PatternTuning;
use crate::simulation::events::{ConsequenceEvent, ConsequenceEventLog};
use crate::simulation::time::GameInstant;
use crate::simulation::track::OwnerId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRecord {
    pub owner: OwnerId,
    pub category: String,
    pub count: u32,
    pub first_occurrence: GameInstant,
    pub last_occurrence: GameInstant,
    /// Extra memorability granted to repeats of this category.
    pub memorability: f64,
}

/// Frequency counters per (owner, category). A single slight is forgettable;
/// the same slight repeated is not.
#[derive(Debug, Clone)]
pub struct PatternDetector {
    tuning: PatternTuning,
    records: BTreeMap<(OwnerId, String), PatternRecord>,
}

impl PatternDetector {
    pub fn new(tuning: PatternTuning) -> Self {
        Self {
            tuning,
            records: BTreeMap::new(),
        }
    }

    pub fn record(
        &mut self,
        owner: OwnerId,
        category: &str,
        timestamp: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> PatternRecord {
        let record = self
            .records
            .entry((owner, category.to_string()))
            .or_insert_with(|| PatternRecord {
                owner,
                category: category.to_string(),
                count: 0,
                first_occurrence: timestamp,
                last_occurrence: timestamp,
                memorability: 0.0,
            });
        record.count = record.count.saturating_add(1);
        record.first_occurrence = record.first_occurrence.min(timestamp);
        record.last_occurrence = record.last_occurrence.max(timestamp);
        record.memorability = memorability_for(record.count, &self.tuning);

        if record.count == self.tuning.significant_count {
            debug!(%owner, category, count = record.count, "pattern became significant");
            log.push(ConsequenceEvent::PatternDetected {
                owner,
                category: category.to_string(),
                count: record.count,
            });
        }
        record.clone()
    }

    pub fn pattern(&self, owner: OwnerId, category: &str) -> Option<&PatternRecord> {
        self.records.get(&(owner, category.to_string()))
    }

    pub fn is_significant(&self, owner: OwnerId, category: &str) -> bool {
        self.pattern(owner, category)
            .map_or(false, |record| record.count >= self.tuning.significant_count)
    }

    pub fn boost(&self, owner: OwnerId, category: &str) -> f64 {
        self.pattern(owner, category)
            .map_or(0.0, |record| record.memorability)
    }

    pub fn significant_patterns(&self, owner: OwnerId) -> Vec<&PatternRecord> {
        self.records
            .values()
            .filter(|record| record.owner == owner)
            .filter(|record| record.count >= self.tuning.significant_count)
            .collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &PatternRecord> {
        self.records.values()
    }

    pub fn restore(&mut self, records: Vec<PatternRecord>) {
        self.records = records
            .into_iter()
            .map(|record| ((record.owner, record.category.clone()), record))
            .collect();
    }
}

/// Non-decreasing in `count`, saturating at `max_boost`.
pub fn memorability_for(count: u32, tuning: &PatternTuning) -> f64 {
    let repeats = count.saturating_sub(1) as f64;
    (repeats * tuning.boost_per_repeat).min(tuning.max_boost)
}
