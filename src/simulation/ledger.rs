use std::collections::BTreeMap;

use bevy_utils::tracing::debug;
use serde::{Deserialize, Serialize};

use crate::core::config::{EngineConfig, TrackProfile, MAX_VALUE, MIN_VALUE};
use crate::core::error::EngineError;
use crate::simulation::events::{ConsequenceEvent, ConsequenceEventLog, CrossingDirection};
use crate::simulation::time::GameInstant;
use crate::simulation::track::{Comparison, OwnerId, TrackId, TrackKind};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct ModifierId(pub u64);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Modifier {
    pub id: ModifierId,
    pub delta: f64,
    pub applied_at: GameInstant,
    /// `None` never expires.
    pub expires_at: Option<GameInstant>,
    pub source: String,
}

impl Modifier {
    pub fn is_active_at(&self, now: GameInstant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub delta: f64,
    pub reason: String,
    pub timestamp: GameInstant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarTrack {
    pub owner: OwnerId,
    pub track: TrackId,
    pub base_value: f64,
    #[serde(default)]
    pub modifiers: Vec<Modifier>,
    #[serde(default)]
    pub history: Vec<HistoryRecord>,
}

impl ScalarTrack {
    pub fn new(owner: OwnerId, track: TrackId, base_value: f64) -> Self {
        Self {
            owner,
            track,
            base_value,
            modifiers: Vec::new(),
            history: Vec::new(),
        }
    }

    fn active_delta(&self, now: GameInstant) -> f64 {
        self.modifiers
            .iter()
            .filter(|modifier| modifier.is_active_at(now))
            .map(|modifier| modifier.delta)
            .sum()
    }

    pub fn effective_at(&self, now: GameInstant) -> f64 {
        clamp_value(self.base_value + self.active_delta(now))
    }

    /// Value as last reported: expired modifiers still count until swept.
    fn reported_value(&self) -> f64 {
        let delta: f64 = self.modifiers.iter().map(|modifier| modifier.delta).sum();
        clamp_value(self.base_value + delta)
    }

    /// Drops expired modifiers in expiry order, returning each `(old, new)` step.
    fn expire_modifiers(&mut self, now: GameInstant) -> Vec<(f64, f64)> {
        let mut expired: Vec<(GameInstant, ModifierId)> = self
            .modifiers
            .iter()
            .filter(|modifier| !modifier.is_active_at(now))
            .filter_map(|modifier| modifier.expires_at.map(|at| (at, modifier.id)))
            .collect();
        expired.sort();
        expired
            .into_iter()
            .map(|(_, id)| {
                let old = self.reported_value();
                self.modifiers.retain(|modifier| modifier.id != id);
                (old, self.reported_value())
            })
            .collect()
    }
}

/// Before/after pair of one mutation plus the snapshot of levels it crossed.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueChange {
    pub old: f64,
    pub new: f64,
    pub crossings: Vec<(f64, CrossingDirection)>,
}

impl ValueChange {
    pub fn applied(&self) -> f64 {
        self.new - self.old
    }

    pub fn rising_levels(&self) -> impl Iterator<Item = f64> + '_ {
        self.crossings
            .iter()
            .filter(|(_, direction)| *direction == CrossingDirection::Rising)
            .map(|(level, _)| *level)
    }

    pub fn falling_levels(&self) -> impl Iterator<Item = f64> + '_ {
        self.crossings
            .iter()
            .filter(|(_, direction)| *direction == CrossingDirection::Falling)
            .map(|(level, _)| *level)
    }
}

#[derive(Debug, Clone)]
pub struct ScalarLedger {
    profiles: Vec<TrackProfile>,
    tracks: BTreeMap<(OwnerId, TrackId), ScalarTrack>,
    next_modifier_id: u64,
    history_limit: usize,
}

impl ScalarLedger {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let mut profiles = Vec::with_capacity(TrackKind::ALL.len());
        for kind in TrackKind::ALL {
            let profile = config
                .track_profile(kind)
                .ok_or_else(|| EngineError::MissingTrackProfile(kind.to_string()))?;
            profiles.push(profile.clone());
        }
        Ok(Self {
            profiles,
            tracks: BTreeMap::new(),
            next_modifier_id: 0,
            history_limit: config.memory.history_limit,
        })
    }

    pub fn profile(&self, kind: TrackKind) -> &TrackProfile {
        &self.profiles[kind.index()]
    }

    pub fn track(&self, owner: OwnerId, track: TrackId) -> Option<&ScalarTrack> {
        self.tracks.get(&(owner, track))
    }

    pub fn tracks(&self) -> impl Iterator<Item = &ScalarTrack> {
        self.tracks.values()
    }

    pub fn next_modifier_id(&self) -> u64 {
        self.next_modifier_id
    }

    pub fn restore(&mut self, tracks: Vec<ScalarTrack>, next_modifier_id: u64) {
        self.tracks = tracks
            .into_iter()
            .map(|track| ((track.owner, track.track), track))
            .collect();
        let highest = self
            .tracks
            .values()
            .flat_map(|track| track.modifiers.iter().map(|modifier| modifier.id.0))
            .max()
            .unwrap_or(0);
        self.next_modifier_id = next_modifier_id.max(highest);
    }

    fn track_mut(&mut self, owner: OwnerId, track: TrackId) -> &mut ScalarTrack {
        let default_value = self.profile(track.kind).default_value;
        self.tracks
            .entry((owner, track))
            .or_insert_with(|| ScalarTrack::new(owner, track, default_value))
    }

    /// Effective value, creating the track with its default on first access.
    pub fn value(&mut self, owner: OwnerId, track: TrackId, now: GameInstant) -> f64 {
        self.track_mut(owner, track).effective_at(now)
    }

    /// Effective value without creating anything.
    pub fn peek(&self, owner: OwnerId, track: TrackId, now: GameInstant) -> f64 {
        match self.tracks.get(&(owner, track)) {
            Some(state) => state.effective_at(now),
            None => self.profile(track.kind).default_value,
        }
    }

    pub fn base_value(&self, owner: OwnerId, track: TrackId) -> f64 {
        self.tracks
            .get(&(owner, track))
            .map(|state| state.base_value)
            .unwrap_or_else(|| self.profile(track.kind).default_value)
    }

    pub fn history(&self, owner: OwnerId, track: TrackId) -> &[HistoryRecord] {
        self.tracks
            .get(&(owner, track))
            .map(|state| state.history.as_slice())
            .unwrap_or(&[])
    }

    pub fn modifiers(&self, owner: OwnerId, track: TrackId) -> &[Modifier] {
        self.tracks
            .get(&(owner, track))
            .map(|state| state.modifiers.as_slice())
            .unwrap_or(&[])
    }

    pub fn modify_base(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        delta: f64,
        reason: &str,
        now: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> f64 {
        self.apply_base_delta(owner, track, delta, reason, now, log).new
    }

    /// Shifts the base so the effective value moves by `delta`, clamped.
    pub fn apply_base_delta(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        delta: f64,
        reason: &str,
        now: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> ValueChange {
        let delta = sanitize(delta);
        let history_limit = self.history_limit;
        self.expire_track(owner, track, now, log);
        let state = self.track_mut(owner, track);
        let old = state.effective_at(now);
        let target = clamp_value(old + delta);
        state.base_value = target - state.active_delta(now);
        state.history.push(HistoryRecord {
            delta,
            reason: reason.to_string(),
            timestamp: now,
        });
        if state.history.len() > history_limit {
            let overflow = state.history.len() - history_limit;
            state.history.drain(..overflow);
        }
        let new = state.effective_at(now);
        self.finish_change(owner, track, old, new, log)
    }

    /// `duration_hours == 0` makes the modifier permanent.
    #[allow(clippy::too_many_arguments)]
    pub fn add_modifier(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        delta: f64,
        duration_hours: u32,
        source: &str,
        now: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> ModifierId {
        self.next_modifier_id += 1;
        let id = ModifierId(self.next_modifier_id);
        let expires_at = if duration_hours == 0 {
            None
        } else {
            Some(now.plus_hours(u64::from(duration_hours)))
        };

        self.expire_track(owner, track, now, log);
        let state = self.track_mut(owner, track);
        let old = state.effective_at(now);
        state.modifiers.push(Modifier {
            id,
            delta: sanitize(delta).clamp(-MAX_VALUE, MAX_VALUE),
            applied_at: now,
            expires_at,
            source: source.to_string(),
        });
        let new = state.effective_at(now);
        self.finish_change(owner, track, old, new, log);
        id
    }

    /// Returns `false` for unknown, removed or already expired modifiers.
    pub fn remove_modifier(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        id: ModifierId,
        now: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> bool {
        self.expire_track(owner, track, now, log);
        let Some(state) = self.tracks.get_mut(&(owner, track)) else {
            return false;
        };
        let Some(index) = state
            .modifiers
            .iter()
            .position(|modifier| modifier.id == id && modifier.is_active_at(now))
        else {
            return false;
        };
        let old = state.effective_at(now);
        state.modifiers.remove(index);
        let new = state.effective_at(now);
        self.finish_change(owner, track, old, new, log);
        true
    }

    /// Drops every modifier with `expires_at <= now`. Returns how many were removed.
    pub fn check_expired_modifiers(
        &mut self,
        now: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> usize {
        let keys: Vec<(OwnerId, TrackId)> = self.tracks.keys().copied().collect();
        keys.into_iter()
            .map(|(owner, track)| self.expire_track(owner, track, now, log))
            .sum()
    }

    /// Reports modifiers on one track that lapsed since the last sweep, so the
    /// next change starts from the value listeners last saw.
    fn expire_track(
        &mut self,
        owner: OwnerId,
        track: TrackId,
        now: GameInstant,
        log: &mut ConsequenceEventLog,
    ) -> usize {
        let Some(state) = self.tracks.get_mut(&(owner, track)) else {
            return 0;
        };
        let steps = state.expire_modifiers(now);
        for &(old, new) in &steps {
            self.finish_change(owner, track, old, new, log);
        }
        steps.len()
    }

    pub fn check_threshold(
        &self,
        owner: OwnerId,
        track: TrackId,
        level: f64,
        comparison: Comparison,
        now: GameInstant,
    ) -> bool {
        comparison.holds(self.peek(owner, track, now), level)
    }

    fn finish_change(
        &self,
        owner: OwnerId,
        track: TrackId,
        old: f64,
        new: f64,
        log: &mut ConsequenceEventLog,
    ) -> ValueChange {
        let crossings = crossed_levels(&self.profile(track.kind).thresholds, old, new);
        if old != new {
            log.push(ConsequenceEvent::ValueChanged {
                owner,
                track,
                old,
                new,
            });
        }
        for &(level, direction) in &crossings {
            debug!(%owner, %track, level, ?direction, "threshold crossed");
            log.push(ConsequenceEvent::ThresholdCrossed {
                owner,
                track,
                level,
                direction,
            });
        }
        ValueChange {
            old,
            new,
            crossings,
        }
    }
}

/// Levels crossed moving from `old` to `new`, in the order of travel.
/// A level splits values into `< level` and `>= level`.
pub fn crossed_levels(thresholds: &[f64], old: f64, new: f64) -> Vec<(f64, CrossingDirection)> {
    if new > old {
        thresholds
            .iter()
            .copied()
            .filter(|level| old < *level && *level <= new)
            .map(|level| (level, CrossingDirection::Rising))
            .collect()
    } else if new < old {
        thresholds
            .iter()
            .rev()
            .copied()
            .filter(|level| new < *level && *level <= old)
            .map(|level| (level, CrossingDirection::Falling))
            .collect()
    } else {
        Vec::new()
    }
}

pub fn clamp_value(value: f64) -> f64 {
    if value.is_nan() {
        return MIN_VALUE;
    }
    value.clamp(MIN_VALUE, MAX_VALUE)
}

fn sanitize(delta: f64) -> f64 {
    if delta.is_nan() {
        0.0
    } else {
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: OwnerId = OwnerId(7);

    fn ledger() -> ScalarLedger {
        ScalarLedger::new(&EngineConfig::default()).expect("default config")
    }

    #[test]
    fn tracks_start_at_documented_defaults() {
        let mut ledger = ledger();
        let now = GameInstant(0);
        assert_eq!(ledger.value(OWNER, TrackId::LEGAL_STANDING, now), 80.0);
        assert_eq!(ledger.value(OWNER, TrackId::CRIMINAL_STANDING, now), 0.0);
        assert_eq!(ledger.value(OWNER, TrackId::PROFESSIONAL, now), 50.0);
        assert_eq!(ledger.value(OWNER, TrackId::SOCIAL, now), 50.0);
        assert_eq!(
            ledger.value(OWNER, TrackId::relationship(OwnerId(3)), now),
            50.0
        );
        assert_eq!(ledger.tracks().count(), 5);
    }

    #[test]
    fn large_drop_fires_every_level_once_descending() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);

        let value = ledger.modify_base(OWNER, TrackId::LEGAL_STANDING, -80.0, "arrested", now, &mut log);

        assert_eq!(value, 0.0);
        assert_eq!(
            log.crossings_for(OWNER, TrackId::LEGAL_STANDING),
            vec![70.0, 50.0, 30.0]
        );
        let changes = log
            .iter()
            .filter(|event| matches!(event, ConsequenceEvent::ValueChanged { .. }))
            .count();
        assert_eq!(changes, 1);
        assert_eq!(ledger.history(OWNER, TrackId::LEGAL_STANDING).len(), 1);
    }

    #[test]
    fn rising_crossings_are_ascending_and_not_repeated() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);

        ledger.modify_base(OWNER, TrackId::SOCIAL, 25.0, "party", now, &mut log);
        assert_eq!(log.crossings_for(OWNER, TrackId::SOCIAL), vec![70.0]);

        log.drain();
        ledger.modify_base(OWNER, TrackId::SOCIAL, 1.0, "party", now, &mut log);
        assert!(log.crossings_for(OWNER, TrackId::SOCIAL).is_empty());

        ledger.modify_base(OWNER, TrackId::SOCIAL, -100.0, "scandal", now, &mut log);
        assert_eq!(
            log.crossings_for(OWNER, TrackId::SOCIAL),
            vec![70.0, 50.0, 30.0, 20.0]
        );
    }

    #[test]
    fn landing_on_a_level_counts_once() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);

        ledger.modify_base(OWNER, TrackId::PROFESSIONAL, 20.0, "promotion", now, &mut log);
        ledger.modify_base(OWNER, TrackId::PROFESSIONAL, 5.0, "bonus", now, &mut log);
        ledger.modify_base(OWNER, TrackId::PROFESSIONAL, -5.0, "late", now, &mut log);
        ledger.modify_base(OWNER, TrackId::PROFESSIONAL, -1.0, "late", now, &mut log);

        assert_eq!(log.crossings_for(OWNER, TrackId::PROFESSIONAL), vec![70.0, 70.0]);
        let directions: Vec<CrossingDirection> = log
            .iter()
            .filter_map(|event| match event {
                ConsequenceEvent::ThresholdCrossed { direction, .. } => Some(*direction),
                _ => None,
            })
            .collect();
        assert_eq!(
            directions,
            vec![CrossingDirection::Rising, CrossingDirection::Falling]
        );
    }

    #[test]
    fn clamped_change_adjusts_base_to_match() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);

        ledger.add_modifier(OWNER, TrackId::SOCIAL, -20.0, 0, "hangover", now, &mut log);
        let value = ledger.modify_base(OWNER, TrackId::SOCIAL, 500.0, "fame", now, &mut log);
        assert_eq!(value, 100.0);
        assert_eq!(ledger.base_value(OWNER, TrackId::SOCIAL), 120.0);

        let value = ledger.modify_base(OWNER, TrackId::SOCIAL, f64::NAN, "glitch", now, &mut log);
        assert_eq!(value, 100.0);
    }

    #[test]
    fn permanent_modifier_never_expires() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let start = GameInstant(0);

        ledger.add_modifier(OWNER, TrackId::SOCIAL, 10.0, 0, "tattoo", start, &mut log);
        let later = start.plus_days(10_000);
        assert_eq!(ledger.check_expired_modifiers(later, &mut log), 0);
        assert_eq!(ledger.value(OWNER, TrackId::SOCIAL, later), 60.0);
    }

    #[test]
    fn removing_a_modifier_restores_previous_value() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);
        ledger.modify_base(OWNER, TrackId::SOCIAL, 13.5, "gift", now, &mut log);
        let before = ledger.value(OWNER, TrackId::SOCIAL, now);

        let id = ledger.add_modifier(OWNER, TrackId::SOCIAL, -42.0, 12, "drunk", now, &mut log);
        assert_eq!(ledger.value(OWNER, TrackId::SOCIAL, now), before - 42.0);

        log.drain();
        assert!(ledger.remove_modifier(OWNER, TrackId::SOCIAL, id, now, &mut log));
        assert_eq!(ledger.value(OWNER, TrackId::SOCIAL, now), before);
        assert_eq!(log.crossings_for(OWNER, TrackId::SOCIAL), vec![30.0, 50.0]);
        assert!(log.iter().all(|event| match event {
            ConsequenceEvent::ThresholdCrossed { direction, .. } => {
                *direction == CrossingDirection::Rising
            }
            _ => true,
        }));
        assert!(log.iter().any(|event| matches!(
            event,
            ConsequenceEvent::ValueChanged { old, new, .. } if *old == before - 42.0 && *new == before
        )));

        log.drain();
        assert!(!ledger.remove_modifier(OWNER, TrackId::SOCIAL, id, now, &mut log));
        assert!(log.is_empty());
        assert!(!ledger.remove_modifier(OwnerId(99), TrackId::HEAT, ModifierId(1), now, &mut log));
    }

    #[test]
    fn expiry_sweep_fires_crossings_and_is_idempotent() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);

        ledger.add_modifier(OWNER, TrackId::SOCIAL, 25.0, 4, "new outfit", now, &mut log);
        assert_eq!(log.crossings_for(OWNER, TrackId::SOCIAL), vec![70.0]);
        log.drain();

        let still_on = now.plus_hours(3);
        assert_eq!(ledger.check_expired_modifiers(still_on, &mut log), 0);
        assert!(log.is_empty());

        let expired = now.plus_hours(4);
        assert_eq!(ledger.value(OWNER, TrackId::SOCIAL, expired), 50.0);
        assert_eq!(ledger.check_expired_modifiers(expired, &mut log), 1);
        assert_eq!(log.crossings_for(OWNER, TrackId::SOCIAL), vec![70.0]);
        assert!(log.iter().any(|event| matches!(
            event,
            ConsequenceEvent::ValueChanged { old, new, .. } if *old == 75.0 && *new == 50.0
        )));

        log.drain();
        assert_eq!(ledger.check_expired_modifiers(expired, &mut log), 0);
        assert!(log.is_empty());
    }

    #[test]
    fn lapsed_modifier_is_reported_before_the_next_change() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let start = GameInstant(0);
        ledger.add_modifier(OWNER, TrackId::SOCIAL, 25.0, 4, "new outfit", start, &mut log);
        log.drain();

        let later = start.plus_hours(5);
        let change = ledger.apply_base_delta(OWNER, TrackId::SOCIAL, 25.0, "promotion", later, &mut log);
        assert_eq!((change.old, change.new), (50.0, 75.0));
        assert_eq!(ledger.check_expired_modifiers(later, &mut log), 0);

        let crossings: Vec<(f64, CrossingDirection)> = log
            .iter()
            .filter_map(|event| match event {
                ConsequenceEvent::ThresholdCrossed { level, direction, .. } => Some((*level, *direction)),
                _ => None,
            })
            .collect();
        assert_eq!(
            crossings,
            vec![(70.0, CrossingDirection::Falling), (70.0, CrossingDirection::Rising)]
        );
        let changes: Vec<(f64, f64)> = log
            .iter()
            .filter_map(|event| match event {
                ConsequenceEvent::ValueChanged { old, new, .. } => Some((*old, *new)),
                _ => None,
            })
            .collect();
        assert_eq!(changes, vec![(75.0, 50.0), (50.0, 75.0)]);
    }

    #[test]
    fn expired_modifier_cannot_be_removed_explicitly() {
        let mut ledger = ledger();
        let mut log = ConsequenceEventLog::default();
        let now = GameInstant(0);
        let id = ledger.add_modifier(OWNER, TrackId::SOCIAL, 5.0, 1, "coffee", now, &mut log);
        assert!(!ledger.remove_modifier(OWNER, TrackId::SOCIAL, id, now.plus_hours(2), &mut log));
    }

    #[test]
    fn check_threshold_is_a_pure_read() {
        let ledger = ledger();
        let now = GameInstant(0);
        assert!(ledger.check_threshold(OWNER, TrackId::LEGAL_STANDING, 80.0, Comparison::EqualOrGreater, now));
        assert!(!ledger.check_threshold(OWNER, TrackId::LEGAL_STANDING, 80.0, Comparison::GreaterThan, now));
        assert!(ledger.check_threshold(OWNER, TrackId::HEAT, 10.0, Comparison::LessThan, now));
        assert_eq!(ledger.tracks().count(), 0);
    }

    #[test]
    fn history_is_capped() {
        let mut config = EngineConfig::default();
        config.memory.history_limit = 3;
        let mut ledger = ScalarLedger::new(&config).expect("config");
        let mut log = ConsequenceEventLog::default();
        for step in 0..5 {
            ledger.modify_base(OWNER, TrackId::SOCIAL, 1.0, &format!("step {}", step), GameInstant(step), &mut log);
        }
        let reasons: Vec<&str> = ledger
            .history(OWNER, TrackId::SOCIAL)
            .iter()
            .map(|record| record.reason.as_str())
            .collect();
        assert_eq!(reasons, vec!["step 2", "step 3", "step 4"]);
    }

    #[test]
    fn crossed_levels_handles_exact_boundaries() {
        let levels = [30.0, 50.0, 70.0];
        assert_eq!(crossed_levels(&levels, 29.0, 30.0), vec![(30.0, CrossingDirection::Rising)]);
        assert!(crossed_levels(&levels, 30.0, 31.0).is_empty());
        assert_eq!(crossed_levels(&levels, 30.0, 29.0), vec![(30.0, CrossingDirection::Falling)]);
        assert!(crossed_levels(&levels, 50.0, 50.0).is_empty());
    }
}
