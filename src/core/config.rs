use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;
use crate::simulation::escalation::InvestigationKind;
use crate::simulation::track::TrackKind;

pub const MIN_VALUE: f64 = 0.0;
pub const MAX_VALUE: f64 = 100.0;
pub const MAX_MEMORABILITY: u8 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackProfile {
    pub kind: TrackKind,
    pub default_value: f64,
    #[serde(default)]
    pub thresholds: Vec<f64>,
}

impl TrackProfile {
    pub fn new(kind: TrackKind, default_value: f64, thresholds: &[f64]) -> Self {
        Self {
            kind,
            default_value,
            thresholds: thresholds.to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryTuning {
    /// Soft bound on non-permanent entries per owner.
    pub capacity: usize,
    /// Fraction of the initial intensity a permanent memory never drops below.
    pub permanent_floor: f64,
    pub permanent_min_memorability: u8,
    pub standard_min_memorability: u8,
    pub intensity_per_point: f64,
    pub permanent_decay_per_day: f64,
    pub standard_decay_per_day: f64,
    pub volatile_decay_per_day: f64,
    pub relationship_impact_per_point: f64,
    pub history_limit: usize,
}

impl Default for MemoryTuning {
    fn default() -> Self {
        Self {
            capacity: 30,
            permanent_floor: 0.2,
            permanent_min_memorability: 8,
            standard_min_memorability: 4,
            intensity_per_point: 10.0,
            permanent_decay_per_day: 0.5,
            standard_decay_per_day: 2.0,
            volatile_decay_per_day: 8.0,
            relationship_impact_per_point: 1.5,
            history_limit: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternTuning {
    pub significant_count: u32,
    pub boost_per_repeat: f64,
    pub max_boost: f64,
}

impl Default for PatternTuning {
    fn default() -> Self {
        Self {
            significant_count: 3,
            boost_per_repeat: 1.5,
            max_boost: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecayTier {
    pub after_days: f64,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InvestigationProfile {
    pub kind: InvestigationKind,
    pub freeze_fraction: f64,
    pub deadline_hours: u64,
    /// Heat added when the owner fails the resolution review.
    pub failure_heat: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseSensitivity {
    pub dormant: f64,
    pub elevated: f64,
    pub surveillance: f64,
    pub investigation: f64,
}

impl Default for PhaseSensitivity {
    fn default() -> Self {
        Self {
            dormant: 1.0,
            elevated: 1.25,
            surveillance: 1.5,
            investigation: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationTuning {
    pub base_decay_per_day: f64,
    pub decay_tiers: Vec<DecayTier>,
    pub elevated_level: f64,
    pub surveillance_level: f64,
    pub investigation_level: f64,
    pub critical_level: f64,
    pub audit_legitimacy_floor: f64,
    pub pass_legitimacy: f64,
    pub clearance_relief: f64,
    pub sensitivity: PhaseSensitivity,
    pub investigations: Vec<InvestigationProfile>,
}

impl Default for EscalationTuning {
    fn default() -> Self {
        Self {
            base_decay_per_day: 2.0,
            decay_tiers: vec![
                DecayTier {
                    after_days: 0.0,
                    multiplier: 1.0,
                },
                DecayTier {
                    after_days: 7.0,
                    multiplier: 2.0,
                },
                DecayTier {
                    after_days: 30.0,
                    multiplier: 3.0,
                },
            ],
            elevated_level: 30.0,
            surveillance_level: 50.0,
            investigation_level: 70.0,
            critical_level: 90.0,
            audit_legitimacy_floor: 0.5,
            pass_legitimacy: 0.6,
            clearance_relief: 15.0,
            sensitivity: PhaseSensitivity::default(),
            investigations: vec![
                InvestigationProfile {
                    kind: InvestigationKind::Surveillance,
                    freeze_fraction: 0.0,
                    deadline_hours: 168,
                    failure_heat: 5.0,
                },
                InvestigationProfile {
                    kind: InvestigationKind::IrsAudit,
                    freeze_fraction: 0.5,
                    deadline_hours: 72,
                    failure_heat: 10.0,
                },
                InvestigationProfile {
                    kind: InvestigationKind::Raid,
                    freeze_fraction: 0.25,
                    deadline_hours: 48,
                    failure_heat: 15.0,
                },
                InvestigationProfile {
                    kind: InvestigationKind::ArrestWarrant,
                    freeze_fraction: 1.0,
                    deadline_hours: 24,
                    failure_heat: 20.0,
                },
            ],
        }
    }
}

impl EscalationTuning {
    pub fn investigation(&self, kind: InvestigationKind) -> Option<&InvestigationProfile> {
        self.investigations.iter().find(|profile| profile.kind == kind)
    }

    /// Decay multiplier for an owner whose last increase was `days_since` ago.
    pub fn multiplier_at(&self, days_since: f64) -> f64 {
        self.decay_tiers
            .iter()
            .rev()
            .find(|tier| days_since >= tier.after_days)
            .map(|tier| tier.multiplier)
            .unwrap_or(1.0)
    }
}

/// Balance constants for every subsystem. Loaded from JSON or taken from `Default`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default = "default_track_profiles")]
    pub tracks: Vec<TrackProfile>,
    #[serde(default)]
    pub memory: MemoryTuning,
    #[serde(default)]
    pub patterns: PatternTuning,
    #[serde(default)]
    pub escalation: EscalationTuning,
}

fn default_schema_version() -> u32 {
    1
}

fn default_track_profiles() -> Vec<TrackProfile> {
    let standing = [20.0, 30.0, 50.0, 70.0, 80.0];
    vec![
        TrackProfile::new(TrackKind::LegalStanding, 80.0, &[30.0, 50.0, 70.0]),
        TrackProfile::new(TrackKind::CriminalStanding, 0.0, &[20.0, 50.0, 80.0]),
        TrackProfile::new(TrackKind::Professional, 50.0, &standing),
        TrackProfile::new(TrackKind::Social, 50.0, &standing),
        TrackProfile::new(TrackKind::Relationship, 50.0, &standing),
        TrackProfile::new(TrackKind::Heat, 0.0, &[30.0, 50.0, 70.0, 90.0]),
    ]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            tracks: default_track_profiles(),
            memory: MemoryTuning::default(),
            patterns: PatternTuning::default(),
            escalation: EscalationTuning::default(),
        }
    }
}

impl EngineConfig {
    pub fn track_profile(&self, kind: TrackKind) -> Option<&TrackProfile> {
        self.tracks.iter().find(|profile| profile.kind == kind)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        for kind in TrackKind::ALL {
            let matching = self.tracks.iter().filter(|p| p.kind == kind).count();
            if matching == 0 {
                return Err(EngineError::MissingTrackProfile(kind.to_string()));
            }
            if matching > 1 {
                return Err(EngineError::InvalidConfig(format!(
                    "track {} is configured {} times",
                    kind, matching
                )));
            }
        }
        for profile in &self.tracks {
            validate_profile(profile)?;
        }
        self.validate_memory()?;
        if self.patterns.significant_count == 0 {
            return Err(EngineError::InvalidConfig(
                "patterns.significant_count must be at least 1".to_string(),
            ));
        }
        if self.patterns.boost_per_repeat < 0.0 || self.patterns.max_boost < 0.0 {
            return Err(EngineError::InvalidConfig(
                "pattern boosts must not be negative".to_string(),
            ));
        }
        self.validate_escalation()
    }

    fn validate_memory(&self) -> Result<(), EngineError> {
        let memory = &self.memory;
        if !(0.0..=1.0).contains(&memory.permanent_floor) {
            return Err(EngineError::InvalidConfig(format!(
                "memory.permanent_floor {} is outside [0, 1]",
                memory.permanent_floor
            )));
        }
        if memory.standard_min_memorability > memory.permanent_min_memorability
            || memory.permanent_min_memorability > MAX_MEMORABILITY
        {
            return Err(EngineError::InvalidConfig(
                "memory tier cutoffs must satisfy standard <= permanent <= 10".to_string(),
            ));
        }
        let rates = [
            memory.permanent_decay_per_day,
            memory.standard_decay_per_day,
            memory.volatile_decay_per_day,
            memory.intensity_per_point,
        ];
        if rates.iter().any(|rate| !rate.is_finite() || *rate < 0.0) {
            return Err(EngineError::InvalidConfig(
                "memory rates must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_escalation(&self) -> Result<(), EngineError> {
        let escalation = &self.escalation;
        let levels = [
            escalation.elevated_level,
            escalation.surveillance_level,
            escalation.investigation_level,
            escalation.critical_level,
        ];
        if levels.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(EngineError::InvalidConfig(
                "escalation levels must be strictly ascending".to_string(),
            ));
        }
        let heat = self
            .track_profile(TrackKind::Heat)
            .ok_or_else(|| EngineError::MissingTrackProfile(TrackKind::Heat.to_string()))?;
        for level in levels {
            if !heat.thresholds.contains(&level) {
                return Err(EngineError::InvalidThresholds {
                    kind: TrackKind::Heat.to_string(),
                    reason: format!("escalation level {} is not a heat threshold", level),
                });
            }
        }

        let tiers = &escalation.decay_tiers;
        match tiers.first() {
            Some(first) if first.after_days == 0.0 => {}
            _ => {
                return Err(EngineError::InvalidConfig(
                    "escalation.decay_tiers must start at 0 days".to_string(),
                ))
            }
        }
        if tiers.windows(2).any(|pair| pair[0].after_days >= pair[1].after_days) {
            return Err(EngineError::InvalidConfig(
                "escalation.decay_tiers must be strictly ascending".to_string(),
            ));
        }
        if tiers.iter().any(|tier| tier.multiplier < 0.0) || escalation.base_decay_per_day < 0.0 {
            return Err(EngineError::InvalidConfig(
                "escalation decay rates must not be negative".to_string(),
            ));
        }

        for kind in InvestigationKind::ALL {
            let profile = escalation.investigation(kind).ok_or_else(|| {
                EngineError::InvalidConfig(format!("no investigation profile for {}", kind))
            })?;
            if !(0.0..=1.0).contains(&profile.freeze_fraction) {
                return Err(EngineError::InvalidConfig(format!(
                    "freeze fraction for {} is outside [0, 1]",
                    kind
                )));
            }
        }
        Ok(())
    }
}

fn validate_profile(profile: &TrackProfile) -> Result<(), EngineError> {
    let invalid = |reason: String| EngineError::InvalidThresholds {
        kind: profile.kind.to_string(),
        reason,
    };
    if !(MIN_VALUE..=MAX_VALUE).contains(&profile.default_value) {
        return Err(invalid(format!(
            "default value {} is outside [0, 100]",
            profile.default_value
        )));
    }
    if profile
        .thresholds
        .iter()
        .any(|level| !(MIN_VALUE..=MAX_VALUE).contains(level))
    {
        return Err(invalid("levels must lie within [0, 100]".to_string()));
    }
    if profile.thresholds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(invalid("levels must be strictly ascending".to_string()));
    }
    Ok(())
}

pub fn parse_engine_config(raw: &str) -> Result<EngineConfig, EngineError> {
    let config: EngineConfig = serde_json::from_str(raw)?;
    config.validate()?;
    Ok(config)
}

pub fn load_engine_config(path: impl AsRef<Path>) -> Result<EngineConfig, EngineError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| EngineError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let config: EngineConfig = serde_json::from_str(&raw).map_err(|source| EngineError::Json {
        path: path.display().to_string(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.track_profile(TrackKind::LegalStanding).map(|p| p.default_value),
            Some(80.0)
        );
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config = parse_engine_config(r#"{ "memory": { "capacity": 5 } }"#)
            .expect("config parses");
        assert_eq!(config.memory.capacity, 5);
        assert_eq!(config.memory.permanent_floor, 0.2);
        assert_eq!(config.escalation.decay_tiers.len(), 3);
    }

    #[test]
    fn missing_track_profile_is_rejected() {
        let mut config = EngineConfig::default();
        config.tracks.retain(|profile| profile.kind != TrackKind::Social);
        assert!(matches!(
            config.validate(),
            Err(EngineError::MissingTrackProfile(kind)) if kind == "SOCIAL"
        ));
    }

    #[test]
    fn unsorted_thresholds_are_rejected() {
        let mut config = EngineConfig::default();
        config.tracks[0].thresholds = vec![50.0, 30.0];
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn escalation_levels_must_be_heat_thresholds() {
        let mut config = EngineConfig::default();
        config.escalation.critical_level = 95.0;
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidThresholds { .. })
        ));
    }

    #[test]
    fn unknown_track_kind_in_json_fails_fast() {
        let raw = r#"{ "tracks": [ { "kind": "KARMA", "default_value": 10 } ] }"#;
        assert!(parse_engine_config(raw).is_err());
    }

    #[test]
    fn decay_multiplier_follows_tiers() {
        let tuning = EscalationTuning::default();
        assert_eq!(tuning.multiplier_at(2.0), 1.0);
        assert_eq!(tuning.multiplier_at(7.0), 2.0);
        assert_eq!(tuning.multiplier_at(29.9), 2.0);
        assert_eq!(tuning.multiplier_at(40.0), 3.0);
    }
}
