use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::EngineError;

/// Stable identifier for the player or an NPC whose state the engine tracks.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct OwnerId(pub u32);

impl OwnerId {
    pub const PLAYER: OwnerId = OwnerId(0);
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackKind {
    LegalStanding,
    CriminalStanding,
    Professional,
    Social,
    Relationship,
    Heat,
}

impl TrackKind {
    pub const ALL: [TrackKind; 6] = [
        TrackKind::LegalStanding,
        TrackKind::CriminalStanding,
        TrackKind::Professional,
        TrackKind::Social,
        TrackKind::Relationship,
        TrackKind::Heat,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::LegalStanding => "LEGAL_STANDING",
            TrackKind::CriminalStanding => "CRIMINAL_STANDING",
            TrackKind::Professional => "PROFESSIONAL",
            TrackKind::Social => "SOCIAL",
            TrackKind::Relationship => "RELATIONSHIP",
            TrackKind::Heat => "HEAT",
        }
    }
}

impl fmt::Display for TrackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackKind {
    type Err = EngineError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TrackKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value)
            .ok_or_else(|| EngineError::UnknownTrackKind(value.to_string()))
    }
}

/// A named scalar on an owner. Relationship tracks carry the other party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId {
    pub kind: TrackKind,
    #[serde(default)]
    pub subject: Option<OwnerId>,
}

impl TrackId {
    pub const LEGAL_STANDING: TrackId = TrackId::of(TrackKind::LegalStanding);
    pub const CRIMINAL_STANDING: TrackId = TrackId::of(TrackKind::CriminalStanding);
    pub const PROFESSIONAL: TrackId = TrackId::of(TrackKind::Professional);
    pub const SOCIAL: TrackId = TrackId::of(TrackKind::Social);
    pub const HEAT: TrackId = TrackId::of(TrackKind::Heat);

    pub const fn of(kind: TrackKind) -> Self {
        Self {
            kind,
            subject: None,
        }
    }

    pub const fn relationship(with: OwnerId) -> Self {
        Self {
            kind: TrackKind::Relationship,
            subject: Some(with),
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subject {
            Some(subject) => write!(f, "{}({})", self.kind, subject),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    GreaterThan,
    LessThan,
    EqualOrGreater,
    EqualOrLess,
}

impl Comparison {
    pub fn holds(self, value: f64, level: f64) -> bool {
        match self {
            Comparison::GreaterThan => value > level,
            Comparison::LessThan => value < level,
            Comparison::EqualOrGreater => value >= level,
            Comparison::EqualOrLess => value <= level,
        }
    }
}
