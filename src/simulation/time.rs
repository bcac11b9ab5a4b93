use std::fmt;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_HOUR: u64 = 60;
pub const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;

/// A point on the game timeline, in whole minutes since the session began.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct GameInstant(pub u64);

impl GameInstant {
    pub fn from_hours(hours: u64) -> Self {
        Self(hours.saturating_mul(MINUTES_PER_HOUR))
    }

    pub fn from_days(days: u64) -> Self {
        Self(days.saturating_mul(MINUTES_PER_DAY))
    }

    pub fn minutes(self) -> u64 {
        self.0
    }

    pub fn plus_minutes(self, minutes: u64) -> Self {
        Self(self.0.saturating_add(minutes))
    }

    pub fn plus_hours(self, hours: u64) -> Self {
        self.plus_minutes(hours.saturating_mul(MINUTES_PER_HOUR))
    }

    pub fn plus_days(self, days: u64) -> Self {
        self.plus_minutes(days.saturating_mul(MINUTES_PER_DAY))
    }

    /// Hours from `earlier` to `self`; zero when `earlier` is in the future.
    pub fn hours_since(self, earlier: GameInstant) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / MINUTES_PER_HOUR as f64
    }

    pub fn days_since(self, earlier: GameInstant) -> f64 {
        self.0.saturating_sub(earlier.0) as f64 / MINUTES_PER_DAY as f64
    }
}

/// Global resource tracking the simulation timeline.
#[derive(Resource, Debug, Serialize, Deserialize, Clone)]
pub struct GameTime {
    pub tick: u64,
    pub now: GameInstant,
}

impl Default for GameTime {
    fn default() -> Self {
        Self {
            tick: 0,
            now: GameInstant::from_hours(8),
        }
    }
}

impl GameTime {
    pub fn now(&self) -> GameInstant {
        self.now
    }

    pub fn day(&self) -> u64 {
        self.now.0 / MINUTES_PER_DAY + 1
    }

    pub fn hour(&self) -> u8 {
        ((self.now.0 % MINUTES_PER_DAY) / MINUTES_PER_HOUR) as u8
    }

    pub fn week(&self) -> u64 {
        (self.day() - 1) / 7 + 1
    }

    pub fn month(&self) -> u64 {
        (self.day() - 1) / 28 + 1
    }

    pub fn is_day(&self) -> bool {
        let hour = self.hour();
        (6..18).contains(&hour)
    }

    /// One tick is one in-game hour.
    pub fn advance(&mut self) {
        self.advance_minutes(MINUTES_PER_HOUR);
    }

    pub fn advance_minutes(&mut self, minutes: u64) {
        self.tick += 1;
        self.now = self.now.plus_minutes(minutes);
    }

    /// Sleep or fast travel: a single jump of several hours.
    pub fn skip_hours(&mut self, hours: u64) {
        self.advance_minutes(hours.saturating_mul(MINUTES_PER_HOUR));
    }
}

impl fmt::Display for GameTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = if self.is_day() { "Day" } else { "Night" };
        write!(
            f,
            "Day {}, Week {}, Month {}, {:02}:{:02} ({})",
            self.day(),
            self.week(),
            self.month(),
            self.hour(),
            self.now.0 % MINUTES_PER_HOUR,
            phase
        )
    }
}

/// System: Advances the clock by one hour.
pub fn advance_time_system(mut time: ResMut<GameTime>) {
    time.advance();
}
