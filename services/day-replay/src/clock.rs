//! Virtual playback clock for the selected day

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, Result};
use crate::time_math::{format_hhmm, SECONDS_PER_DAY};

/// Virtual seconds advanced per tick at speed 1.0
pub const SECONDS_PER_TICK: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockStatus {
    Stopped,
    Playing,
}

/// Upper limit of the clock position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "seconds", rename_all = "snake_case")]
pub enum UpperBound {
    /// A past day can be played to its end
    EndOfDay,
    /// The live day stops at the current wall-clock time, which only rises
    LiveNow(u32),
}

impl UpperBound {
    pub fn seconds(&self) -> u32 {
        match self {
            UpperBound::EndOfDay => SECONDS_PER_DAY,
            UpperBound::LiveNow(now) => *now,
        }
    }
}

/// Serializable view of the clock
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSnapshot {
    pub current_seconds: u32,
    pub current_time: String,
    pub is_playing: bool,
    pub speed: f64,
    pub upper_bound_seconds: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    current_seconds: f64,
    speed: f64,
    status: ClockStatus,
    bound: UpperBound,
}

impl PlaybackClock {
    /// A stopped clock positioned for a day.
    ///
    /// On the live day the clock starts at `now`; on a past day at
    /// `past_day_start_seconds`.
    pub fn for_day(live_now: Option<u32>, past_day_start_seconds: u32, speed: f64) -> Self {
        let (bound, start) = match live_now {
            Some(now) => (UpperBound::LiveNow(now), now),
            None => (UpperBound::EndOfDay, past_day_start_seconds),
        };
        Self {
            current_seconds: start.min(bound.seconds()) as f64,
            speed: if speed.is_finite() && speed > 0.0 { speed } else { 1.0 },
            status: ClockStatus::Stopped,
            bound,
        }
    }

    pub fn current_seconds(&self) -> u32 {
        self.current_seconds as u32
    }

    pub fn is_playing(&self) -> bool {
        self.status == ClockStatus::Playing
    }

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn upper_bound(&self) -> UpperBound {
        self.bound
    }

    pub fn upper_bound_seconds(&self) -> u32 {
        self.bound.seconds()
    }

    /// Start playback. Does nothing when already at the bound.
    pub fn play(&mut self) {
        if self.current_seconds >= self.bound.seconds() as f64 {
            tracing::debug!("Play ignored, clock already at its bound");
            return;
        }
        self.status = ClockStatus::Playing;
    }

    pub fn pause(&mut self) {
        self.status = ClockStatus::Stopped;
    }

    /// Jump to a position, clamped into `[0, bound]`. Stops playback.
    pub fn seek(&mut self, seconds: u32) {
        self.status = ClockStatus::Stopped;
        self.current_seconds = seconds.min(self.bound.seconds()) as f64;
    }

    /// Change the multiplier; the position is untouched.
    pub fn set_speed(&mut self, multiplier: f64) -> Result<()> {
        if !multiplier.is_finite() || multiplier <= 0.0 {
            return Err(ReplayError::InvalidSpeed(multiplier));
        }
        self.speed = multiplier;
        Ok(())
    }

    /// Raise the live bound to the current wall-clock seconds-of-day.
    /// A lower value is ignored so the bound never shrinks.
    pub fn refresh_live_bound(&mut self, now_seconds: u32) {
        if let UpperBound::LiveNow(bound) = self.bound {
            self.bound = UpperBound::LiveNow(bound.max(now_seconds.min(SECONDS_PER_DAY)));
        }
    }

    /// Advance one step while playing. Reaching the bound clamps and stops.
    pub fn tick(&mut self) {
        if !self.is_playing() {
            return;
        }
        let bound = self.bound.seconds() as f64;
        let next = self.current_seconds + SECONDS_PER_TICK * self.speed;
        if next >= bound {
            self.current_seconds = bound;
            self.status = ClockStatus::Stopped;
            tracing::debug!("Playback reached {} and stopped", format_hhmm(bound as u32));
        } else {
            self.current_seconds = next;
        }
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            current_seconds: self.current_seconds(),
            current_time: format_hhmm(self.current_seconds()),
            is_playing: self.is_playing(),
            speed: self.speed,
            upper_bound_seconds: self.upper_bound_seconds(),
        }
    }
}
