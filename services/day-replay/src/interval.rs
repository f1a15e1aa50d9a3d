//! Active intervals and their derived render segments

use serde::{Deserialize, Serialize};

use crate::time_math::{format_hhmm, SECONDS_PER_DAY};

/// Whether an interval has an observed end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntervalStatus {
    Closed,
    Ongoing,
}

/// A span of one day during which an entity classified as "on".
///
/// `end_seconds` is `None` exactly when `status` is `Ongoing`. A closed
/// interval with `end < start` crossed midnight; it is stored unsplit and
/// expanded by [`Interval::render_segments`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub entity_id: String,
    pub device_label: String,
    pub start_seconds: u32,
    end_seconds: Option<u32>,
    status: IntervalStatus,
}

/// One independently drawable piece of an interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSegment {
    pub start_seconds: u32,
    pub end_seconds: u32,
    pub ongoing: bool,
    pub crosses_midnight: bool,
}

impl RenderSegment {
    pub fn duration_seconds(&self) -> u32 {
        self.end_seconds.saturating_sub(self.start_seconds)
    }
}

impl Interval {
    pub fn closed(entity_id: &str, device_label: &str, start_seconds: u32, end_seconds: u32) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            device_label: device_label.to_string(),
            start_seconds,
            end_seconds: Some(end_seconds),
            status: IntervalStatus::Closed,
        }
    }

    pub fn ongoing(entity_id: &str, device_label: &str, start_seconds: u32) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            device_label: device_label.to_string(),
            start_seconds,
            end_seconds: None,
            status: IntervalStatus::Ongoing,
        }
    }

    pub fn end_seconds(&self) -> Option<u32> {
        self.end_seconds
    }

    pub fn status(&self) -> IntervalStatus {
        self.status
    }

    pub fn is_ongoing(&self) -> bool {
        self.status == IntervalStatus::Ongoing
    }

    /// Close an ongoing interval. Closing an already closed interval is a no-op
    /// and returns false.
    pub fn close(&mut self, end_seconds: u32) -> bool {
        if !self.is_ongoing() {
            return false;
        }
        self.end_seconds = Some(end_seconds);
        self.status = IntervalStatus::Closed;
        true
    }

    pub fn wraps_midnight(&self) -> bool {
        matches!(self.end_seconds, Some(end) if end < self.start_seconds)
    }

    /// Position on the day's time axis. A wrapping interval began on the
    /// previous day, so it sorts before everything that started today.
    pub fn chronological_key(&self) -> i64 {
        if self.wraps_midnight() {
            self.start_seconds as i64 - SECONDS_PER_DAY as i64
        } else {
            self.start_seconds as i64
        }
    }

    /// Active seconds. An ongoing interval runs to `now`.
    pub fn duration_seconds(&self, now: u32) -> u32 {
        match self.end_seconds {
            Some(end) if end < self.start_seconds => SECONDS_PER_DAY - self.start_seconds + end,
            Some(end) => end - self.start_seconds,
            None => now.saturating_sub(self.start_seconds),
        }
    }

    /// Whether the entity was active at `t` according to this interval.
    pub fn contains(&self, t: u32) -> bool {
        match self.end_seconds {
            Some(end) if end < self.start_seconds => t >= self.start_seconds || t <= end,
            Some(end) => self.start_seconds <= t && t <= end,
            None => t >= self.start_seconds,
        }
    }

    /// Whether `t` falls within `tolerance` seconds of this interval.
    pub fn is_near(&self, t: u32, tolerance: u32, now: u32) -> bool {
        let lower = self.start_seconds.saturating_sub(tolerance);
        match self.end_seconds {
            Some(end) if end < self.start_seconds => t >= lower || t <= end + tolerance,
            Some(end) => lower <= t && t <= end + tolerance,
            None => lower <= t && t <= now + tolerance,
        }
    }

    /// Drawable segments. `live_now` is the current seconds-of-day when the
    /// interval belongs to today, `None` for a past day.
    pub fn render_segments(&self, live_now: Option<u32>) -> Vec<RenderSegment> {
        match (self.end_seconds, live_now) {
            (None, Some(now)) => vec![RenderSegment {
                start_seconds: self.start_seconds,
                end_seconds: now.max(self.start_seconds),
                ongoing: true,
                crosses_midnight: false,
            }],
            (None, None) => vec![RenderSegment {
                start_seconds: self.start_seconds,
                end_seconds: SECONDS_PER_DAY,
                ongoing: false,
                crosses_midnight: false,
            }],
            (Some(end), _) if end < self.start_seconds => vec![
                RenderSegment {
                    start_seconds: self.start_seconds,
                    end_seconds: SECONDS_PER_DAY,
                    ongoing: false,
                    crosses_midnight: true,
                },
                RenderSegment {
                    start_seconds: 0,
                    end_seconds: end,
                    ongoing: false,
                    crosses_midnight: true,
                },
            ],
            (Some(end), _) => vec![RenderSegment {
                start_seconds: self.start_seconds,
                end_seconds: end,
                ongoing: false,
                crosses_midnight: false,
            }],
        }
    }

    /// `[08:00 - 08:45]` style label; ongoing intervals end in `now`.
    pub fn label(&self) -> String {
        match self.end_seconds {
            Some(end) => format!("[{} - {}]", format_hhmm(self.start_seconds), format_hhmm(end)),
            None => format!("[{} - now]", format_hhmm(self.start_seconds)),
        }
    }
}

/// Total active seconds over one entity's intervals.
pub fn total_active_seconds(intervals: &[Interval], now: u32) -> u32 {
    intervals.iter().map(|i| i.duration_seconds(now)).sum()
}
