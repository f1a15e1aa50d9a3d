//! Shared state for the installed day timeline and live markers

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use crate::live::LiveMode;
use crate::timeline::DayTimeline;

/// State written by the engine and read by the API
#[derive(Debug)]
pub struct TimelineState {
    /// The installed day; `None` until the first day change completes
    pub timeline: Option<DayTimeline>,
    /// Bumped on every day change; a fetch only installs if it still matches
    pub generation: u64,
    /// The most recently requested day, which may still be loading
    pub requested_date: Option<NaiveDate>,
    pub live_mode: LiveMode,
    /// Wall-clock seconds-of-day as of the last live refresh
    pub live_now_seconds: Option<u32>,
    /// Elapsed seconds of ongoing intervals as of the last slow refresh
    pub ongoing_durations: HashMap<String, u32>,
    pub started_at: Instant,
}

impl TimelineState {
    pub fn new() -> Self {
        Self {
            timeline: None,
            generation: 0,
            requested_date: None,
            live_mode: LiveMode::Disabled,
            live_now_seconds: None,
            ongoing_durations: HashMap::new(),
            started_at: Instant::now(),
        }
    }

    /// Start a new day change and return its generation
    pub fn begin_day_change(&mut self, date: NaiveDate) -> u64 {
        self.generation += 1;
        self.requested_date = Some(date);
        self.generation
    }

    /// Install a rebuilt day if no newer day change started meanwhile.
    /// Returns whether it was installed.
    pub fn install(&mut self, generation: u64, timeline: DayTimeline, now_seconds: u32) -> bool {
        if generation != self.generation {
            return false;
        }
        if timeline.is_today() {
            self.live_now_seconds = Some(now_seconds);
            self.ongoing_durations = timeline.ongoing_durations(now_seconds);
        } else {
            self.live_now_seconds = None;
            self.ongoing_durations.clear();
        }
        self.timeline = Some(timeline);
        true
    }

    pub fn is_loading(&self) -> bool {
        match (&self.timeline, self.requested_date) {
            (Some(timeline), Some(requested)) => timeline.date() != requested,
            (None, Some(_)) => true,
            _ => false,
        }
    }
}

impl Default for TimelineState {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe shared state handle
pub type TimelineHandle = Arc<RwLock<TimelineState>>;

pub fn new_timeline_handle() -> TimelineHandle {
    Arc::new(RwLock::new(TimelineState::new()))
}
