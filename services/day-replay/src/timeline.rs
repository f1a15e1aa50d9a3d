//! One selected day: interval sets, sensor index and playback clock

use std::collections::HashMap;

use chrono::{FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::classifier::EntityRule;
use crate::clock::{ClockSnapshot, PlaybackClock};
use crate::interval::{self, Interval, RenderSegment};
use crate::merger::{self, MutationResult};
use crate::reconstruct::{reconstruct, DayContext, EntityRef, Sample};
use crate::sampler::{SensorPoint, SensorSampler};
use crate::time_math::format_duration;

/// Default window used to highlight intervals around the scrub position
pub const DEFAULT_NEAR_TOLERANCE_SECONDS: u32 = 600;

/// An on/off entity with its resolved classification rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedEntity {
    pub entity_id: String,
    pub device_label: String,
    pub rule: EntityRule,
    pub room: Option<String>,
    pub layer: u32,
}

impl TrackedEntity {
    fn entity_ref(&self) -> EntityRef<'_> {
        EntityRef {
            entity_id: &self.entity_id,
            device_label: &self.device_label,
            rule: &self.rule,
        }
    }
}

/// A continuous sensor and how to display it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedSensor {
    pub entity_id: String,
    pub name: Option<String>,
    pub unit: Option<String>,
}

/// Which day is being built and, for the live day, what is known right now
#[derive(Debug, Clone, PartialEq)]
pub enum DayKind {
    Past,
    Today {
        now_seconds: u32,
        live_states: HashMap<String, String>,
    },
}

/// Raw data fetched for a day, keyed by entity id
#[derive(Debug, Clone, Default)]
pub struct DayData {
    pub samples: HashMap<String, Vec<Sample>>,
    pub sensor_points: HashMap<String, Vec<SensorPoint>>,
}

#[derive(Debug, Clone, PartialEq)]
struct EntityTrack {
    entity: TrackedEntity,
    intervals: Vec<Interval>,
}

/// Entity active at a given moment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveEntity {
    pub entity_id: String,
    pub device_label: String,
    pub room: Option<String>,
    pub layer: u32,
    pub interval: Interval,
}

/// Sensor value nearest to a given moment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub entity_id: String,
    pub display: String,
    pub point: SensorPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityView {
    pub entity_id: String,
    pub device_label: String,
    pub room: Option<String>,
    pub layer: u32,
    pub intervals: Vec<Interval>,
    pub segments: Vec<RenderSegment>,
    pub total_active_seconds: u32,
    pub total_active: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineView {
    pub date: NaiveDate,
    pub is_today: bool,
    pub clock: ClockSnapshot,
    pub entities: Vec<EntityView>,
}

/// The composition root for a selected day.
///
/// Rebuilt wholesale on every day change. On the live day the interval sets
/// are updated in place by state changes; other days are frozen.
#[derive(Debug, Clone)]
pub struct DayTimeline {
    date: NaiveDate,
    offset: FixedOffset,
    is_today: bool,
    tracks: Vec<EntityTrack>,
    sensors: Vec<TrackedSensor>,
    sampler: SensorSampler,
    clock: PlaybackClock,
}

/// Playback settings applied when a day is built
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackDefaults {
    pub speed: f64,
    pub past_day_start_seconds: u32,
}

impl DayTimeline {
    /// Reconstruct every entity and index every sensor for `date`.
    pub fn build(
        date: NaiveDate,
        offset: FixedOffset,
        entities: &[TrackedEntity],
        sensors: &[TrackedSensor],
        mut data: DayData,
        day: &DayKind,
        playback: PlaybackDefaults,
    ) -> Self {
        let tracks = entities
            .iter()
            .map(|entity| {
                let samples = data.samples.remove(&entity.entity_id).unwrap_or_default();
                let context = match day {
                    DayKind::Past => DayContext::Past,
                    DayKind::Today {
                        now_seconds,
                        live_states,
                    } => DayContext::Today {
                        now_seconds: *now_seconds,
                        live_state: live_states.get(&entity.entity_id).map(String::as_str),
                    },
                };
                EntityTrack {
                    entity: entity.clone(),
                    intervals: reconstruct(entity.entity_ref(), &samples, offset, context),
                }
            })
            .collect();

        let mut sampler = SensorSampler::new();
        for sensor in sensors {
            let points = data
                .sensor_points
                .remove(&sensor.entity_id)
                .unwrap_or_default();
            sampler.insert(&sensor.entity_id, points);
        }

        let live_now = match day {
            DayKind::Past => None,
            DayKind::Today { now_seconds, .. } => Some(*now_seconds),
        };

        Self {
            date,
            offset,
            is_today: live_now.is_some(),
            tracks,
            sensors: sensors.to_vec(),
            sampler,
            clock: PlaybackClock::for_day(live_now, playback.past_day_start_seconds, playback.speed),
        }
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn is_today(&self) -> bool {
        self.is_today
    }

    pub fn clock(&self) -> &PlaybackClock {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut PlaybackClock {
        &mut self.clock
    }

    pub fn entities(&self) -> impl Iterator<Item = &TrackedEntity> {
        self.tracks.iter().map(|t| &t.entity)
    }

    pub fn sensors(&self) -> &[TrackedSensor] {
        &self.sensors
    }

    /// Intervals of one entity in chronological order
    pub fn intervals(&self, entity_id: &str) -> &[Interval] {
        self.track(entity_id)
            .map(|t| t.intervals.as_slice())
            .unwrap_or_default()
    }

    /// True when any entity has at least one interval
    pub fn has_data(&self) -> bool {
        self.tracks.iter().any(|t| !t.intervals.is_empty())
    }

    /// Current wall-clock seconds on the live day, as last refreshed
    pub fn live_now(&self) -> Option<u32> {
        self.is_today.then(|| self.clock.upper_bound_seconds())
    }

    /// Apply a live state change. Unknown entities are ignored.
    pub fn apply_state_change(
        &mut self,
        entity_id: &str,
        new_raw_value: Option<&str>,
        now_seconds: u32,
    ) -> MutationResult {
        let is_today = self.is_today;
        let Some(track) = self.track_mut(entity_id) else {
            return MutationResult::Unchanged;
        };
        merger::on_state_change(
            &mut track.intervals,
            track.entity.entity_ref(),
            new_raw_value,
            now_seconds,
            is_today,
        )
    }

    /// Open intervals for entities that are on right now but whose history
    /// ended before the transition. Returns how many were opened.
    pub fn reconcile_at_startup(&mut self, current_states: &HashMap<String, String>, now_seconds: u32) -> usize {
        if !self.is_today {
            return 0;
        }
        let mut opened = 0;
        for track in &mut self.tracks {
            let current = current_states.get(&track.entity.entity_id).map(String::as_str);
            let result = merger::reconcile_at_startup(
                &mut track.intervals,
                track.entity.entity_ref(),
                current,
                now_seconds,
            );
            if result.changed() {
                opened += 1;
            }
        }
        opened
    }

    /// Drawable segments of one entity
    pub fn render_segments(&self, entity_id: &str, now_seconds: u32) -> Vec<RenderSegment> {
        let live_now = self.is_today.then_some(now_seconds);
        self.intervals(entity_id)
            .iter()
            .flat_map(|i| i.render_segments(live_now))
            .collect()
    }

    /// Entities active at `seconds`, ordered by layer then label
    pub fn active_at(&self, seconds: u32) -> Vec<ActiveEntity> {
        let mut active: Vec<ActiveEntity> = self
            .tracks
            .iter()
            .filter_map(|track| {
                let interval = track.intervals.iter().find(|i| i.contains(seconds))?;
                Some(ActiveEntity {
                    entity_id: track.entity.entity_id.clone(),
                    device_label: track.entity.device_label.clone(),
                    room: track.entity.room.clone(),
                    layer: track.entity.layer,
                    interval: interval.clone(),
                })
            })
            .collect();
        active.sort_by(|a, b| {
            a.layer
                .cmp(&b.layer)
                .then_with(|| a.device_label.cmp(&b.device_label))
        });
        active
    }

    pub fn total_active_seconds(&self, entity_id: &str, now_seconds: u32) -> u32 {
        interval::total_active_seconds(self.intervals(entity_id), now_seconds)
    }

    /// Intervals of one entity within `tolerance` seconds of `seconds`
    pub fn intervals_near(
        &self,
        entity_id: &str,
        seconds: u32,
        tolerance: u32,
        now_seconds: u32,
    ) -> Vec<&Interval> {
        self.intervals(entity_id)
            .iter()
            .filter(|i| i.is_near(seconds, tolerance, now_seconds))
            .collect()
    }

    pub fn value_at(&self, sensor_id: &str, seconds: u32) -> Option<&SensorPoint> {
        self.sampler.nearest(sensor_id, seconds)
    }

    /// Every sensor's nearest reading, skipping sensors without data
    pub fn sensor_values_at(&self, seconds: u32) -> Vec<SensorReading> {
        self.sensors
            .iter()
            .filter_map(|sensor| {
                let point = self.sampler.nearest(&sensor.entity_id, seconds)?;
                Some(SensorReading {
                    entity_id: sensor.entity_id.clone(),
                    display: point.display_value(sensor.unit.as_deref(), sensor.name.as_deref()),
                    point: point.clone(),
                })
            })
            .collect()
    }

    /// Elapsed seconds of every ongoing interval at `now_seconds`
    pub fn ongoing_durations(&self, now_seconds: u32) -> HashMap<String, u32> {
        self.tracks
            .iter()
            .filter_map(|track| {
                let ongoing = track.intervals.iter().find(|i| i.is_ongoing())?;
                Some((track.entity.entity_id.clone(), ongoing.duration_seconds(now_seconds)))
            })
            .collect()
    }

    pub fn view(&self, now_seconds: u32) -> TimelineView {
        let entities = self
            .tracks
            .iter()
            .map(|track| {
                let id = &track.entity.entity_id;
                let total = self.total_active_seconds(id, now_seconds);
                EntityView {
                    entity_id: id.clone(),
                    device_label: track.entity.device_label.clone(),
                    room: track.entity.room.clone(),
                    layer: track.entity.layer,
                    intervals: track.intervals.clone(),
                    segments: self.render_segments(id, now_seconds),
                    total_active_seconds: total,
                    total_active: format_duration(total),
                }
            })
            .collect();

        TimelineView {
            date: self.date,
            is_today: self.is_today,
            clock: self.clock.snapshot(),
            entities,
        }
    }

    fn track(&self, entity_id: &str) -> Option<&EntityTrack> {
        self.tracks.iter().find(|t| t.entity.entity_id == entity_id)
    }

    fn track_mut(&mut self, entity_id: &str) -> Option<&mut EntityTrack> {
        self.tracks.iter_mut().find(|t| t.entity.entity_id == entity_id)
    }
}
