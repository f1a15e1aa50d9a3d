//! BDD test world for day replay service

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use cucumber::World;
use tokio_util::sync::CancellationToken;

use day_replay::classifier::EntityRule;
use day_replay::clock::PlaybackClock;
use day_replay::engine::{Engine, EngineSettings, TimeSource};
use day_replay::history::{HistoryProvider, SensorSample};
use day_replay::interval::Interval;
use day_replay::live::StateReader;
use day_replay::merger::MutationResult;
use day_replay::reconstruct::Sample;
use day_replay::sampler::{SensorPoint, SensorSampler};
use day_replay::state::new_timeline_handle;
use day_replay::time_math::parse_hhmm;
use day_replay::timeline::{PlaybackDefaults, TrackedEntity};

// --- Test doubles ---

/// History served from memory; entities marked failing return an error
#[derive(Debug, Default)]
pub struct FakeHistory {
    pub samples: Mutex<HashMap<String, Vec<Sample>>>,
    pub failing: Mutex<HashSet<String>>,
}

#[async_trait::async_trait]
impl HistoryProvider for FakeHistory {
    async fn fetch_history(
        &self,
        entity_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> day_replay::Result<Vec<Sample>> {
        if self.failing.lock().unwrap().contains(entity_id) {
            return Err(day_replay::ReplayError::History(format!(
                "{} unavailable",
                entity_id
            )));
        }
        let samples = self.samples.lock().unwrap();
        Ok(samples
            .get(entity_id)
            .map(|all| {
                all.iter()
                    .filter(|s| s.timestamp >= start && s.timestamp < end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_sensor_history(
        &self,
        _entity_id: &str,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> day_replay::Result<Vec<SensorSample>> {
        Ok(Vec::new())
    }
}

/// Current entity states served from memory
#[derive(Debug, Default)]
pub struct FakeStates {
    pub states: Mutex<HashMap<String, String>>,
}

#[async_trait::async_trait]
impl StateReader for FakeStates {
    async fn current_state(&self, entity_id: &str) -> day_replay::Result<Option<String>> {
        Ok(self.states.lock().unwrap().get(entity_id).cloned())
    }
}

/// A wall clock the scenario moves by hand
#[derive(Debug)]
pub struct FakeTime {
    pub now: Mutex<DateTime<Utc>>,
}

impl Default for FakeTime {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2024, 6, 2, 12, 0, 0).unwrap()),
        }
    }
}

impl TimeSource for FakeTime {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

// --- Helpers ---

/// The day used by scenarios that do not name one
pub fn reference_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn parse_date(value: &str) -> NaiveDate {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .unwrap_or_else(|_| panic!("invalid date '{}'", value))
}

pub fn hhmm(value: &str) -> u32 {
    parse_hhmm(value).unwrap_or_else(|| panic!("invalid time '{}'", value))
}

/// UTC instant of a time of day
pub fn instant(date: NaiveDate, time: &str) -> DateTime<Utc> {
    let seconds = hhmm(time);
    Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0).unwrap())
        + chrono::Duration::seconds(seconds as i64)
}

/// Parse `08:00=on, 08:45=off` into samples on `date`
pub fn parse_samples(entity_id: &str, date: NaiveDate, list: &str) -> Vec<Sample> {
    list.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let (time, state) = entry
                .split_once('=')
                .unwrap_or_else(|| panic!("expected time=state, got '{}'", entry));
            Sample::new(entity_id, instant(date, time), state)
        })
        .collect()
}

#[derive(Default, World)]
pub struct ReplayWorld {
    // Reconstruction
    pub entities: Vec<String>,
    pub rules: HashMap<String, EntityRule>,
    pub samples: HashMap<String, Vec<Sample>>,
    pub live_states: HashMap<String, String>,
    pub intervals: HashMap<String, Vec<Interval>>,

    // Playback
    pub clock: Option<PlaybackClock>,
    pub speed_rejected: Option<bool>,

    // Sensors
    pub sampler: SensorSampler,
    pub reading: Option<SensorPoint>,

    // Engine
    pub history: Arc<FakeHistory>,
    pub states: Arc<FakeStates>,
    pub time: Arc<FakeTime>,
    pub engine: Option<Arc<Engine>>,
    pub last_mutation: Option<MutationResult>,
    pub has_data: Option<bool>,

    // Lifecycle
    pub lifecycle_entities: Vec<String>,
    pub lifecycle_cancel: Option<CancellationToken>,
    pub lifecycle_build_succeeded: Option<bool>,
    pub lifecycle_start_succeeded: Option<bool>,
}

impl std::fmt::Debug for ReplayWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplayWorld")
            .field("entities", &self.entities)
            .field("intervals", &self.intervals)
            .field("clock", &self.clock)
            .field("last_mutation", &self.last_mutation)
            .finish_non_exhaustive()
    }
}

impl ReplayWorld {
    pub fn add_entity(&mut self, entity_id: &str) {
        if !self.entities.iter().any(|e| e == entity_id) {
            self.entities.push(entity_id.to_string());
        }
    }

    pub fn rule(&self, entity_id: &str) -> EntityRule {
        self.rules
            .get(entity_id)
            .cloned()
            .unwrap_or_else(|| EntityRule::resolve(entity_id, None, None))
    }

    pub fn tracked_entities(&self) -> Vec<TrackedEntity> {
        self.entities
            .iter()
            .map(|id| TrackedEntity {
                entity_id: id.clone(),
                device_label: id.clone(),
                rule: self.rule(id),
                room: None,
                layer: 1,
            })
            .collect()
    }

    /// The engine over the fakes, created on first use
    pub fn engine(&mut self) -> Arc<Engine> {
        if let Some(engine) = &self.engine {
            return Arc::clone(engine);
        }
        let settings = EngineSettings {
            offset: FixedOffset::east_opt(0).unwrap().into(),
            entities: self.tracked_entities(),
            sensors: Vec::new(),
            playback: PlaybackDefaults {
                speed: 1.0,
                past_day_start_seconds: 60,
            },
            request_timeout: Duration::from_secs(1),
        };
        let engine = Arc::new(Engine::new(
            settings,
            self.history.clone(),
            self.states.clone(),
            self.time.clone(),
            new_timeline_handle(),
        ));
        self.engine = Some(Arc::clone(&engine));
        engine
    }

    /// Copy the installed intervals out of the engine
    pub async fn sync_intervals(&mut self) {
        let Some(engine) = &self.engine else {
            return;
        };
        let handle = engine.state();
        let state = handle.read().await;
        self.intervals.clear();
        if let Some(timeline) = state.timeline.as_ref() {
            for id in &self.entities {
                self.intervals
                    .insert(id.clone(), timeline.intervals(id).to_vec());
            }
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.time.now().date_naive()
    }
}
