//! Engine: day changes, live updates and periodic refreshes

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::clock::{ClockSnapshot, PlaybackClock};
use crate::config::Config;
use crate::error::{ReplayError, Result};
use crate::history::{HistoryProvider, SensorSample};
use crate::live::{
    run_live, select_source, LiveEventSource, LiveMode, StateChangeEvent, StateChangeSink,
    StateReader,
};
use crate::merger::MutationResult;
use crate::reconstruct::Sample;
use crate::sampler::SensorPoint;
use crate::state::TimelineHandle;
use crate::time_math::{day_bounds, local_date, seconds_of_day, DayOffset};
use crate::timeline::{
    DayData, DayKind, DayTimeline, PlaybackDefaults, TrackedEntity, TrackedSensor,
};

/// Source of wall-clock time
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// What the engine tracks and how it builds a day
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub offset: DayOffset,
    pub entities: Vec<TrackedEntity>,
    pub sensors: Vec<TrackedSensor>,
    pub playback: PlaybackDefaults,
    pub request_timeout: Duration,
}

impl EngineSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            offset: config.offset()?,
            entities: config.tracked_entities(),
            sensors: config.tracked_sensors(),
            playback: config.playback.defaults(),
            request_timeout: Duration::from_secs(config.history.request_timeout_seconds),
        })
    }
}

/// Periods of the engine's background timers
#[derive(Debug, Clone, Copy)]
pub struct TimerSettings {
    pub playback_tick: Duration,
    pub live_refresh: Duration,
    pub ongoing_refresh: Duration,
}

impl TimerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            playback_tick: Duration::from_millis(config.playback.tick_interval_millis),
            live_refresh: Duration::from_secs(config.timers.live_refresh_seconds),
            ongoing_refresh: Duration::from_secs(config.timers.ongoing_refresh_seconds),
        }
    }
}

/// How live updates are obtained
pub struct LiveSettings {
    pub subscriber: Option<Arc<dyn LiveEventSource>>,
    pub poll_interval: Duration,
}

/// The engine owns the selected day and is the only writer of shared state
pub struct Engine {
    settings: EngineSettings,
    history: Arc<dyn HistoryProvider>,
    states: Arc<dyn StateReader>,
    time: Arc<dyn TimeSource>,
    state: TimelineHandle,
}

enum Fetched {
    Entity(String, Vec<Sample>),
    Sensor(String, Vec<SensorSample>),
}

impl Engine {
    pub fn new(
        settings: EngineSettings,
        history: Arc<dyn HistoryProvider>,
        states: Arc<dyn StateReader>,
        time: Arc<dyn TimeSource>,
        state: TimelineHandle,
    ) -> Self {
        Self {
            settings,
            history,
            states,
            time,
            state,
        }
    }

    pub fn state(&self) -> TimelineHandle {
        Arc::clone(&self.state)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn today(&self) -> NaiveDate {
        let now = self.time.now();
        local_date(now, self.settings.offset.at(now))
    }

    /// Seconds-of-day of the wall clock on today's axis
    pub fn now_seconds(&self) -> u32 {
        let now = self.time.now();
        let today = local_date(now, self.settings.offset.at(now));
        seconds_of_day(now, self.settings.offset.for_day(today))
    }

    /// Rebuild everything for `date` and install it unless a newer day
    /// change started meanwhile. Returns whether it was installed.
    pub async fn select_day(&self, date: NaiveDate) -> bool {
        let generation = self.state.write().await.begin_day_change(date);
        tracing::info!("Loading {} (generation {})", date, generation);

        let timeline = self.build_day(date).await;
        let now = self.now_seconds();

        let mut state = self.state.write().await;
        if state.install(generation, timeline, now) {
            tracing::info!("Installed timeline for {}", date);
            true
        } else {
            tracing::debug!(
                "Discarding data for {} (generation {} superseded by {})",
                date,
                generation,
                state.generation
            );
            false
        }
    }

    pub async fn select_today(&self) -> bool {
        self.select_day(self.today()).await
    }

    /// Move the selection by a number of days relative to the last request.
    /// Returns the target day and whether it was installed.
    pub async fn shift_day(&self, days: i64) -> Result<(NaiveDate, bool)> {
        let base = self.state.read().await.requested_date.unwrap_or_else(|| self.today());
        let target = base
            .checked_add_signed(chrono::Duration::days(days))
            .ok_or_else(|| ReplayError::InvalidDate(format!("{} shifted by {} days", base, days)))?;
        let installed = self.select_day(target).await;
        Ok((target, installed))
    }

    /// Whether any tracked entity was active on `date`. Nothing is installed.
    pub async fn day_has_data(&self, date: NaiveDate) -> bool {
        self.build_day(date).await.has_data()
    }

    async fn build_day(&self, date: NaiveDate) -> DayTimeline {
        let data = self.fetch_day(date).await;
        let settings = &self.settings;
        let offset = settings.offset.for_day(date);

        if date != self.today() {
            return DayTimeline::build(
                date,
                offset,
                &settings.entities,
                &settings.sensors,
                data,
                &DayKind::Past,
                settings.playback,
            );
        }

        let live_states = self.read_live_states().await;
        let now = self.now_seconds();
        let day = DayKind::Today {
            now_seconds: now,
            live_states,
        };
        let mut timeline = DayTimeline::build(
            date,
            offset,
            &settings.entities,
            &settings.sensors,
            data,
            &day,
            settings.playback,
        );
        if let DayKind::Today { live_states, .. } = &day {
            let opened = timeline.reconcile_at_startup(live_states, now);
            if opened > 0 {
                tracing::debug!("Opened {} interval(s) from current live states", opened);
            }
        }
        timeline
    }

    /// Fetch every entity and sensor concurrently and wait for all of them.
    /// A failed or timed out request counts as no data for that entity.
    async fn fetch_day(&self, date: NaiveDate) -> DayData {
        let offset = self.settings.offset.for_day(date);
        let (start, end) = day_bounds(date, offset);
        let timeout = self.settings.request_timeout;
        let mut requests = JoinSet::new();

        for entity in &self.settings.entities {
            let history = Arc::clone(&self.history);
            let id = entity.entity_id.clone();
            requests.spawn(async move {
                let result =
                    tokio::time::timeout(timeout, history.fetch_history(&id, start, end)).await;
                let samples = or_empty(&id, result);
                Fetched::Entity(id, samples)
            });
        }

        for sensor in &self.settings.sensors {
            let history = Arc::clone(&self.history);
            let id = sensor.entity_id.clone();
            requests.spawn(async move {
                let result =
                    tokio::time::timeout(timeout, history.fetch_sensor_history(&id, start, end))
                        .await;
                let samples = or_empty(&id, result);
                Fetched::Sensor(id, samples)
            });
        }

        let mut data = DayData::default();
        while let Some(joined) = requests.join_next().await {
            match joined {
                Ok(Fetched::Entity(id, samples)) => {
                    data.samples.insert(id, samples);
                }
                Ok(Fetched::Sensor(id, samples)) => {
                    let points = samples
                        .into_iter()
                        .map(|s| {
                            SensorPoint::new(
                                &s.entity_id,
                                s.timestamp,
                                offset,
                                &s.value,
                                s.attributes,
                            )
                        })
                        .collect();
                    data.sensor_points.insert(id, points);
                }
                Err(e) => tracing::warn!("History request task failed: {}", e),
            }
        }
        data
    }

    async fn read_live_states(&self) -> HashMap<String, String> {
        let timeout = self.settings.request_timeout;
        let mut live_states = HashMap::new();
        for entity in &self.settings.entities {
            let id = &entity.entity_id;
            match tokio::time::timeout(timeout, self.states.current_state(id)).await {
                Ok(Ok(Some(state))) => {
                    live_states.insert(id.clone(), state);
                }
                Ok(Ok(None)) => tracing::debug!("No current state for {}", id),
                Ok(Err(e)) => tracing::warn!("Reading current state of {} failed: {}", id, e),
                Err(_) => tracing::warn!("Reading current state of {} timed out", id),
            }
        }
        live_states
    }

    /// Apply one live state change to the installed day.
    pub async fn handle_event(&self, event: StateChangeEvent) -> MutationResult {
        let today = self.today();
        let now = self.now_seconds();
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let Some(timeline) = state.timeline.as_mut() else {
            return MutationResult::Unchanged;
        };
        if timeline.date() != today {
            return MutationResult::Unchanged;
        }

        let result = timeline.apply_state_change(&event.entity_id, event.new_state.as_deref(), now);
        if result.changed() {
            tracing::debug!(
                "{} -> {:?} changed the timeline ({:?})",
                event.entity_id,
                event.new_state,
                result
            );
            state.ongoing_durations = timeline.ongoing_durations(now);
        }
        result
    }

    /// Read every entity's current state and apply it to today's timeline
    /// as a state change. Returns the states read.
    pub async fn sync_live_states(&self) -> HashMap<String, String> {
        let live_states = self.read_live_states().await;
        let timestamp = self.time.now();
        for (entity_id, state) in &live_states {
            let result = self
                .handle_event(StateChangeEvent {
                    entity_id: entity_id.clone(),
                    new_state: Some(state.clone()),
                    timestamp,
                })
                .await;
            if result.changed() {
                tracing::info!("{} changed to {} while live updates started", entity_id, state);
            }
        }
        live_states
    }

    /// Fast refresh: advance the live bound and "now" marker.
    pub async fn refresh_live_bound(&self) {
        let today = self.today();
        let now = self.now_seconds();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(timeline) = state.timeline.as_mut().filter(|t| t.date() == today) {
            timeline.clock_mut().refresh_live_bound(now);
            state.live_now_seconds = Some(now);
        }
    }

    /// Slow refresh: recompute the elapsed time of ongoing intervals.
    pub async fn refresh_ongoing(&self) {
        let today = self.today();
        let now = self.now_seconds();
        let mut guard = self.state.write().await;
        let state = &mut *guard;
        if let Some(timeline) = state.timeline.as_ref().filter(|t| t.date() == today) {
            state.ongoing_durations = timeline.ongoing_durations(now);
        }
    }

    /// One playback step.
    pub async fn tick_playback(&self) {
        let today = self.today();
        let now = self.now_seconds();
        let mut state = self.state.write().await;
        if let Some(timeline) = state.timeline.as_mut() {
            let is_live = timeline.date() == today;
            let clock = timeline.clock_mut();
            if is_live {
                clock.refresh_live_bound(now);
            }
            clock.tick();
        }
    }

    pub async fn clock_snapshot(&self) -> Result<ClockSnapshot> {
        self.with_clock(|_| Ok(())).await
    }

    pub async fn play(&self) -> Result<ClockSnapshot> {
        self.with_clock(|clock| {
            clock.play();
            Ok(())
        })
        .await
    }

    pub async fn pause(&self) -> Result<ClockSnapshot> {
        self.with_clock(|clock| {
            clock.pause();
            Ok(())
        })
        .await
    }

    pub async fn seek(&self, seconds: u32) -> Result<ClockSnapshot> {
        self.with_clock(|clock| {
            clock.seek(seconds);
            Ok(())
        })
        .await
    }

    pub async fn set_speed(&self, multiplier: f64) -> Result<ClockSnapshot> {
        self.with_clock(|clock| clock.set_speed(multiplier)).await
    }

    async fn with_clock<F>(&self, operation: F) -> Result<ClockSnapshot>
    where
        F: FnOnce(&mut PlaybackClock) -> Result<()>,
    {
        let today = self.today();
        let now = self.now_seconds();
        let mut state = self.state.write().await;
        let timeline = state.timeline.as_mut().ok_or(ReplayError::NoDaySelected)?;
        let is_live = timeline.date() == today;
        let clock = timeline.clock_mut();
        if is_live {
            clock.refresh_live_bound(now);
        }
        operation(clock)?;
        Ok(clock.snapshot())
    }

    /// Run live updates and timers. Returns when the cancellation token is
    /// triggered and every task has stopped.
    pub async fn run(
        self: Arc<Self>,
        timers: TimerSettings,
        live: LiveSettings,
        cancel: CancellationToken,
    ) {
        let mut handles = Vec::new();

        let engine = Arc::clone(&self);
        handles.push(spawn_periodic(
            "playback ticker",
            timers.playback_tick,
            cancel.clone(),
            move || {
                let engine = Arc::clone(&engine);
                async move { engine.tick_playback().await }
            },
        ));

        let engine = Arc::clone(&self);
        handles.push(spawn_periodic(
            "live refresh",
            timers.live_refresh,
            cancel.clone(),
            move || {
                let engine = Arc::clone(&engine);
                async move { engine.refresh_live_bound().await }
            },
        ));

        let engine = Arc::clone(&self);
        handles.push(spawn_periodic(
            "ongoing refresh",
            timers.ongoing_refresh,
            cancel.clone(),
            move || {
                let engine = Arc::clone(&engine);
                async move { engine.refresh_ongoing().await }
            },
        ));

        let engine = Arc::clone(&self);
        let cancel_for_live = cancel.clone();
        handles.push(tokio::spawn(async move {
            let setup = async {
                let source = select_source(
                    live.subscriber.as_deref(),
                    live.poll_interval,
                    &cancel_for_live,
                )
                .await;
                // Changes between loading today and the source coming up
                let last_seen = engine.sync_live_states().await;
                (source, last_seen)
            };
            let (source, last_seen) = tokio::select! {
                _ = cancel_for_live.cancelled() => return,
                ready = setup => ready,
            };
            let entity_ids = engine
                .settings
                .entities
                .iter()
                .map(|e| e.entity_id.clone())
                .collect();
            let reader = Arc::clone(&engine.states);
            run_live(
                source,
                entity_ids,
                last_seen,
                reader,
                live.poll_interval,
                engine,
                cancel_for_live,
            )
            .await;
            tracing::debug!("Live updates stopped");
        }));

        // Wait for cancellation
        cancel.cancelled().await;
        tracing::debug!("Engine shutting down");

        // Wait for all tasks to finish
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[async_trait]
impl StateChangeSink for Engine {
    async fn on_event(&self, event: StateChangeEvent) {
        self.handle_event(event).await;
    }

    async fn on_mode(&self, mode: LiveMode) {
        self.state.write().await.live_mode = mode;
    }
}

fn or_empty<T>(
    entity_id: &str,
    result: std::result::Result<Result<Vec<T>>, tokio::time::error::Elapsed>,
) -> Vec<T> {
    match result {
        Ok(Ok(items)) => items,
        Ok(Err(e)) => {
            tracing::warn!("History for {} unavailable: {}", entity_id, e);
            Vec::new()
        }
        Err(_) => {
            tracing::warn!("History for {} timed out", entity_id);
            Vec::new()
        }
    }
}

fn spawn_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    cancel: CancellationToken,
    mut task: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("{} cancelled", name);
                    break;
                }
                _ = ticker.tick() => task().await,
            }
        }
    })
}
