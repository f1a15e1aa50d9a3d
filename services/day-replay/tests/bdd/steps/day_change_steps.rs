//! BDD step definitions for day change and live merge features

use chrono::Utc;
use cucumber::{given, then, when};

use day_replay::live::StateChangeEvent;
use day_replay::merger::MutationResult;

use crate::world::{instant, parse_date, parse_samples, ReplayWorld};

// --- Given steps ---

#[given(expr = "today is {string} at {string}")]
fn today_is(world: &mut ReplayWorld, date: String, time: String) {
    *world.time.now.lock().unwrap() = instant(parse_date(&date), &time);
}

#[given(expr = "history for {string} on {string} is {string}")]
fn history_for(world: &mut ReplayWorld, entity_id: String, date: String, samples: String) {
    world.add_entity(&entity_id);
    let parsed = parse_samples(&entity_id, parse_date(&date), &samples);
    world
        .history
        .samples
        .lock()
        .unwrap()
        .entry(entity_id)
        .or_default()
        .extend(parsed);
}

#[given(expr = "history for {string} is unavailable")]
fn history_unavailable(world: &mut ReplayWorld, entity_id: String) {
    world.add_entity(&entity_id);
    world.history.failing.lock().unwrap().insert(entity_id);
}

// --- When steps ---

#[when("the replay loads today")]
async fn replay_loads_today(world: &mut ReplayWorld) {
    let engine = world.engine();
    engine.select_today().await;
    world.sync_intervals().await;
}

#[when(expr = "the replay loads {string}")]
async fn replay_loads_day(world: &mut ReplayWorld, date: String) {
    let engine = world.engine();
    engine.select_day(parse_date(&date)).await;
    world.sync_intervals().await;
}

#[when(expr = "the selection shifts by {int} day(s)")]
async fn selection_shifts(world: &mut ReplayWorld, days: i64) {
    let engine = world.engine();
    engine.shift_day(days).await.unwrap();
    world.sync_intervals().await;
}

#[when(expr = "the wall clock reaches {string}")]
fn wall_clock_reaches(world: &mut ReplayWorld, time: String) {
    let today = world.today();
    *world.time.now.lock().unwrap() = instant(today, &time);
}

#[when(expr = "{string} reports {string}")]
async fn entity_reports(world: &mut ReplayWorld, entity_id: String, state: String) {
    let engine = world.engine();
    let result = engine
        .handle_event(StateChangeEvent {
            entity_id,
            new_state: Some(state),
            timestamp: Utc::now(),
        })
        .await;
    world.last_mutation = Some(result);
    world.sync_intervals().await;
}

#[when(expr = "day {string} is probed for data")]
async fn day_probed(world: &mut ReplayWorld, date: String) {
    let engine = world.engine();
    world.has_data = Some(engine.day_has_data(parse_date(&date)).await);
}

// --- Then steps ---

#[then(expr = "the selected day is {string}")]
async fn selected_day_is(world: &mut ReplayWorld, date: String) {
    let engine = world.engine();
    let handle = engine.state();
    let state = handle.read().await;
    let timeline = state.timeline.as_ref().expect("no day installed");
    assert_eq!(timeline.date(), parse_date(&date));
}

#[then("the selected day is live")]
async fn selected_day_is_live(world: &mut ReplayWorld) {
    let engine = world.engine();
    let handle = engine.state();
    let state = handle.read().await;
    let timeline = state.timeline.as_ref().expect("no day installed");
    assert!(timeline.is_today());
    assert!(state.live_now_seconds.is_some());
}

#[then("the notification changed nothing")]
fn notification_changed_nothing(world: &mut ReplayWorld) {
    assert_eq!(world.last_mutation, Some(MutationResult::Unchanged));
}

#[then(expr = "the probe reports {word}")]
fn probe_reports(world: &mut ReplayWorld, outcome: String) {
    let expected = match outcome.as_str() {
        "data" => true,
        "nothing" => false,
        other => panic!("unknown probe outcome: {}", other),
    };
    assert_eq!(world.has_data, Some(expected));
}

#[then("no day has been installed")]
async fn no_day_installed(world: &mut ReplayWorld) {
    let engine = world.engine();
    assert!(engine.state().read().await.timeline.is_none());
}
