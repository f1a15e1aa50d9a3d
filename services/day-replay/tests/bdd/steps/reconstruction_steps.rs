//! BDD step definitions for interval reconstruction feature

use chrono::FixedOffset;
use cucumber::{given, then, when};

use day_replay::classifier::EntityRule;
use day_replay::interval::Interval;
use day_replay::reconstruct::{reconstruct, DayContext, EntityRef};
use day_replay::time_math::format_hhmm;

use crate::world::{hhmm, parse_samples, reference_day, ReplayWorld};

fn run_reconstruction(world: &mut ReplayWorld, now: Option<u32>) {
    let utc = FixedOffset::east_opt(0).unwrap();
    world.intervals.clear();
    for id in world.entities.clone() {
        let rule = world.rule(&id);
        let entity = EntityRef {
            entity_id: &id,
            device_label: &id,
            rule: &rule,
        };
        let day = match now {
            Some(now_seconds) => DayContext::Today {
                now_seconds,
                live_state: world.live_states.get(&id).map(String::as_str),
            },
            None => DayContext::Past,
        };
        let samples = world.samples.get(&id).cloned().unwrap_or_default();
        let intervals = reconstruct(entity, &samples, utc, day);
        world.intervals.insert(id, intervals);
    }
}

// --- Given steps ---

#[given(expr = "entity {string} with samples {string}")]
fn entity_with_samples(world: &mut ReplayWorld, entity_id: String, samples: String) {
    world.add_entity(&entity_id);
    let parsed = parse_samples(&entity_id, reference_day(), &samples);
    world.samples.insert(entity_id, parsed);
}

#[given(expr = "entity {string} treats {string} as on")]
fn entity_with_on_value(world: &mut ReplayWorld, entity_id: String, value: String) {
    let rule = EntityRule::resolve(&entity_id, None, Some(&value));
    world.rules.insert(entity_id, rule);
}

#[given(expr = "entity {string} treats only {string} as on")]
fn entity_with_on_values(world: &mut ReplayWorld, entity_id: String, values: String) {
    let values: Vec<String> = values.split(',').map(|v| v.trim().to_string()).collect();
    let rule = EntityRule::resolve(&entity_id, Some(&values), None);
    world.rules.insert(entity_id, rule);
}

#[given(expr = "the live state of {string} is {string}")]
fn live_state_is(world: &mut ReplayWorld, entity_id: String, state: String) {
    world
        .states
        .states
        .lock()
        .unwrap()
        .insert(entity_id.clone(), state.clone());
    world.live_states.insert(entity_id, state);
}

#[given(expr = "a closed interval of {string} from {string} to {string}")]
fn closed_interval(world: &mut ReplayWorld, entity_id: String, start: String, end: String) {
    world.add_entity(&entity_id);
    let interval = Interval::closed(&entity_id, &entity_id, hhmm(&start), hhmm(&end));
    world.intervals.entry(entity_id).or_default().push(interval);
}

// --- When steps ---

#[when("the day is reconstructed as a past day")]
fn reconstructed_as_past_day(world: &mut ReplayWorld) {
    run_reconstruction(world, None);
}

#[when(expr = "the day is reconstructed as today at {string}")]
fn reconstructed_as_today(world: &mut ReplayWorld, now: String) {
    run_reconstruction(world, Some(hhmm(&now)));
}

// --- Then steps ---

#[then(expr = "entity {string} has {int} interval(s)")]
fn entity_has_intervals(world: &mut ReplayWorld, entity_id: String, count: usize) {
    let intervals = world.intervals.get(&entity_id).cloned().unwrap_or_default();
    assert_eq!(
        intervals.len(),
        count,
        "unexpected intervals for {}: {:?}",
        entity_id,
        intervals
    );
}

#[then(expr = "interval {int} of {string} runs from {string} to {string}")]
fn interval_runs(
    world: &mut ReplayWorld,
    index: usize,
    entity_id: String,
    start: String,
    end: String,
) {
    let intervals = &world.intervals[&entity_id];
    let interval = &intervals[index - 1];
    assert_eq!(format_hhmm(interval.start_seconds), start);
    let actual_end = interval
        .end_seconds()
        .unwrap_or_else(|| panic!("interval {} of {} is still ongoing", index, entity_id));
    assert_eq!(format_hhmm(actual_end), end);
}

#[then(expr = "interval {int} of {string} is ongoing from {string}")]
fn interval_is_ongoing(world: &mut ReplayWorld, index: usize, entity_id: String, start: String) {
    let intervals = &world.intervals[&entity_id];
    let interval = &intervals[index - 1];
    assert!(interval.is_ongoing(), "expected ongoing, got {:?}", interval);
    assert_eq!(format_hhmm(interval.start_seconds), start);
}

#[then(expr = "interval {int} of {string} renders as {int} segment(s) totalling {int} minutes")]
fn interval_renders(
    world: &mut ReplayWorld,
    index: usize,
    entity_id: String,
    count: usize,
    minutes: u32,
) {
    let interval = &world.intervals[&entity_id][index - 1];
    let segments = interval.render_segments(None);
    assert_eq!(segments.len(), count);
    let total: u32 = segments.iter().map(|s| s.duration_seconds()).sum();
    assert_eq!(total, minutes * 60);
    assert_eq!(interval.duration_seconds(0), minutes * 60);
}
