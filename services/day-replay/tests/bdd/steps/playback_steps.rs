//! BDD step definitions for playback clock feature

use cucumber::{given, then, when};

use day_replay::clock::PlaybackClock;
use day_replay::time_math::format_hhmm;

use crate::world::{hhmm, ReplayWorld};

fn clock(world: &mut ReplayWorld) -> &mut PlaybackClock {
    world.clock.as_mut().expect("no playback clock")
}

#[given("a playback clock for a past day")]
fn clock_for_past_day(world: &mut ReplayWorld) {
    world.clock = Some(PlaybackClock::for_day(None, 60, 1.0));
}

#[given(expr = "a playback clock for today at {string}")]
fn clock_for_today(world: &mut ReplayWorld, now: String) {
    world.clock = Some(PlaybackClock::for_day(Some(hhmm(&now)), 60, 1.0));
}

#[when(expr = "the clock seeks to {string}")]
fn clock_seeks(world: &mut ReplayWorld, time: String) {
    clock(world).seek(hhmm(&time));
}

#[when(expr = "the clock seeks to {int} seconds")]
fn clock_seeks_seconds(world: &mut ReplayWorld, seconds: u32) {
    clock(world).seek(seconds);
}

#[when("playback starts")]
fn playback_starts(world: &mut ReplayWorld) {
    clock(world).play();
}

#[when("playback pauses")]
fn playback_pauses(world: &mut ReplayWorld) {
    clock(world).pause();
}

#[when(expr = "the speed is set to {float}")]
fn speed_set(world: &mut ReplayWorld, multiplier: f64) {
    let rejected = clock(world).set_speed(multiplier).is_err();
    world.speed_rejected = Some(rejected);
}

#[when(expr = "the clock ticks {int} time(s)")]
fn clock_ticks(world: &mut ReplayWorld, ticks: usize) {
    let clock = clock(world);
    for _ in 0..ticks {
        clock.tick();
    }
}

#[when(expr = "the live time advances to {string}")]
fn live_time_advances(world: &mut ReplayWorld, now: String) {
    clock(world).refresh_live_bound(hhmm(&now));
}

#[then(expr = "the clock reads {string}")]
fn clock_reads(world: &mut ReplayWorld, time: String) {
    assert_eq!(format_hhmm(clock(world).current_seconds()), time);
}

#[then(expr = "the clock is {word}")]
fn clock_is(world: &mut ReplayWorld, status: String) {
    let playing = clock(world).is_playing();
    match status.as_str() {
        "playing" => assert!(playing, "expected the clock to be playing"),
        "stopped" => assert!(!playing, "expected the clock to be stopped"),
        other => panic!("unknown clock status: {}", other),
    }
}

#[then(expr = "the upper bound is {string}")]
fn upper_bound_is(world: &mut ReplayWorld, time: String) {
    assert_eq!(format_hhmm(clock(world).upper_bound_seconds()), time);
}

#[then(expr = "the speed change is {word}")]
fn speed_change_is(world: &mut ReplayWorld, outcome: String) {
    let expected = match outcome.as_str() {
        "rejected" => true,
        "accepted" => false,
        other => panic!("unknown outcome: {}", other),
    };
    assert_eq!(world.speed_rejected, Some(expected));
}
