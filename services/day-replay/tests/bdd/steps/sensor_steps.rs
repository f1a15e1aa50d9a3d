//! BDD step definitions for sensor sampling feature

use chrono::{FixedOffset, TimeZone, Utc};
use cucumber::{given, then, when};

use day_replay::sampler::SensorPoint;

use crate::world::ReplayWorld;

#[given(expr = "sensor {string} with readings {string}")]
fn sensor_with_readings(world: &mut ReplayWorld, entity_id: String, readings: String) {
    let utc = FixedOffset::east_opt(0).unwrap();
    let midnight = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    let points = readings
        .split(',')
        .map(str::trim)
        .map(|entry| {
            let (seconds, value) = entry
                .split_once('=')
                .unwrap_or_else(|| panic!("expected seconds=value, got '{}'", entry));
            let seconds: i64 = seconds.parse().unwrap();
            SensorPoint::new(
                &entity_id,
                midnight + chrono::Duration::seconds(seconds),
                utc,
                value,
                serde_json::Value::Null,
            )
        })
        .collect();
    world.sampler.insert(&entity_id, points);
}

#[when(expr = "{string} is sampled at {int} seconds")]
fn sensor_sampled(world: &mut ReplayWorld, entity_id: String, seconds: u32) {
    world.reading = world.sampler.nearest(&entity_id, seconds).cloned();
}

#[then(expr = "the reading taken at {int} seconds is returned")]
fn reading_returned(world: &mut ReplayWorld, seconds: u32) {
    let reading = world.reading.as_ref().expect("no reading");
    assert_eq!(reading.seconds_of_day, seconds);
}

#[then("no reading is returned")]
fn no_reading(world: &mut ReplayWorld) {
    assert!(world.reading.is_none());
}

#[then(expr = "the reading displays as {string} with unit {string} and name {string}")]
fn reading_displays(world: &mut ReplayWorld, expected: String, unit: String, name: String) {
    let reading = world.reading.as_ref().expect("no reading");
    assert_eq!(
        reading.display_value(Some(&unit), Some(&name)),
        expected
    );
}
