//! Nearest-in-time lookups over continuous sensor history

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::time_math::seconds_of_day;

/// One historical reading of a sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorPoint {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub seconds_of_day: u32,
    pub value: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl SensorPoint {
    pub fn new(
        entity_id: &str,
        timestamp: DateTime<Utc>,
        offset: FixedOffset,
        value: &str,
        attributes: serde_json::Value,
    ) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            timestamp,
            seconds_of_day: seconds_of_day(timestamp, offset),
            value: value.to_string(),
            attributes,
        }
    }

    /// Human readable value, e.g. `Power: 230 W` or `7.5 kWh`.
    ///
    /// Numbers below ten keep one decimal, larger ones are rounded.
    /// Non-numeric values are shown as-is.
    pub fn display_value(&self, unit: Option<&str>, name: Option<&str>) -> String {
        let value = match self.value.trim().parse::<f64>() {
            Ok(number) if number.is_finite() && number < 10.0 => format!("{:.1}", number),
            Ok(number) if number.is_finite() => format!("{}", number.round() as i64),
            _ => self.value.clone(),
        };
        let with_unit = match unit.filter(|u| !u.is_empty()) {
            Some(unit) => format!("{} {}", value, unit),
            None => value,
        };
        match name.filter(|n| !n.is_empty()) {
            Some(name) => format!("{}: {}", name, with_unit),
            None => with_unit,
        }
    }
}

/// Read-only per-sensor index, rebuilt for every selected day.
#[derive(Debug, Clone, Default)]
pub struct SensorSampler {
    points: HashMap<String, Vec<SensorPoint>>,
}

impl SensorSampler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the points of one sensor. Points are ordered by time of day;
    /// points sharing a time keep their input order.
    pub fn insert(&mut self, entity_id: &str, mut points: Vec<SensorPoint>) {
        points.sort_by_key(|p| p.seconds_of_day);
        self.points.insert(entity_id.to_string(), points);
    }

    pub fn points(&self, entity_id: &str) -> &[SensorPoint] {
        self.points
            .get(entity_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn entity_ids(&self) -> impl Iterator<Item = &str> {
        self.points.keys().map(String::as_str)
    }

    /// The point closest to `target_seconds`; on a tie the earlier point wins.
    pub fn nearest(&self, entity_id: &str, target_seconds: u32) -> Option<&SensorPoint> {
        let points = self.points(entity_id);
        if points.is_empty() {
            return None;
        }

        let after = points.partition_point(|p| p.seconds_of_day < target_seconds);
        if after == 0 {
            return points.first();
        }

        // First point of the run sharing the closest earlier time
        let before_seconds = points[after - 1].seconds_of_day;
        let before = points.partition_point(|p| p.seconds_of_day < before_seconds);

        match points.get(after) {
            Some(next) if next.seconds_of_day - target_seconds < target_seconds - before_seconds => {
                Some(next)
            }
            _ => points.get(before),
        }
    }
}
