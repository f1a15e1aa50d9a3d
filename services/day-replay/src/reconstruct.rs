//! Rebuild one entity's active intervals from its historical samples

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::{classify, EntityRule};
use crate::interval::Interval;
use crate::time_math::{seconds_of_day, SECONDS_PER_DAY};

/// One historical state sample of an on/off entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub entity_id: String,
    pub timestamp: DateTime<Utc>,
    pub raw_value: Option<String>,
}

impl Sample {
    pub fn new(entity_id: &str, timestamp: DateTime<Utc>, raw_value: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            timestamp,
            raw_value: Some(raw_value.to_string()),
        }
    }
}

/// How the reconstructed day relates to the wall clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DayContext<'a> {
    /// A frozen past day; an interval left open closes at end of day
    Past,
    /// The live day, with the entity's current raw state if it is known
    Today {
        now_seconds: u32,
        live_state: Option<&'a str>,
    },
}

/// Who the intervals belong to and how they are classified
#[derive(Debug, Clone, Copy)]
pub struct EntityRef<'a> {
    pub entity_id: &'a str,
    pub device_label: &'a str,
    pub rule: &'a EntityRule,
}

/// Scan samples in time order and emit the entity's intervals for the day.
///
/// Samples sharing a timestamp keep their input order. No samples means no
/// intervals.
pub fn reconstruct(
    entity: EntityRef<'_>,
    samples: &[Sample],
    offset: FixedOffset,
    day: DayContext<'_>,
) -> Vec<Interval> {
    let mut ordered: Vec<&Sample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.timestamp);

    let mut intervals = Vec::new();
    let mut pending: Option<u32> = None;

    for sample in ordered {
        let at = seconds_of_day(sample.timestamp, offset);
        if classify(sample.raw_value.as_deref(), entity.rule) {
            if pending.is_none() {
                pending = Some(at);
            }
        } else if let Some(start) = pending.take() {
            intervals.push(Interval::closed(
                entity.entity_id,
                entity.device_label,
                start,
                at,
            ));
        }
    }

    if let Some(start) = pending {
        let last = match day {
            DayContext::Today {
                now_seconds,
                live_state,
            } => {
                if classify(live_state, entity.rule) {
                    Interval::ongoing(entity.entity_id, entity.device_label, start)
                } else {
                    Interval::closed(entity.entity_id, entity.device_label, start, now_seconds)
                }
            }
            DayContext::Past => Interval::closed(
                entity.entity_id,
                entity.device_label,
                start,
                SECONDS_PER_DAY,
            ),
        };
        intervals.push(last);
    }

    tracing::trace!(
        "Reconstructed {} interval(s) for {} from {} sample(s)",
        intervals.len(),
        entity.entity_id,
        samples.len()
    );
    intervals
}
