//! Incremental updates of today's intervals from live state changes

use crate::classifier::classify;
use crate::interval::Interval;
use crate::reconstruct::EntityRef;

/// What a live notification did to an entity's interval set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationResult {
    Unchanged,
    Opened,
    /// Number of ongoing intervals that were closed
    Closed(usize),
}

impl MutationResult {
    pub fn changed(&self) -> bool {
        !matches!(self, MutationResult::Unchanged | MutationResult::Closed(0))
    }
}

/// Apply one live state change to an entity's intervals.
///
/// Only the live day is mutated; a notification for any other day is
/// dropped. A repeated "on" while already active leaves the set untouched.
pub fn on_state_change(
    intervals: &mut Vec<Interval>,
    entity: EntityRef<'_>,
    new_raw_value: Option<&str>,
    now_seconds: u32,
    is_today: bool,
) -> MutationResult {
    if !is_today {
        tracing::trace!("Ignoring state change for {} outside the live day", entity.entity_id);
        return MutationResult::Unchanged;
    }

    if classify(new_raw_value, entity.rule) {
        open_if_inactive(intervals, entity, now_seconds)
    } else {
        let closed = intervals
            .iter_mut()
            .filter(|i| i.is_ongoing())
            .map(|i| i.close(now_seconds))
            .filter(|closed| *closed)
            .count();
        if closed > 0 {
            tracing::debug!("{} turned off at {}s", entity.entity_id, now_seconds);
        }
        MutationResult::Closed(closed)
    }
}

/// Make today's set agree with the entity's current live value on first load.
pub fn reconcile_at_startup(
    intervals: &mut Vec<Interval>,
    entity: EntityRef<'_>,
    current_raw_value: Option<&str>,
    now_seconds: u32,
) -> MutationResult {
    if !classify(current_raw_value, entity.rule) {
        return MutationResult::Unchanged;
    }
    open_if_inactive(intervals, entity, now_seconds)
}

fn open_if_inactive(
    intervals: &mut Vec<Interval>,
    entity: EntityRef<'_>,
    now_seconds: u32,
) -> MutationResult {
    let already_active = intervals
        .iter()
        .any(|i| i.is_ongoing() || i.contains(now_seconds));
    if already_active {
        return MutationResult::Unchanged;
    }

    tracing::debug!("{} turned on at {}s", entity.entity_id, now_seconds);
    intervals.push(Interval::ongoing(
        entity.entity_id,
        entity.device_label,
        now_seconds,
    ));
    MutationResult::Opened
}
