//! Conversions between wall-clock time and the seconds-of-day domain

use chrono::{DateTime, Duration, FixedOffset, Local, NaiveDate, NaiveTime, Offset, TimeZone, Timelike, Utc};

/// Number of seconds in a day; the exclusive upper end of the domain.
pub const SECONDS_PER_DAY: u32 = 86_400;

/// Seconds since local midnight for an absolute timestamp.
pub fn seconds_of_day(timestamp: DateTime<Utc>, offset: FixedOffset) -> u32 {
    timestamp.with_timezone(&offset).num_seconds_from_midnight()
}

/// The calendar date an absolute timestamp falls on in the given offset.
pub fn local_date(timestamp: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    timestamp.with_timezone(&offset).date_naive()
}

/// Absolute bounds of a calendar day: local 00:00:00 through 23:59:59.
pub fn day_bounds(day: NaiveDate, offset: FixedOffset) -> (DateTime<Utc>, DateTime<Utc>) {
    let midnight = day.and_time(NaiveTime::MIN);
    let start = match offset.from_local_datetime(&midnight).single() {
        Some(local) => local.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&midnight) - Duration::seconds(offset.local_minus_utc() as i64),
    };
    let end = start + Duration::seconds(SECONDS_PER_DAY as i64 - 1);
    (start, end)
}

/// The host's current local offset.
pub fn local_offset() -> FixedOffset {
    Local::now().offset().fix()
}

/// How absolute timestamps map onto local days.
///
/// A configured offset applies to every day. Without one the host zone is
/// resolved per day at local noon, so a past day on the other side of a
/// daylight saving change keeps its own offset. The offset is constant
/// within a day; the hour a DST switch adds or drops is not modelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayOffset {
    Fixed(FixedOffset),
    HostLocal,
}

impl DayOffset {
    /// Offset used for every timestamp of `day`
    pub fn for_day(&self, day: NaiveDate) -> FixedOffset {
        match self {
            DayOffset::Fixed(offset) => *offset,
            DayOffset::HostLocal => day
                .and_hms_opt(12, 0, 0)
                .and_then(|noon| Local.from_local_datetime(&noon).earliest())
                .map(|noon| noon.offset().fix())
                .unwrap_or_else(local_offset),
        }
    }

    /// Offset in effect at an instant, used to tell which day it is
    pub fn at(&self, instant: DateTime<Utc>) -> FixedOffset {
        match self {
            DayOffset::Fixed(offset) => *offset,
            DayOffset::HostLocal => instant.with_timezone(&Local).offset().fix(),
        }
    }
}

impl From<FixedOffset> for DayOffset {
    fn from(offset: FixedOffset) -> Self {
        DayOffset::Fixed(offset)
    }
}

impl std::fmt::Display for DayOffset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DayOffset::Fixed(offset) => write!(f, "{}", offset),
            DayOffset::HostLocal => write!(f, "host local time ({} now)", local_offset()),
        }
    }
}

/// Build a fixed offset from a configured number of minutes east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes * 60)
}

/// Render seconds-of-day as `HH:MM`. The end-of-day value renders as `23:59`.
pub fn format_hhmm(seconds: u32) -> String {
    let clamped = seconds.min(SECONDS_PER_DAY - 1);
    format!("{:02}:{:02}", clamped / 3600, (clamped % 3600) / 60)
}

/// Parse `HH:MM` (or `HH:MM:SS`) into seconds-of-day.
pub fn parse_hhmm(value: &str) -> Option<u32> {
    let mut parts = value.trim().split(':');
    let hours: u32 = parts.next()?.parse().ok()?;
    let minutes: u32 = parts.next()?.parse().ok()?;
    let seconds: u32 = match parts.next() {
        Some(s) => s.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() || hours > 24 || minutes > 59 || seconds > 59 {
        return None;
    }
    let total = hours * 3600 + minutes * 60 + seconds;
    (total <= SECONDS_PER_DAY).then_some(total)
}

/// Human readable duration: `42s`, `17m`, `3h 05m`.
pub fn format_duration(total_seconds: u32) -> String {
    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    if hours > 0 {
        format!("{}h {:02}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}
