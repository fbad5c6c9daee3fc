// libs/scheduling-cell/src/timewindow.rs
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};

use crate::models::SchedulingError;

/// Daily time window, held as minutes since midnight. All scheduling
/// comparisons happen at minute granularity; seconds on input times are
/// ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    start: u16,
    end: u16,
}

impl TimeWindow {
    pub fn from_minutes(start: u16, end: u16) -> Result<Self, SchedulingError> {
        if end <= start {
            return Err(SchedulingError::InvalidTimeRange);
        }
        Ok(Self { start, end })
    }

    pub fn from_times(start: NaiveTime, end: NaiveTime) -> Result<Self, SchedulingError> {
        Self::from_minutes(minutes_since_midnight(start), minutes_since_midnight(end))
    }

    pub fn start_minutes(&self) -> u16 {
        self.start
    }

    pub fn end_minutes(&self) -> u16 {
        self.end
    }

    pub fn duration_minutes(&self) -> u16 {
        self.end - self.start
    }

    /// Whether two windows conflict. Boundary contact counts: a session
    /// ending at 10:00 conflicts with one starting at 10:00, by policy,
    /// so back-to-back bookings are impossible.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whether `other` fits entirely inside this window. Exact fit counts
    /// as contained.
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

pub fn minutes_since_midnight(t: NaiveTime) -> u16 {
    (t.hour() * 60 + t.minute()) as u16
}

/// Inverse of `minutes_since_midnight`. Values past 23:59 do not name a
/// time of day.
pub fn time_from_minutes(minutes: u16) -> Result<NaiveTime, SchedulingError> {
    NaiveTime::from_hms_opt(u32::from(minutes) / 60, u32::from(minutes) % 60, 0)
        .ok_or(SchedulingError::InvalidTimeRange)
}

/// Day-of-week convention used by availability rules: 0 = Sunday through
/// 6 = Saturday.
pub fn day_of_week(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}
