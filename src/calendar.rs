//! Week-of-month numbering.
//!
//! A date maps to a `(year, month, week)` triple. Weeks begin on a
//! configurable weekday, and the first week of a month is the one holding
//! at least `minimal_days` days of that month; days before it fall in
//! week 0. The default (weeks start on Sunday, one minimal day) is the
//! Korean locale scheme, under which every month starts in week 1.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Offset, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Calendar position of a date under a [`Calendar`] scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WeekKey {
    pub year: i32,
    pub month: u32,
    pub week: u32,
}

impl fmt::Display for WeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02} week {}", self.year, self.month, self.week)
    }
}

/// Week numbering rules plus the offset used to turn instants into local dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Calendar {
    week_start: Weekday,
    minimal_days: u32,
    offset: FixedOffset,
}

impl Default for Calendar {
    fn default() -> Self {
        Self::korean()
    }
}

impl Calendar {
    /// `minimal_days` is clamped to 1..=7.
    pub fn new(week_start: Weekday, minimal_days: u32, offset: FixedOffset) -> Self {
        Self {
            week_start,
            minimal_days: minimal_days.clamp(1, 7),
            offset,
        }
    }

    /// Sunday-first weeks, first week may hold a single day.
    pub fn korean() -> Self {
        Self::new(Weekday::Sun, 1, utc())
    }

    /// Week of month for `date`, 0 when it precedes the first full-enough week.
    pub fn week_of_month(&self, date: NaiveDate) -> u32 {
        let day = date.day() as i64;
        let dow = self.localized_day_of_week(date.weekday());
        let start_of_week = (day - dow).rem_euclid(7);
        let offset = if start_of_week + 1 > self.minimal_days as i64 {
            7 - start_of_week
        } else {
            -start_of_week
        };
        ((7 + offset + (day - 1)) / 7) as u32
    }

    pub fn week_key(&self, date: NaiveDate) -> WeekKey {
        WeekKey {
            year: date.year(),
            month: date.month(),
            week: self.week_of_month(date),
        }
    }

    /// Local calendar date of an instant.
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// Both dates share year, month and week.
    pub fn same_week(&self, a: NaiveDate, b: NaiveDate) -> bool {
        self.week_key(a) == self.week_key(b)
    }

    // 1 for the first day of the week, 7 for the last.
    fn localized_day_of_week(&self, weekday: Weekday) -> i64 {
        let from = self.week_start.num_days_from_monday() as i64;
        let to = weekday.num_days_from_monday() as i64;
        (to - from).rem_euclid(7) + 1
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}
