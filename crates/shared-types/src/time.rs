//! # Time Primitives
//!
//! Wall-clock timestamps and the calendar-month window used by the monthly
//! conversion throttle. Months are UTC calendar months.

use chrono::{DateTime, Datelike, Days, Months, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::TypeError;

/// Wall-clock instant in UTC.
pub type Timestamp = DateTime<Utc>;

/// First-of-month key identifying a calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MonthKey(NaiveDate);

impl MonthKey {
    /// The month containing `at`.
    pub fn containing(at: Timestamp) -> Self {
        let date = at.date_naive();
        Self(date - Days::new(u64::from(date.day0())))
    }

    /// First day of the month.
    pub fn first_day(&self) -> NaiveDate {
        self.0
    }

    /// The following calendar month.
    pub fn next(&self) -> Self {
        Self(self.0 + Months::new(1))
    }

    /// Inclusive start of the month window.
    pub fn start(&self) -> Timestamp {
        Utc.from_utc_datetime(&self.0.and_time(NaiveTime::MIN))
    }

    /// Exclusive end of the month window.
    pub fn end(&self) -> Timestamp {
        self.next().start()
    }

    /// Whether `at` falls inside `[start, end)`.
    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.start() && at < self.end()
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

impl FromStr for MonthKey {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let candidate = if s.len() == 7 {
            format!("{s}-01")
        } else {
            s.to_string()
        };
        match NaiveDate::parse_from_str(&candidate, "%Y-%m-%d") {
            Ok(date) if date.day() == 1 => Ok(Self(date)),
            _ => Err(TypeError::InvalidMonthKey(s.to_string())),
        }
    }
}
