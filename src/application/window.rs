//! Query time ranges and their split into fixed-length windows

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use std::fmt;

use crate::error::{Error, Result};

/// Half-open UTC interval `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidTimeRange(format!(
                "start {start} is not before end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse an RFC3339 `--from` / `--to` pair
    pub fn parse(from: &str, to: &str) -> Result<Self> {
        Self::new(parse_rfc3339(from)?, parse_rfc3339(to)?)
    }

    pub fn start_str(&self) -> String {
        self.start.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn end_str(&self) -> String {
        self.end.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    /// Consecutive windows of at most `step` covering this one exactly
    pub fn split(&self, step: Duration) -> Windows {
        Windows {
            next_start: self.start,
            end: self.end,
            step,
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start_str(), self.end_str())
    }
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidTimeRange(format!("'{raw}' is not RFC3339: {e}")))
}

/// Iterator over the windows of a [`TimeWindow`]
#[derive(Debug, Clone)]
pub struct Windows {
    next_start: DateTime<Utc>,
    end: DateTime<Utc>,
    step: Duration,
}

impl Iterator for Windows {
    type Item = TimeWindow;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_start >= self.end || self.step <= Duration::zero() {
            return None;
        }
        let start = self.next_start;
        let end = (start + self.step).min(self.end);
        self.next_start = end;
        Some(TimeWindow { start, end })
    }
}
