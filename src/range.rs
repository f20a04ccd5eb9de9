//! Calendar-date ranges evaluated in a caller-supplied IANA timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::error::ReportError;

/// Inclusive Unix-time bounds, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: i64,
    pub end: i64,
}

/// An inclusive `[start, end]` range of calendar days in `tz`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReportRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub tz: Tz,
}

impl ReportRange {
    pub fn new(start: NaiveDate, end: NaiveDate, tz: Tz) -> Result<Self, ReportError> {
        if start > end {
            return Err(ReportError::InvertedRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end, tz })
    }

    pub fn parse(start: &str, end: &str, timezone: &str) -> Result<Self, ReportError> {
        let start = parse_date("startDate", start)?;
        let end = parse_date("endDate", end)?;
        let tz = parse_timezone(timezone)?;
        Self::new(start, end, tz)
    }

    /// Number of calendar days covered, both ends included.
    pub fn day_count(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let end = self.end;
        self.start.iter_days().take_while(move |d| *d <= end)
    }

    /// Local midnight of `start` through the last second of `end`.
    pub fn window(&self) -> TimeWindow {
        let start = local_midnight(&self.tz, self.start);
        let end = match self.end.succ_opt() {
            Some(next) => local_midnight(&self.tz, next) - 1,
            None => local_midnight(&self.tz, self.end) + 86_399,
        };
        TimeWindow { start, end }
    }

    /// Calendar date of a Unix timestamp in this range's timezone.
    pub fn local_date(&self, ts: i64) -> Option<NaiveDate> {
        DateTime::from_timestamp(ts, 0).map(|dt| dt.with_timezone(&self.tz).date_naive())
    }
}

pub fn parse_date(field: &'static str, value: &str) -> Result<NaiveDate, ReportError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ReportError::InvalidDate {
        field,
        value: value.to_string(),
    })
}

pub fn parse_timezone(value: &str) -> Result<Tz, ReportError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("utc") {
        return Ok(chrono_tz::UTC);
    }
    trimmed
        .parse::<Tz>()
        .map_err(|_| ReportError::UnknownTimezone(trimmed.to_string()))
}

/// First instant of `date` in `tz`. Midnights inside a DST gap resolve to the
/// first valid instant after the gap; ambiguous midnights take the earlier one.
fn local_midnight(tz: &Tz, date: NaiveDate) -> i64 {
    let naive: NaiveDateTime = date.and_time(NaiveTime::default());
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp())
}
