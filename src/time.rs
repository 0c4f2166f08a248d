//! Timestamp handling shared by the event and statistics paths
//!
//! All timestamps are naive UTC with second precision. Storage backends
//! persist them as Unix seconds.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::error::{ServiceError, ServiceResult};

/// Pattern used on the wire unless configured otherwise
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Configured timestamp pattern for parsing inbound and formatting outbound values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat {
    pattern: String,
}

impl TimestampFormat {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn parse(&self, value: &str) -> ServiceResult<NaiveDateTime> {
        NaiveDateTime::parse_from_str(value.trim(), &self.pattern).map_err(|e| {
            ServiceError::Parse(format!(
                "timestamp '{value}' does not match '{}': {e}",
                self.pattern
            ))
        })
    }

    pub fn format(&self, value: NaiveDateTime) -> String {
        value.format(&self.pattern).to_string()
    }
}

impl Default for TimestampFormat {
    fn default() -> Self {
        Self::new(DEFAULT_TIMESTAMP_FORMAT)
    }
}

/// Current UTC time truncated to whole seconds
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn to_unix(value: NaiveDateTime) -> i64 {
    value.and_utc().timestamp()
}

pub fn from_unix(secs: i64) -> NaiveDateTime {
    DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

/// Inclusive `[start, end]` interval. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeRange {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> ServiceResult<Self> {
        if start > end {
            return Err(ServiceError::Validation(format!(
                "range start {start} is after range end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str, format: &TimestampFormat) -> ServiceResult<Self> {
        Self::new(format.parse(start)?, format.parse(end)?)
    }

    /// Build a range where either bound may be missing; a missing bound is unbounded.
    /// Returns `None` when both bounds are missing.
    pub fn from_bounds(
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> ServiceResult<Option<Self>> {
        match (start, end) {
            (None, None) => Ok(None),
            (start, end) => Self::new(
                start.unwrap_or(NaiveDateTime::MIN),
                end.unwrap_or(NaiveDateTime::MAX),
            )
            .map(Some),
        }
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, value: NaiveDateTime) -> bool {
        self.start <= value && value <= self.end
    }

    /// Public search rejects ranges that end before `now`
    pub fn ensure_not_past(&self, now: NaiveDateTime) -> ServiceResult<()> {
        if self.end < now {
            return Err(ServiceError::Validation(format!(
                "range end {} is in the past",
                self.end
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> NaiveDateTime {
        TimestampFormat::default().parse(value).unwrap()
    }

    #[test]
    fn test_parse_default_format() {
        let parsed = ts("2024-03-01 12:30:45");
        assert_eq!(
            TimestampFormat::default().format(parsed),
            "2024-03-01 12:30:45"
        );
    }

    #[test]
    fn test_parse_rejects_malformed_timestamp() {
        let err = TimestampFormat::default()
            .parse("2024-03-01T12:30:45")
            .unwrap_err();
        assert!(matches!(err, ServiceError::Parse(_)));
    }

    #[test]
    fn test_custom_format() {
        let format = TimestampFormat::new("%d.%m.%Y %H:%M");
        let parsed = format.parse("01.03.2024 12:30").unwrap();
        assert_eq!(parsed, ts("2024-03-01 12:30:00"));
    }

    #[test]
    fn test_range_rejects_inverted_bounds() {
        let err = TimeRange::new(ts("2024-03-02 00:00:00"), ts("2024-03-01 00:00:00")).unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn test_range_is_inclusive() {
        let range = TimeRange::new(ts("2024-03-01 00:00:00"), ts("2024-03-01 00:00:01")).unwrap();
        assert!(range.contains(ts("2024-03-01 00:00:00")));
        assert!(range.contains(ts("2024-03-01 00:00:01")));
        assert!(!range.contains(ts("2024-03-01 00:00:02")));
    }

    #[test]
    fn test_open_bounds() {
        assert!(TimeRange::from_bounds(None, None).unwrap().is_none());

        let range = TimeRange::from_bounds(Some(ts("2024-03-01 00:00:00")), None)
            .unwrap()
            .unwrap();
        assert!(range.contains(ts("2999-01-01 00:00:00")));
        assert!(!range.contains(ts("2024-02-29 23:59:59")));
    }

    #[test]
    fn test_end_in_past() {
        let range = TimeRange::new(ts("2020-01-01 00:00:00"), ts("2020-01-02 00:00:00")).unwrap();
        assert!(range.ensure_not_past(ts("2024-01-01 00:00:00")).is_err());
        assert!(range.ensure_not_past(ts("2019-01-01 00:00:00")).is_ok());
    }

    #[test]
    fn test_unix_round_trip() {
        let value = ts("2024-03-01 12:30:45");
        assert_eq!(from_unix(to_unix(value)), value);
    }
}
