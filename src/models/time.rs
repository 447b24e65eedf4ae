//! Time windows and interval arithmetic
//!
//! All scheduling math reduces to half-open `[start, end)` intervals on a
//! calendar date. Shifts stay within a single day unless explicitly marked
//! overnight, in which case the end rolls into the following day.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

/// A half-open `[start, end)` time-of-day window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Create a window, requiring `start < end`
    pub fn new(start: NaiveTime, end: NaiveTime) -> Option<Self> {
        if start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    /// Parse a window from two `HH:MM` strings
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        Self::new(start, end)
    }

    /// Window spanning the full day
    pub fn full_day() -> Self {
        Self {
            start: NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(23, 59, 59).unwrap(),
        }
    }

    /// Whether two windows intersect
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Whether this window fully contains another
    pub fn contains(&self, other: &TimeWindow) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Window length in minutes
    pub fn duration_minutes(&self) -> i64 {
        (self.end.num_seconds_from_midnight() as i64
            - self.start.num_seconds_from_midnight() as i64)
            / 60
    }

    /// Window length in fractional hours
    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes() as f64 / 60.0
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M")
        )
    }
}

/// Parse an `HH:MM` or `HH:MM:SS` string
pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .ok()
}

/// Concrete `[start, end)` interval anchored to calendar dates
///
/// Used for cross-midnight overlap checks where a plain [`TimeWindow`]
/// is not enough.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTimeSpan {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl DateTimeSpan {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Anchor a time window to a date, rolling the end into the next day
    /// when `overnight` is set
    pub fn anchored(date: NaiveDate, window: TimeWindow, overnight: bool) -> Self {
        let start = date.and_time(window.start);
        let end_date = if overnight && window.end <= window.start {
            date.succ_opt().unwrap_or(date)
        } else {
            date
        };
        Self {
            start,
            end: end_date.and_time(window.end),
        }
    }

    pub fn overlaps(&self, other: &DateTimeSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_window_requires_start_before_end() {
        assert!(TimeWindow::new(t(9, 0), t(17, 0)).is_some());
        assert!(TimeWindow::new(t(17, 0), t(9, 0)).is_none());
        assert!(TimeWindow::new(t(9, 0), t(9, 0)).is_none());
    }

    #[test]
    fn test_window_overlap() {
        let a = TimeWindow::new(t(9, 0), t(13, 0)).unwrap();
        let b = TimeWindow::new(t(12, 0), t(16, 0)).unwrap();
        let c = TimeWindow::new(t(13, 0), t(16, 0)).unwrap();

        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        // Half-open: touching windows do not overlap
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_window_contains() {
        let outer = TimeWindow::new(t(8, 0), t(18, 0)).unwrap();
        let inner = TimeWindow::new(t(9, 0), t(17, 0)).unwrap();

        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:30"), Some(t(9, 30)));
        assert_eq!(parse_hhmm("23:59"), Some(t(23, 59)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("not a time"), None);
    }

    #[test]
    fn test_duration() {
        let w = TimeWindow::new(t(9, 0), t(17, 30)).unwrap();
        assert_eq!(w.duration_minutes(), 510);
        assert!((w.duration_hours() - 8.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overnight_span() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let window = TimeWindow {
            start: t(22, 0),
            end: t(6, 0),
        };
        let span = DateTimeSpan::anchored(date, window, true);

        assert_eq!(span.duration_minutes(), 480);
        assert_eq!(span.end.date(), date.succ_opt().unwrap());
    }

    #[test]
    fn test_same_day_span_overlap() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let a = DateTimeSpan::anchored(date, TimeWindow::new(t(9, 0), t(13, 0)).unwrap(), false);
        let b = DateTimeSpan::anchored(date, TimeWindow::new(t(12, 0), t(16, 0)).unwrap(), false);
        let other_day = DateTimeSpan::anchored(
            date.succ_opt().unwrap(),
            TimeWindow::new(t(9, 0), t(13, 0)).unwrap(),
            false,
        );

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&other_day));
    }
}
