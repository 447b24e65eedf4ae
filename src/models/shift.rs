//! Shift entity and overlap math

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use super::time::{DateTimeSpan, TimeWindow};

/// Broad classification of a shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftType {
    Morning,
    Evening,
    Night,
    Management,
    Emergency,
}

impl ShiftType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Evening => "evening",
            Self::Night => "night",
            Self::Management => "management",
            Self::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "morning" => Some(Self::Morning),
            "evening" => Some(Self::Evening),
            "night" => Some(Self::Night),
            "management" => Some(Self::Management),
            "emergency" => Some(Self::Emergency),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Morning,
            Self::Evening,
            Self::Night,
            Self::Management,
            Self::Emergency,
        ]
    }
}

impl std::fmt::Display for ShiftType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A work interval with staffing and qualification requirements
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shift {
    pub id: Uuid,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub shift_type: ShiftType,
    pub department_id: Option<Uuid>,
    pub required_staff: u32,
    pub priority: u8,
    pub requirements: HashSet<String>,
    /// End time rolls into the next calendar day
    #[serde(default)]
    pub overnight: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shift {
    pub fn weekday(&self) -> Weekday {
        self.date.weekday()
    }

    /// Concrete `[start, end)` interval on the calendar
    pub fn span(&self) -> DateTimeSpan {
        DateTimeSpan::anchored(self.date, self.window, self.overnight)
    }

    /// Two shifts overlap when their calendar intervals intersect
    pub fn overlaps(&self, other: &Shift) -> bool {
        self.span().overlaps(&other.span())
    }

    pub fn duration_minutes(&self) -> i64 {
        self.span().duration_minutes()
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes() as f64 / 60.0
    }

    /// Validate field-level invariants, returning all offending fields
    pub fn validate(&self) -> Vec<(&'static str, String)> {
        let mut errors = Vec::new();

        if !self.overnight && self.window.start >= self.window.end {
            errors.push(("window", "start_time must precede end_time".to_string()));
        }
        if self.required_staff < 1 {
            errors.push(("required_staff", "must be at least 1".to_string()));
        }
        if !(1..=10).contains(&self.priority) {
            errors.push(("priority", format!("{} outside [1, 10]", self.priority)));
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn shift(date: NaiveDate, start: u32, end: u32) -> Shift {
        let now = Utc::now();
        Shift {
            id: Uuid::new_v4(),
            date,
            window: TimeWindow {
                start: t(start),
                end: t(end),
            },
            shift_type: ShiftType::Morning,
            department_id: None,
            required_staff: 1,
            priority: 5,
            requirements: HashSet::new(),
            overnight: false,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_same_day_overlap() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let a = shift(date, 9, 13);
        let b = shift(date, 12, 16);
        let c = shift(date, 13, 16);

        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_different_day_no_overlap() {
        let mon = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tue = mon.succ_opt().unwrap();
        let a = shift(mon, 9, 17);
        let b = shift(tue, 9, 17);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn test_overnight_overlaps_next_morning() {
        let mon = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let tue = mon.succ_opt().unwrap();

        let mut night = shift(mon, 22, 6);
        night.overnight = true;
        let morning = shift(tue, 5, 13);

        assert!(night.overlaps(&morning));
        assert_eq!(night.duration_minutes(), 480);
    }

    #[test]
    fn test_validation() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut s = shift(date, 9, 17);
        assert!(s.validate().is_empty());

        s.required_staff = 0;
        s.priority = 11;
        let errors = s.validate();
        let fields: Vec<&str> = errors.iter().map(|(f, _)| *f).collect();
        assert!(fields.contains(&"required_staff"));
        assert!(fields.contains(&"priority"));
    }

    #[test]
    fn test_shift_type_round_trip() {
        for st in ShiftType::all() {
            assert_eq!(ShiftType::parse(st.as_str()), Some(st));
        }
        assert_eq!(ShiftType::parse("brunch"), None);
    }
}
