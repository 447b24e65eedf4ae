//! Employee entity, roles, and weekly availability

use chrono::{DateTime, NaiveDate, Utc, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

use super::time::TimeWindow;

/// Maximum number of qualification tags per employee
pub const MAX_QUALIFICATIONS: usize = 20;

/// Number of prior password hashes retained for reuse checks
pub const PASSWORD_HISTORY_DEPTH: usize = 5;

lazy_static! {
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)+$")
            .expect("email regex");
}

/// Access role, ordered from most to least privileged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Supervisor,
    Scheduler,
    Employee,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Manager => "manager",
            Self::Supervisor => "supervisor",
            Self::Scheduler => "scheduler",
            Self::Employee => "employee",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "manager" => Some(Self::Manager),
            "supervisor" => Some(Self::Supervisor),
            "scheduler" => Some(Self::Scheduler),
            "employee" => Some(Self::Employee),
            _ => None,
        }
    }

    pub fn all() -> Vec<Self> {
        vec![
            Self::Admin,
            Self::Manager,
            Self::Supervisor,
            Self::Scheduler,
            Self::Employee,
        ]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Availability for a single weekday
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<TimeWindow>,
    /// Additional disjoint slots beyond the main window
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub slots: Vec<TimeWindow>,
}

impl DayAvailability {
    pub fn off() -> Self {
        Self {
            available: false,
            window: None,
            slots: Vec::new(),
        }
    }

    pub fn within(window: TimeWindow) -> Self {
        Self {
            available: true,
            window: Some(window),
            slots: Vec::new(),
        }
    }

    /// Whether the whole `[start, end)` of `shift_window` is covered
    pub fn covers(&self, shift_window: &TimeWindow) -> bool {
        if !self.available {
            return false;
        }
        if let Some(window) = &self.window {
            if window.contains(shift_window) {
                return true;
            }
        }
        self.slots.iter().any(|slot| slot.contains(shift_window))
    }

    /// Total available minutes across the main window and extra slots
    pub fn total_minutes(&self) -> i64 {
        if !self.available {
            return 0;
        }
        let main = self.window.map(|w| w.duration_minutes()).unwrap_or(0);
        main + self.slots.iter().map(|s| s.duration_minutes()).sum::<i64>()
    }
}

/// Weekly availability map
///
/// BTreeMap keeps weekday ordering stable for serialization and display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Availability {
    #[serde(flatten)]
    pub days: BTreeMap<String, DayAvailability>,
}

impl Availability {
    /// Available every day within the given window
    pub fn all_week(window: TimeWindow) -> Self {
        let mut days = BTreeMap::new();
        for day in WEEKDAY_KEYS {
            days.insert(day.to_string(), DayAvailability::within(window));
        }
        Self { days }
    }

    pub fn get(&self, weekday: Weekday) -> Option<&DayAvailability> {
        self.days.get(weekday_key(weekday))
    }

    pub fn set(&mut self, weekday: Weekday, day: DayAvailability) {
        self.days.insert(weekday_key(weekday).to_string(), day);
    }

    /// Whether the employee can work the entire window on the weekday
    pub fn covers(&self, weekday: Weekday, window: &TimeWindow) -> bool {
        self.get(weekday).map(|d| d.covers(window)).unwrap_or(false)
    }

    /// Sum of available hours across the week
    pub fn weekly_hours(&self) -> f64 {
        self.days.values().map(|d| d.total_minutes()).sum::<i64>() as f64 / 60.0
    }
}

const WEEKDAY_KEYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

pub fn weekday_key(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// An employee account with profile, scheduling, and security state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
    pub email_verified: bool,
    pub account_locked: bool,
    pub failed_login_attempts: i32,
    pub password_must_change: bool,
    pub department_id: Option<Uuid>,

    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub hourly_rate: f64,
    pub max_hours_per_week: f64,

    pub qualifications: HashSet<String>,
    pub availability: Availability,

    /// Most-recent-first prior hashes, capped at [`PASSWORD_HISTORY_DEPTH`]
    #[serde(skip_serializing)]
    pub password_history: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Employee {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Whether the employee holds every required tag
    pub fn is_qualified_for(&self, requirements: &HashSet<String>) -> bool {
        requirements.is_subset(&self.qualifications)
    }

    /// Record a password change, pushing the old hash into history
    pub fn rotate_password_hash(&mut self, new_hash: String) {
        self.password_history.insert(0, self.password_hash.clone());
        self.password_history.truncate(PASSWORD_HISTORY_DEPTH);
        self.password_hash = new_hash;
        self.password_must_change = false;
        self.updated_at = Utc::now();
    }

    /// Validate field-level invariants, returning all offending fields
    pub fn validate(&self) -> Vec<(&'static str, String)> {
        let mut errors = Vec::new();

        if !is_valid_email(&self.email) {
            errors.push(("email", format!("invalid email address: {}", self.email)));
        }
        if self.first_name.trim().is_empty() {
            errors.push(("first_name", "must not be empty".to_string()));
        }
        if self.last_name.trim().is_empty() {
            errors.push(("last_name", "must not be empty".to_string()));
        }
        if !(0.0..=1000.0).contains(&self.hourly_rate) {
            errors.push((
                "hourly_rate",
                format!("{} outside [0, 1000]", self.hourly_rate),
            ));
        } else if (self.hourly_rate * 100.0).round() / 100.0 != self.hourly_rate {
            errors.push((
                "hourly_rate",
                "at most two decimal places allowed".to_string(),
            ));
        }
        if !(1.0..=168.0).contains(&self.max_hours_per_week) {
            errors.push((
                "max_hours_per_week",
                format!("{} outside [1, 168]", self.max_hours_per_week),
            ));
        }
        if self.qualifications.len() > MAX_QUALIFICATIONS {
            errors.push((
                "qualifications",
                format!("at most {MAX_QUALIFICATIONS} tags allowed"),
            ));
        }
        let available = self.availability.weekly_hours();
        if available > 0.0 && self.max_hours_per_week > available {
            errors.push((
                "max_hours_per_week",
                format!("{} exceeds {available:.1} available hours", self.max_hours_per_week),
            ));
        }

        errors
    }
}

/// Validate an email address against the RFC-style pattern
pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 254 && EMAIL_RE.is_match(email)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn window(start: u32, end: u32) -> TimeWindow {
        TimeWindow::new(
            NaiveTime::from_hms_opt(start, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(end, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn sample_employee() -> Employee {
        let now = Utc::now();
        Employee {
            id: Uuid::new_v4(),
            email: "alex@example.com".to_string(),
            password_hash: "$2b$12$stub".to_string(),
            role: Role::Employee,
            is_active: true,
            email_verified: true,
            account_locked: false,
            failed_login_attempts: 0,
            password_must_change: false,
            department_id: None,
            first_name: "Alex".to_string(),
            last_name: "Kim".to_string(),
            phone: None,
            hire_date: None,
            hourly_rate: 18.50,
            max_hours_per_week: 40.0,
            qualifications: HashSet::from(["general".to_string()]),
            availability: Availability::all_week(window(9, 17)),
            password_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_round_trip() {
        for role in Role::all() {
            assert_eq!(Role::parse(role.as_str()), Some(role));
        }
        assert_eq!(Role::parse("intern"), None);
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last+tag@sub.domain.co"));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("@domain.com"));
    }

    #[test]
    fn test_availability_covers() {
        let avail = Availability::all_week(window(9, 17));
        assert!(avail.covers(Weekday::Mon, &window(9, 17)));
        assert!(avail.covers(Weekday::Wed, &window(10, 14)));
        assert!(!avail.covers(Weekday::Fri, &window(8, 12)));
        assert!(!avail.covers(Weekday::Sat, &window(18, 22)));
    }

    #[test]
    fn test_availability_with_slots() {
        let mut day = DayAvailability::within(window(9, 12));
        day.slots.push(window(14, 18));

        assert!(day.covers(&window(9, 12)));
        assert!(day.covers(&window(15, 17)));
        // Gap between the windows is not covered
        assert!(!day.covers(&window(11, 15)));
        assert_eq!(day.total_minutes(), (3 + 4) * 60);
    }

    #[test]
    fn test_employee_validation_passes() {
        assert!(sample_employee().validate().is_empty());
    }

    #[test]
    fn test_employee_validation_collects_all_errors() {
        let mut employee = sample_employee();
        employee.email = "broken".to_string();
        employee.hourly_rate = 2000.0;
        employee.max_hours_per_week = 0.0;

        let errors = employee.validate();
        let fields: Vec<&str> = errors.iter().map(|(f, _)| *f).collect();
        assert!(fields.contains(&"email"));
        assert!(fields.contains(&"hourly_rate"));
        assert!(fields.contains(&"max_hours_per_week"));
    }

    #[test]
    fn test_max_hours_capped_by_availability() {
        let mut employee = sample_employee();
        // 8h x 7 days = 56 available hours
        employee.max_hours_per_week = 60.0;
        let errors = employee.validate();
        assert!(errors.iter().any(|(f, _)| *f == "max_hours_per_week"));
    }

    #[test]
    fn test_qualification_check() {
        let employee = sample_employee();
        assert!(employee.is_qualified_for(&HashSet::from(["general".to_string()])));
        assert!(employee.is_qualified_for(&HashSet::new()));
        assert!(!employee.is_qualified_for(&HashSet::from(["cook".to_string()])));
    }

    #[test]
    fn test_password_rotation_keeps_history_bounded() {
        let mut employee = sample_employee();
        for i in 0..8 {
            employee.rotate_password_hash(format!("hash-{i}"));
        }
        assert_eq!(employee.password_hash, "hash-7");
        assert_eq!(employee.password_history.len(), PASSWORD_HISTORY_DEPTH);
        assert_eq!(employee.password_history[0], "hash-6");
    }
}
