//! Weekly schedule container

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Schedule lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleStatus {
    Draft,
    Pending,
    Approved,
    Published,
    Archived,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(Self::Draft),
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// Whether assignments may be created, updated, or deleted
    ///
    /// Approved/published schedules are write-frozen except for the
    /// confirm/decline transitions the workflow allows.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Draft | Self::Pending)
    }

    /// Valid forward transitions
    pub fn can_transition_to(&self, next: ScheduleStatus) -> bool {
        use ScheduleStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Draft, Archived)
                | (Pending, Draft)
                | (Pending, Approved)
                | (Pending, Archived)
                | (Approved, Published)
                | (Approved, Archived)
                | (Published, Archived)
        )
    }
}

impl std::fmt::Display for ScheduleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A weekly container of assignments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub title: String,
    pub status: ScheduleStatus,
    pub created_by: Uuid,
    pub approved_by: Option<Uuid>,
    /// Monotonic version for optimistic concurrency checks
    pub version: i32,
    /// Prior version of this schedule, when cloned on publish
    pub parent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schedule {
    /// Validate field-level invariants, returning all offending fields
    pub fn validate(&self) -> Vec<(&'static str, String)> {
        let mut errors = Vec::new();

        if self.week_start > self.week_end {
            errors.push(("week_start", "must not be after week_end".to_string()));
        } else if (self.week_end - self.week_start).num_days() > 7 {
            errors.push(("week_end", "span must not exceed 7 days".to_string()));
        }
        if self.title.trim().is_empty() {
            errors.push(("title", "must not be empty".to_string()));
        }
        if self.status == ScheduleStatus::Approved && self.approved_by.is_none() {
            errors.push(("approved_by", "required for approved schedules".to_string()));
        }

        errors
    }

    /// Whether the given date falls inside the schedule's week
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        date >= self.week_start && date <= self.week_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(start: NaiveDate, days: i64) -> Schedule {
        let now = Utc::now();
        Schedule {
            id: Uuid::new_v4(),
            week_start: start,
            week_end: start + chrono::Duration::days(days),
            title: "Week 10".to_string(),
            status: ScheduleStatus::Draft,
            created_by: Uuid::new_v4(),
            approved_by: None,
            version: 1,
            parent_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_week_span_validation() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert!(schedule(start, 6).validate().is_empty());
        assert!(!schedule(start, 8).validate().is_empty());
        assert!(!schedule(start, -1).validate().is_empty());
    }

    #[test]
    fn test_approved_requires_approver() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let mut s = schedule(start, 6);
        s.status = ScheduleStatus::Approved;
        assert!(s.validate().iter().any(|(f, _)| *f == "approved_by"));

        s.approved_by = Some(Uuid::new_v4());
        assert!(s.validate().is_empty());
    }

    #[test]
    fn test_editable_statuses() {
        assert!(ScheduleStatus::Draft.is_editable());
        assert!(ScheduleStatus::Pending.is_editable());
        assert!(!ScheduleStatus::Approved.is_editable());
        assert!(!ScheduleStatus::Published.is_editable());
        assert!(!ScheduleStatus::Archived.is_editable());
    }

    #[test]
    fn test_status_transitions() {
        use ScheduleStatus::*;
        assert!(Draft.can_transition_to(Pending));
        assert!(Pending.can_transition_to(Approved));
        assert!(Approved.can_transition_to(Published));
        assert!(Published.can_transition_to(Archived));
        assert!(!Draft.can_transition_to(Published));
        assert!(!Archived.can_transition_to(Draft));
    }

    #[test]
    fn test_contains_date() {
        let start = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let s = schedule(start, 6);
        assert!(s.contains_date(start));
        assert!(s.contains_date(start + chrono::Duration::days(6)));
        assert!(!s.contains_date(start + chrono::Duration::days(7)));
    }
}
