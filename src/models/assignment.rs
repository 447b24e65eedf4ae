//! Assignment entity and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Assignment lifecycle status
///
/// ```text
///             decline             cancel
///  assigned ────────▶ declined   ──▶ cancelled
///     │  ▲ confirm         ▲
///     │  └────────────┐    │
///     ▼               │    │
///  pending ─confirm─▶ confirmed ──▶ completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Assigned,
    Pending,
    Confirmed,
    Declined,
    Cancelled,
    Completed,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "assigned" => Some(Self::Assigned),
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "declined" => Some(Self::Declined),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// Terminal states admit no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Declined | Self::Cancelled | Self::Completed)
    }

    /// Whether the employee-facing confirm/decline window applies
    pub fn is_awaiting_response(&self) -> bool {
        matches!(self, Self::Assigned | Self::Pending)
    }

    pub fn can_transition_to(&self, next: AssignmentStatus) -> bool {
        use AssignmentStatus::*;
        matches!(
            (self, next),
            (Assigned, Pending)
                | (Assigned, Confirmed)
                | (Assigned, Declined)
                | (Assigned, Cancelled)
                | (Pending, Confirmed)
                | (Pending, Declined)
                | (Pending, Cancelled)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A binding of one employee to one shift within one schedule
///
/// Unique on (`schedule_id`, `employee_id`, `shift_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleAssignment {
    pub id: Uuid,
    pub schedule_id: Uuid,
    pub employee_id: Uuid,
    pub shift_id: Uuid,
    pub status: AssignmentStatus,
    pub priority: u8,
    pub notes: Option<String>,
    pub decline_reason: Option<String>,
    pub assigned_by: Uuid,
    pub assigned_at: DateTime<Utc>,
    pub conflicts_resolved: bool,
    pub auto_assigned: bool,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleAssignment {
    pub fn new(
        schedule_id: Uuid,
        employee_id: Uuid,
        shift_id: Uuid,
        assigned_by: Uuid,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            schedule_id,
            employee_id,
            shift_id,
            status: AssignmentStatus::Assigned,
            priority: 5,
            notes: None,
            decline_reason: None,
            assigned_by,
            assigned_at: now,
            conflicts_resolved: false,
            auto_assigned: false,
            updated_at: now,
        }
    }

    /// Seconds elapsed since the assignment was created
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.assigned_at).num_seconds()
    }

    /// Whether the confirm/decline window is still open at `now`
    pub fn within_response_window(&self, now: DateTime<Utc>, window_hours: i64) -> bool {
        self.status.is_awaiting_response() && self.age_secs(now) < window_hours * 3600
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [
            AssignmentStatus::Assigned,
            AssignmentStatus::Pending,
            AssignmentStatus::Confirmed,
            AssignmentStatus::Declined,
            AssignmentStatus::Cancelled,
            AssignmentStatus::Completed,
        ] {
            assert_eq!(AssignmentStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(AssignmentStatus::Declined.is_terminal());
        assert!(AssignmentStatus::Cancelled.is_terminal());
        assert!(AssignmentStatus::Completed.is_terminal());
        assert!(!AssignmentStatus::Assigned.is_terminal());
        assert!(!AssignmentStatus::Confirmed.is_terminal());
    }

    #[test]
    fn test_transitions() {
        use AssignmentStatus::*;
        assert!(Assigned.can_transition_to(Confirmed));
        assert!(Assigned.can_transition_to(Declined));
        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(!Declined.can_transition_to(Confirmed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Confirmed.can_transition_to(Declined));
    }

    #[test]
    fn test_response_window() {
        let mut a = ScheduleAssignment::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
        );
        let created = a.assigned_at;

        assert!(a.within_response_window(created + chrono::Duration::hours(47), 48));
        assert!(!a.within_response_window(created + chrono::Duration::hours(49), 48));

        a.status = AssignmentStatus::Confirmed;
        assert!(!a.within_response_window(created, 48));
    }
}
