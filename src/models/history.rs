//! Append-only audit history
//!
//! Role, status, and department changes each record an immutable entry in
//! the same transaction as the change itself. History rows never link back
//! into the live entity graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which audited field a history entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Role,
    Status,
    Department,
}

impl HistoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "role",
            Self::Status => "status",
            Self::Department => "department",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "role" => Some(Self::Role),
            "status" => Some(Self::Status),
            "department" => Some(Self::Department),
            _ => None,
        }
    }
}

/// One immutable change record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: HistoryKind,
    pub old_value: String,
    pub new_value: String,
    pub changed_by: Uuid,
    pub changed_at: DateTime<Utc>,
    pub reason: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        user_id: Uuid,
        kind: HistoryKind,
        old_value: impl Into<String>,
        new_value: impl Into<String>,
        changed_by: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            kind,
            old_value: old_value.into(),
            new_value: new_value.into(),
            changed_by,
            changed_at: Utc::now(),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_entry() {
        let user = Uuid::new_v4();
        let admin = Uuid::new_v4();
        let entry = HistoryEntry::new(user, HistoryKind::Role, "employee", "manager", admin)
            .with_reason("promotion");

        assert_eq!(entry.kind, HistoryKind::Role);
        assert_eq!(entry.old_value, "employee");
        assert_eq!(entry.new_value, "manager");
        assert_eq!(entry.reason.as_deref(), Some("promotion"));
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in [HistoryKind::Role, HistoryKind::Status, HistoryKind::Department] {
            assert_eq!(HistoryKind::parse(kind.as_str()), Some(kind));
        }
    }
}
