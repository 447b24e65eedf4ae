//! User-facing notifications

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Notification priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl NotificationPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An action the client can render alongside a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub label: String,
    /// Client-side operation identifier, e.g. `confirm_assignment`
    pub op: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<Uuid>,
}

/// A notification delivered to one recipient
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub category: String,
    pub priority: NotificationPriority,
    pub title: String,
    pub body: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
}

impl Notification {
    pub fn new(
        recipient_id: Uuid,
        category: impl Into<String>,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id,
            category: category.into(),
            priority: NotificationPriority::Medium,
            title: title.into(),
            body: body.into(),
            is_read: false,
            created_at: Utc::now(),
            expires_at: None,
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_action(mut self, action: NotificationAction) -> Self {
        self.actions.push(action);
        self
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map(|t| t <= now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(NotificationPriority::Urgent > NotificationPriority::High);
        assert!(NotificationPriority::High > NotificationPriority::Medium);
        assert!(NotificationPriority::Medium > NotificationPriority::Low);
    }

    #[test]
    fn test_builder() {
        let recipient = Uuid::new_v4();
        let n = Notification::new(recipient, "assignment", "New shift", "You were assigned")
            .with_priority(NotificationPriority::High)
            .with_action(NotificationAction {
                label: "Confirm".to_string(),
                op: "confirm_assignment".to_string(),
                target_id: Some(Uuid::new_v4()),
            });

        assert_eq!(n.priority, NotificationPriority::High);
        assert_eq!(n.actions.len(), 1);
        assert!(!n.is_read);
    }

    #[test]
    fn test_expiry() {
        let mut n = Notification::new(Uuid::new_v4(), "system", "t", "b");
        let now = Utc::now();
        assert!(!n.is_expired(now));

        n.expires_at = Some(now - chrono::Duration::minutes(1));
        assert!(n.is_expired(now));
    }
}
