//! Typed scheduling rules
//!
//! A rule is a tagged variant per rule type with a fixed payload schema.
//! The parser produces these from free text; the solver lowers each case
//! into constraints.

use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::shift::ShiftType;
use super::time::TimeWindow;

/// Rule classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Availability,
    Requirement,
    Preference,
    Restriction,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Availability => "availability",
            Self::Requirement => "requirement",
            Self::Preference => "preference",
            Self::Restriction => "restriction",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "availability" => Some(Self::Availability),
            "requirement" => Some(Self::Requirement),
            "preference" => Some(Self::Preference),
            "restriction" => Some(Self::Restriction),
            _ => None,
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a restriction applies globally or to a single employee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleScope {
    Global,
    Employee,
}

/// Structured rule payload, one fixed schema per rule type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule_type", rename_all = "snake_case")]
pub enum RulePayload {
    /// "Sarah can't work past 5pm on weekdays"
    Availability {
        #[serde(skip_serializing_if = "Option::is_none")]
        employee_id: Option<Uuid>,
        days: Vec<Weekday>,
        #[serde(skip_serializing_if = "Option::is_none")]
        window: Option<TimeWindow>,
        /// When set, the days/window are blocked rather than allowed
        negation: bool,
    },

    /// "At least 3 people during lunch hours"
    Requirement {
        window: TimeWindow,
        min_headcount: u32,
        #[serde(skip_serializing_if = "Option::is_none")]
        qualification: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        days: Vec<Weekday>,
    },

    /// "Mike prefers morning shifts"
    Preference {
        #[serde(skip_serializing_if = "Option::is_none")]
        employee_id: Option<Uuid>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        days: Vec<Weekday>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        windows: Vec<TimeWindow>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        shift_types: Vec<ShiftType>,
    },

    /// "No more than 40 hours per week", "8 hours rest between shifts"
    Restriction {
        scope: RuleScope,
        #[serde(skip_serializing_if = "Option::is_none")]
        employee_id: Option<Uuid>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_hours_per_week: Option<f64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        min_rest_hours: Option<f64>,
    },
}

impl RulePayload {
    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Availability { .. } => RuleType::Availability,
            Self::Requirement { .. } => RuleType::Requirement,
            Self::Preference { .. } => RuleType::Preference,
            Self::Restriction { .. } => RuleType::Restriction,
        }
    }

    /// Employee the rule targets, `None` for global rules
    pub fn employee_id(&self) -> Option<Uuid> {
        match self {
            Self::Availability { employee_id, .. } => *employee_id,
            Self::Requirement { .. } => None,
            Self::Preference { employee_id, .. } => *employee_id,
            Self::Restriction { employee_id, .. } => *employee_id,
        }
    }
}

/// A stored rule with its source text and structured payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: Uuid,
    pub rule_type: RuleType,
    pub employee_id: Option<Uuid>,
    pub priority: u8,
    pub active: bool,
    pub source_text: String,
    pub payload: RulePayload,
    pub created_at: DateTime<Utc>,
}

impl Rule {
    pub fn new(source_text: impl Into<String>, payload: RulePayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            rule_type: payload.rule_type(),
            employee_id: payload.employee_id(),
            priority: 5,
            active: true,
            source_text: source_text.into(),
            payload,
            created_at: Utc::now(),
        }
    }
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

    #[test]
    fn test_payload_rule_type() {
        let payload = RulePayload::Restriction {
            scope: RuleScope::Global,
            employee_id: None,
            max_hours_per_week: Some(40.0),
            min_rest_hours: None,
        };
        assert_eq!(payload.rule_type(), RuleType::Restriction);
    }

    #[test]
    fn test_rule_inherits_type_and_target() {
        let employee = Uuid::new_v4();
        let payload = RulePayload::Availability {
            employee_id: Some(employee),
            days: vec![Weekday::Mon, Weekday::Tue],
            window: Some(window(17, 23)),
            negation: true,
        };
        let rule = Rule::new("can't work past 5pm", payload);

        assert_eq!(rule.rule_type, RuleType::Availability);
        assert_eq!(rule.employee_id, Some(employee));
        assert!(rule.active);
    }

    #[test]
    fn test_payload_serde_tagging() {
        let payload = RulePayload::Requirement {
            window: window(11, 14),
            min_headcount: 3,
            qualification: None,
            days: Vec::new(),
        };

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["rule_type"], "requirement");
        assert_eq!(json["min_headcount"], 3);

        let restored: RulePayload = serde_json::from_value(json).unwrap();
        assert_eq!(restored, payload);
    }
}
