//! Natural-language rule parser
//!
//! Classifies a free-text scheduling sentence into a typed rule payload and
//! extracts its entities (employee, days, time windows, quantities,
//! negation).
//!
//! Parsing is a pure function of the text, the synonym table, and the
//! employee directory snapshot: the same inputs always produce the same
//! structured rule. Ambiguous sentences return the candidate
//! interpretations instead of a rule; callers either ask the user or
//! confirm a low-confidence candidate explicitly.
//!
//! ```text
//! "Sarah can't work past 5pm on weekdays"
//!   └─ availability { employee: Sarah, days: Mon..Fri,
//!                     window: 17:00-23:59, negation: true }
//! ```

pub mod entities;
pub mod time;

use chrono::Weekday;
use serde::Serialize;

use crate::models::{RulePayload, RuleScope, RuleType, ShiftType, TimeWindow};

pub use entities::{EmployeeRef, NameMatch};
pub use time::SynonymTable;

/// Confidence below which a parse is ambiguous
pub const CONFIDENCE_FLOOR: f64 = 0.6;

/// A successfully classified rule
#[derive(Debug, Clone, Serialize)]
pub struct ParsedRule {
    pub rule_type: RuleType,
    pub payload: RulePayload,
    pub confidence: f64,
    /// Resolved employee name, for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_name: Option<String>,
}

/// Parser result: a rule, or the competing interpretations
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ParseResult {
    Parsed(ParsedRule),
    Ambiguous {
        reason: String,
        candidates: Vec<ParsedRule>,
    },
}

impl ParseResult {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// Parse one sentence against a synonym table and employee directory
pub fn parse_rule(
    text: &str,
    synonyms: &SynonymTable,
    directory: &[EmployeeRef],
) -> ParseResult {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParseResult::Ambiguous {
            reason: "empty rule text".to_string(),
            candidates: Vec::new(),
        };
    }

    let lower = trimmed.to_lowercase();
    let days = time::extract_days(trimmed);
    let times = time::extract_times(trimmed);
    let synonym_window = synonyms.find(trimmed);
    let negated = entities::is_negated(trimmed);
    let headcount = entities::extract_headcount(trimmed);
    let max_hours = entities::extract_max_hours(trimmed);
    let rest_hours = entities::extract_rest_hours(trimmed);
    let name = entities::resolve_employee(trimmed, directory);

    // Ambiguous employee reference blocks every per-employee interpretation
    if let NameMatch::Many(matches) = &name {
        let names: Vec<String> = matches.iter().map(|e| e.full_name()).collect();
        return ParseResult::Ambiguous {
            reason: format!("employee name matches several people: {}", names.join(", ")),
            candidates: Vec::new(),
        };
    }
    let employee = match &name {
        NameMatch::One(e) => Some(e.clone()),
        _ => None,
    };

    let mut candidates: Vec<ParsedRule> = Vec::new();

    // Restriction: explicit hour caps or rest floors
    if max_hours.is_some() || rest_hours.is_some() {
        let scope = if employee.is_some() {
            RuleScope::Employee
        } else {
            RuleScope::Global
        };
        candidates.push(ParsedRule {
            rule_type: RuleType::Restriction,
            payload: RulePayload::Restriction {
                scope,
                employee_id: employee.as_ref().map(|e| e.id),
                max_hours_per_week: max_hours,
                min_rest_hours: rest_hours,
            },
            confidence: 0.95,
            employee_name: employee.as_ref().map(|e| e.full_name()),
        });
    }

    // Requirement: a headcount over a time window
    if let Some(min_headcount) = headcount {
        let window = synonym_window.or_else(|| window_from_times(&times, &lower));
        let confidence = if window.is_some() { 0.9 } else { 0.55 };
        candidates.push(ParsedRule {
            rule_type: RuleType::Requirement,
            payload: RulePayload::Requirement {
                window: window.unwrap_or_else(TimeWindow::full_day),
                min_headcount,
                qualification: extract_qualification(&lower),
                days: days.clone(),
            },
            confidence,
            employee_name: None,
        });
    }

    // Preference: soft likes
    if lower.contains("prefer") || lower.contains("would rather") || lower.contains("likes to") {
        let shift_types = extract_shift_types(&lower);
        let windows: Vec<TimeWindow> = synonym_window.into_iter().collect();
        let has_target = !shift_types.is_empty() || !windows.is_empty() || !days.is_empty();
        candidates.push(ParsedRule {
            rule_type: RuleType::Preference,
            payload: RulePayload::Preference {
                employee_id: employee.as_ref().map(|e| e.id),
                days: days.clone(),
                windows,
                shift_types,
            },
            confidence: if has_target { 0.9 } else { 0.4 },
            employee_name: employee.as_ref().map(|e| e.full_name()),
        });
    }

    // Availability: negated or explicitly scoped working windows
    let availability_cue = negated
        || lower.contains("only available")
        || lower.contains("available")
        || lower.contains("work");
    if availability_cue && (employee.is_some() || !days.is_empty() || !times.is_empty()) {
        let window = availability_window(&lower, &times, synonym_window);
        let days = if days.is_empty() && window.is_some() {
            all_week()
        } else {
            days.clone()
        };
        let mut confidence: f64 = 0.85;
        if employee.is_none() {
            confidence -= 0.15;
        }
        if window.is_none() && days.is_empty() {
            confidence = 0.3;
        }
        candidates.push(ParsedRule {
            rule_type: RuleType::Availability,
            payload: RulePayload::Availability {
                employee_id: employee.as_ref().map(|e| e.id),
                days,
                window,
                negation: negated,
            },
            confidence,
            employee_name: employee.as_ref().map(|e| e.full_name()),
        });
    }

    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let Some(best_confidence) = candidates.first().map(|c| c.confidence) else {
        return ParseResult::Ambiguous {
            reason: "no scheduling rule recognized".to_string(),
            candidates,
        };
    };
    if best_confidence < CONFIDENCE_FLOOR {
        return ParseResult::Ambiguous {
            reason: "low confidence parse".to_string(),
            candidates,
        };
    }
    // Two near-equal readings need caller confirmation
    if candidates.len() > 1 && candidates[1].confidence > best_confidence - 0.1 {
        let reason = format!(
            "sentence reads as both {} and {}",
            candidates[0].rule_type, candidates[1].rule_type
        );
        return ParseResult::Ambiguous { reason, candidates };
    }
    ParseResult::Parsed(candidates.remove(0))
}

fn all_week() -> Vec<Weekday> {
    vec![
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
}

/// Build a window from directional cues ("past 5pm", "before 9am") or a pair
fn availability_window(
    lower: &str,
    times: &[time::FoundTime],
    synonym: Option<TimeWindow>,
) -> Option<TimeWindow> {
    if let Some(window) = synonym {
        return Some(window);
    }
    match times {
        [] => None,
        [only] => {
            if lower.contains("past") || lower.contains("after") || lower.contains("later than") {
                TimeWindow::new(only.time, time::end_of_day())
            } else if lower.contains("before") || lower.contains("until") || lower.contains("by ")
            {
                TimeWindow::new(time::start_of_day(), only.time)
            } else {
                // A single bare time is a window start with open end
                TimeWindow::new(only.time, time::end_of_day())
            }
        }
        [first, second, ..] => TimeWindow::new(first.time, second.time),
    }
}

fn window_from_times(times: &[time::FoundTime], lower: &str) -> Option<TimeWindow> {
    match times {
        [first, second, ..] => TimeWindow::new(first.time, second.time),
        [only] if lower.contains("after") || lower.contains("past") => {
            TimeWindow::new(only.time, time::end_of_day())
        }
        [only] if lower.contains("before") || lower.contains("until") => {
            TimeWindow::new(time::start_of_day(), only.time)
        }
        _ => None,
    }
}

fn extract_shift_types(lower: &str) -> Vec<ShiftType> {
    let mut types = Vec::new();
    for (needle, st) in [
        ("morning", ShiftType::Morning),
        ("evening", ShiftType::Evening),
        ("night", ShiftType::Night),
        ("management", ShiftType::Management),
        ("emergency", ShiftType::Emergency),
    ] {
        if lower.contains(needle) {
            types.push(st);
        }
    }
    types
}

/// A qualification mentioned as "qualified X" or "certified X"
fn extract_qualification(lower: &str) -> Option<String> {
    for marker in ["qualified ", "certified ", "licensed "] {
        if let Some(pos) = lower.find(marker) {
            let rest = &lower[pos + marker.len()..];
            let word: String = rest
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            if !word.is_empty() && word != "staff" && word != "people" {
                return Some(word);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;
    use uuid::Uuid;

    fn directory() -> Vec<EmployeeRef> {
        vec![
            EmployeeRef {
                id: Uuid::new_v4(),
                first_name: "Sarah".to_string(),
                last_name: "Lee".to_string(),
            },
            EmployeeRef {
                id: Uuid::new_v4(),
                first_name: "Mike".to_string(),
                last_name: "Park".to_string(),
            },
        ]
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn parse(text: &str) -> ParseResult {
        parse_rule(text, &SynonymTable::default(), &directory())
    }

    #[test]
    fn test_availability_negated_window() {
        let ParseResult::Parsed(rule) = parse("Sarah can't work past 5pm on weekdays") else {
            panic!("expected parse");
        };
        assert_eq!(rule.rule_type, RuleType::Availability);
        let RulePayload::Availability {
            employee_id,
            days,
            window,
            negation,
        } = rule.payload
        else {
            panic!("wrong payload");
        };

        assert!(employee_id.is_some());
        assert_eq!(days.len(), 5);
        assert!(negation);
        let window = window.unwrap();
        assert_eq!(window.start, t(17, 0));
        assert_eq!(window.end, t(23, 59));
    }

    #[test]
    fn test_requirement_with_synonym_window() {
        let ParseResult::Parsed(rule) = parse("We need at least 3 people during lunch hours")
        else {
            panic!("expected parse");
        };
        assert_eq!(rule.rule_type, RuleType::Requirement);
        let RulePayload::Requirement {
            window,
            min_headcount,
            ..
        } = rule.payload
        else {
            panic!("wrong payload");
        };
        assert_eq!(min_headcount, 3);
        assert_eq!(window.start, t(11, 0));
        assert_eq!(window.end, t(14, 0));
    }

    #[test]
    fn test_preference_shift_type() {
        let ParseResult::Parsed(rule) = parse("Mike prefers morning shifts") else {
            panic!("expected parse");
        };
        assert_eq!(rule.rule_type, RuleType::Preference);
        let RulePayload::Preference {
            employee_id,
            shift_types,
            ..
        } = rule.payload
        else {
            panic!("wrong payload");
        };
        assert!(employee_id.is_some());
        assert_eq!(shift_types, vec![ShiftType::Morning]);
    }

    #[test]
    fn test_restriction_global_hours() {
        let ParseResult::Parsed(rule) = parse("No more than 40 hours per week") else {
            panic!("expected parse");
        };
        assert_eq!(rule.rule_type, RuleType::Restriction);
        let RulePayload::Restriction {
            scope,
            max_hours_per_week,
            ..
        } = rule.payload
        else {
            panic!("wrong payload");
        };
        assert_eq!(scope, RuleScope::Global);
        assert_eq!(max_hours_per_week, Some(40.0));
    }

    #[test]
    fn test_restriction_rest_hours() {
        let ParseResult::Parsed(rule) = parse("Everyone gets 8 hours rest between shifts") else {
            panic!("expected parse");
        };
        let RulePayload::Restriction { min_rest_hours, .. } = rule.payload else {
            panic!("wrong payload");
        };
        assert_eq!(min_rest_hours, Some(8.0));
    }

    #[test]
    fn test_days_off_availability() {
        let ParseResult::Parsed(rule) = parse("Mike needs Tuesdays off") else {
            panic!("expected parse");
        };
        assert_eq!(rule.rule_type, RuleType::Availability);
        let RulePayload::Availability { days, negation, .. } = rule.payload else {
            panic!("wrong payload");
        };
        assert_eq!(days, vec![chrono::Weekday::Tue]);
        assert!(negation);
    }

    #[test]
    fn test_gibberish_is_ambiguous() {
        assert!(parse("the quick brown fox").is_ambiguous());
        assert!(parse("").is_ambiguous());
    }

    #[test]
    fn test_ambiguous_name_reported() {
        let mut dir = directory();
        dir.push(EmployeeRef {
            id: Uuid::new_v4(),
            first_name: "Sarah".to_string(),
            last_name: "Connor".to_string(),
        });

        let result = parse_rule("Sarah can't work weekends", &SynonymTable::default(), &dir);
        let ParseResult::Ambiguous { reason, .. } = result else {
            panic!("expected ambiguous");
        };
        assert!(reason.contains("Sarah Lee"));
        assert!(reason.contains("Sarah Connor"));
    }

    #[test]
    fn test_determinism() {
        let text = "Sarah can't work past 5pm on weekdays";
        let dir = directory();
        let table = SynonymTable::default();

        let a = parse_rule(text, &table, &dir);
        let b = parse_rule(text, &table, &dir);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap()
        );
    }
}
