//! Entity extraction: employee references and quantities

use lazy_static::lazy_static;
use regex::Regex;
use uuid::Uuid;

lazy_static! {
    static ref HEADCOUNT: Regex = Regex::new(
        r"(?i)\b(?:at least|minimum(?: of)?|need(?:s)?)\s+(\d{1,3})\s+(?:people|persons|staff|employees|workers)\b"
    )
    .expect("headcount regex");
    static ref BARE_COUNT: Regex =
        Regex::new(r"(?i)\b(\d{1,3})\s+(?:people|persons|staff|employees|workers)\b")
            .expect("bare count regex");
    static ref HOURS: Regex = Regex::new(
        r"(?i)\b(?:no more than|at most|max(?:imum)?(?: of)?|up to)\s+(\d{1,3})\s+hours?\b"
    )
    .expect("hours regex");
    static ref REST_HOURS: Regex =
        Regex::new(r"(?i)\b(\d{1,2})\s+hours?\s+(?:of\s+)?(?:rest|break)\b").expect("rest regex");
}

/// A directory entry the parser resolves names against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmployeeRef {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
}

impl EmployeeRef {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Outcome of name resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameMatch {
    /// Exactly one employee matched
    One(EmployeeRef),
    /// The name matched several employees
    Many(Vec<EmployeeRef>),
    /// No employee name appears in the text
    None,
}

/// Resolve an employee mention by exact full-name, then first/last-name match
///
/// Matching is case-insensitive over word tokens, so "sarah" finds
/// "Sarah Lee" and "Sarah Lee" beats a bare "Sarah" elsewhere.
pub fn resolve_employee(text: &str, directory: &[EmployeeRef]) -> NameMatch {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();

    // Exact "first last" adjacency wins outright
    let mut full_matches: Vec<EmployeeRef> = Vec::new();
    for e in directory {
        let first = e.first_name.to_lowercase();
        let last = e.last_name.to_lowercase();
        if tokens
            .windows(2)
            .any(|pair| pair[0] == first && pair[1] == last)
        {
            full_matches.push(e.clone());
        }
    }
    match full_matches.len() {
        1 => return NameMatch::One(full_matches.remove(0)),
        n if n > 1 => return NameMatch::Many(full_matches),
        _ => {}
    }

    // Single-name mention: first or last name as a standalone token
    let mut partial: Vec<EmployeeRef> = directory
        .iter()
        .filter(|e| {
            let first = e.first_name.to_lowercase();
            let last = e.last_name.to_lowercase();
            tokens.iter().any(|t| *t == first || *t == last)
        })
        .cloned()
        .collect();

    match partial.len() {
        0 => NameMatch::None,
        1 => NameMatch::One(partial.remove(0)),
        _ => NameMatch::Many(partial),
    }
}

/// Extract a minimum headcount ("at least 3 people")
pub fn extract_headcount(text: &str) -> Option<u32> {
    HEADCOUNT
        .captures(text)
        .or_else(|| BARE_COUNT.captures(text))
        .and_then(|cap| cap[1].parse().ok())
}

/// Extract a weekly hour cap ("no more than 40 hours")
pub fn extract_max_hours(text: &str) -> Option<f64> {
    HOURS.captures(text).and_then(|cap| cap[1].parse().ok())
}

/// Extract a minimum rest requirement ("8 hours rest between shifts")
pub fn extract_rest_hours(text: &str) -> Option<f64> {
    REST_HOURS.captures(text).and_then(|cap| cap[1].parse().ok())
}

/// Negation detection over the whole sentence
pub fn is_negated(text: &str) -> bool {
    let lower = text.to_lowercase();
    ["can't", "cannot", "can not", "won't", "never", "not available", "unavailable", "no longer"]
        .iter()
        .any(|marker| lower.contains(marker))
        || lower.contains(" off")
        || lower.ends_with(" off")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> Vec<EmployeeRef> {
        vec![
            EmployeeRef {
                id: Uuid::new_v4(),
                first_name: "Sarah".to_string(),
                last_name: "Lee".to_string(),
            },
            EmployeeRef {
                id: Uuid::new_v4(),
                first_name: "Sarah".to_string(),
                last_name: "Connor".to_string(),
            },
            EmployeeRef {
                id: Uuid::new_v4(),
                first_name: "Mike".to_string(),
                last_name: "Park".to_string(),
            },
        ]
    }

    #[test]
    fn test_full_name_resolution() {
        let dir = directory();
        match resolve_employee("Sarah Lee can't work late", &dir) {
            NameMatch::One(e) => assert_eq!(e.last_name, "Lee"),
            other => panic!("expected one match, got {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_first_name() {
        let dir = directory();
        match resolve_employee("Sarah can't work past 5pm", &dir) {
            NameMatch::Many(matches) => assert_eq!(matches.len(), 2),
            other => panic!("expected many, got {other:?}"),
        }
    }

    #[test]
    fn test_unique_first_name() {
        let dir = directory();
        match resolve_employee("mike prefers morning shifts", &dir) {
            NameMatch::One(e) => assert_eq!(e.first_name, "Mike"),
            other => panic!("expected one match, got {other:?}"),
        }
    }

    #[test]
    fn test_no_name() {
        assert_eq!(
            resolve_employee("at least 3 people during lunch", &directory()),
            NameMatch::None
        );
    }

    #[test]
    fn test_headcount_extraction() {
        assert_eq!(extract_headcount("at least 3 people during lunch"), Some(3));
        assert_eq!(extract_headcount("need 2 staff on Saturdays"), Some(2));
        assert_eq!(extract_headcount("minimum of 5 workers"), Some(5));
        assert_eq!(extract_headcount("nothing here"), None);
    }

    #[test]
    fn test_hours_extraction() {
        assert_eq!(extract_max_hours("no more than 40 hours per week"), Some(40.0));
        assert_eq!(extract_max_hours("at most 32 hours"), Some(32.0));
        assert_eq!(extract_max_hours("40 hours"), None);
    }

    #[test]
    fn test_rest_extraction() {
        assert_eq!(extract_rest_hours("8 hours rest between shifts"), Some(8.0));
        assert_eq!(extract_rest_hours("10 hours of rest"), Some(10.0));
        assert_eq!(extract_rest_hours("no rest mention"), None);
    }

    #[test]
    fn test_negation() {
        assert!(is_negated("Sarah can't work past 5pm"));
        assert!(is_negated("Mike cannot work weekends"));
        assert!(is_negated("Jo needs Tuesdays off"));
        assert!(!is_negated("Mike prefers morning shifts"));
    }
}
