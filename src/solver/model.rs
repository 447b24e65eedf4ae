//! Constraint model lowering
//!
//! Flattens the snapshot into index-based tables the search can evaluate
//! cheaply: an eligibility matrix with rejection reasons, per-employee hour
//! caps and rest floors, preference targets, and synthesized coverage
//! windows from global requirement rules.

use std::collections::{HashMap, HashSet};

use chrono::Weekday;
use uuid::Uuid;

use crate::models::{
    Employee, Rule, RulePayload, RuleScope, Shift, ShiftType, TimeWindow,
};

use super::plan::{SolverOptions, SolverSnapshot};

/// Why an employee cannot take a shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ineligibility {
    QualificationMissing,
    Unavailable,
    BlockedByRule,
}

impl Ineligibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QualificationMissing => "qualification_missing",
            Self::Unavailable => "unavailable",
            Self::BlockedByRule => "blocked_by_rule",
        }
    }
}

/// A preference rule lowered to matchable shift characteristics
#[derive(Debug, Clone)]
pub struct PreferenceTarget {
    /// Employee index, or None for a global preference
    pub employee: Option<usize>,
    pub days: Vec<Weekday>,
    pub windows: Vec<TimeWindow>,
    pub shift_types: Vec<ShiftType>,
}

impl PreferenceTarget {
    /// Whether the shift matches any preferred characteristic
    pub fn matches(&self, shift: &Shift) -> bool {
        self.days.contains(&shift.weekday())
            || self.windows.iter().any(|w| w.overlaps(&shift.window))
            || self.shift_types.contains(&shift.shift_type)
    }
}

/// A global requirement lowered to a coverage check
#[derive(Debug, Clone)]
pub struct CoverageWindow {
    pub window: TimeWindow,
    pub min_headcount: u32,
    pub qualification: Option<String>,
    pub days: Vec<Weekday>,
}

/// The lowered model
pub struct Model {
    /// eligibility[shift][employee]: None = eligible, Some(reason) otherwise
    pub eligibility: Vec<Vec<Option<Ineligibility>>>,
    /// Weekly hour cap per employee (profile cap tightened by rules)
    pub hour_caps: Vec<f64>,
    /// Rest floor per employee in hours; 0 when no restriction rule demands rest
    pub rest_floors: Vec<f64>,
    pub preferences: Vec<PreferenceTarget>,
    pub coverage_windows: Vec<CoverageWindow>,
    /// prior_plan membership as (employee_idx, shift_idx)
    pub prior: HashSet<(usize, usize)>,
}

impl Model {
    /// Lower a snapshot into the index-based model
    pub fn lower(snapshot: &SolverSnapshot, options: &SolverOptions) -> Self {
        let employees = &snapshot.employees;
        let shifts = &snapshot.shifts;

        let employee_index: HashMap<Uuid, usize> = employees
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id, i))
            .collect();
        let shift_index: HashMap<Uuid, usize> =
            shifts.iter().enumerate().map(|(i, s)| (s.id, i)).collect();

        // Rule-derived caps and floors
        let mut hour_caps: Vec<f64> = employees.iter().map(|e| e.max_hours_per_week).collect();
        let mut rest_floors = vec![0.0f64; employees.len()];
        let mut preferences = Vec::new();
        let mut coverage_windows = Vec::new();

        for rule in snapshot.rules.iter().filter(|r| r.active) {
            match &rule.payload {
                RulePayload::Restriction {
                    scope,
                    employee_id,
                    max_hours_per_week,
                    min_rest_hours,
                } => {
                    let targets: Vec<usize> = match (scope, employee_id) {
                        (RuleScope::Employee, Some(id)) => {
                            employee_index.get(id).copied().into_iter().collect()
                        }
                        _ => (0..employees.len()).collect(),
                    };
                    for idx in targets {
                        if let Some(cap) = max_hours_per_week {
                            hour_caps[idx] = hour_caps[idx].min(*cap);
                        }
                        if min_rest_hours.is_some() {
                            let floor =
                                min_rest_hours.unwrap().max(options.default_min_rest_hours);
                            rest_floors[idx] = rest_floors[idx].max(floor);
                        }
                    }
                }
                RulePayload::Preference {
                    employee_id,
                    days,
                    windows,
                    shift_types,
                } => {
                    preferences.push(PreferenceTarget {
                        employee: employee_id.and_then(|id| employee_index.get(&id).copied()),
                        days: days.clone(),
                        windows: windows.clone(),
                        shift_types: shift_types.clone(),
                    });
                }
                RulePayload::Requirement {
                    window,
                    min_headcount,
                    qualification,
                    days,
                } => {
                    coverage_windows.push(CoverageWindow {
                        window: *window,
                        min_headcount: *min_headcount,
                        qualification: qualification.clone(),
                        days: days.clone(),
                    });
                }
                RulePayload::Availability { .. } => {
                    // Folded into the eligibility matrix below
                }
            }
        }

        // Eligibility matrix
        let mut eligibility = vec![vec![None; employees.len()]; shifts.len()];
        for (si, shift) in shifts.iter().enumerate() {
            for (ei, employee) in employees.iter().enumerate() {
                eligibility[si][ei] = check_eligibility(employee, shift, &snapshot.rules);
            }
        }

        // Prior plan membership
        let prior = snapshot
            .prior_plan
            .iter()
            .filter_map(|(e, s)| {
                Some((*employee_index.get(e)?, *shift_index.get(s)?))
            })
            .collect();

        Self {
            eligibility,
            hour_caps,
            rest_floors,
            preferences,
            coverage_windows,
            prior,
        }
    }

    /// Preference targets applying to one employee index
    pub fn preferences_for(&self, employee: usize) -> impl Iterator<Item = &PreferenceTarget> {
        self.preferences
            .iter()
            .filter(move |p| p.employee.is_none() || p.employee == Some(employee))
    }
}

/// Hard eligibility: qualification, availability map, availability rules
fn check_eligibility(
    employee: &Employee,
    shift: &Shift,
    rules: &[Rule],
) -> Option<Ineligibility> {
    if !employee.is_active {
        return Some(Ineligibility::Unavailable);
    }
    if !employee.is_qualified_for(&shift.requirements) {
        return Some(Ineligibility::QualificationMissing);
    }
    if !employee.availability.covers(shift.weekday(), &shift.window) {
        return Some(Ineligibility::Unavailable);
    }

    for rule in rules.iter().filter(|r| r.active) {
        let RulePayload::Availability {
            employee_id,
            days,
            window,
            negation,
        } = &rule.payload
        else {
            continue;
        };
        // Employee-scoped rules only bind their target
        if employee_id.map(|id| id != employee.id).unwrap_or(false) {
            continue;
        }

        let day_applies = days.is_empty() || days.contains(&shift.weekday());
        if *negation {
            // Blocked when the shift touches the forbidden day/window
            let window_hits = window.map(|w| w.overlaps(&shift.window)).unwrap_or(true);
            if day_applies && window_hits {
                return Some(Ineligibility::BlockedByRule);
            }
        } else {
            // "Only available": the shift must fall inside the allowed combo
            if !day_applies {
                return Some(Ineligibility::BlockedByRule);
            }
            if let Some(allowed) = window {
                if !allowed.contains(&shift.window) {
                    return Some(Ineligibility::BlockedByRule);
                }
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Availability, Rule};
    use chrono::{NaiveDate, NaiveTime, Utc};

    fn t(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    fn window(start: u32, end: u32) -> TimeWindow {
        TimeWindow::new(t(start), t(end)).unwrap()
    }

    fn employee(name: &str, quals: &[&str]) -> Employee {
        let now = Utc::now();
        Employee {
            id: Uuid::new_v4(),
            email: format!("{name}@example.com"),
            password_hash: String::new(),
            role: crate::models::Role::Employee,
            is_active: true,
            email_verified: true,
            account_locked: false,
            failed_login_attempts: 0,
            password_must_change: false,
            department_id: None,
            first_name: name.to_string(),
            last_name: "Test".to_string(),
            phone: None,
            hire_date: None,
            hourly_rate: 15.0,
            max_hours_per_week: 40.0,
            qualifications: quals.iter().map(|s| s.to_string()).collect(),
            availability: Availability::all_week(window(9, 17)),
            password_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn shift_on(date: NaiveDate, start: u32, end: u32, reqs: &[&str]) -> Shift {
        let now = Utc::now();
        Shift {
            id: Uuid::new_v4(),
            date,
            window: window(start, end),
            shift_type: ShiftType::Morning,
            department_id: None,
            required_staff: 1,
            priority: 5,
            requirements: reqs.iter().map(|s| s.to_string()).collect(),
            overnight: false,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    // 2024-03-04 is a Monday
    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    #[test]
    fn test_qualification_gate() {
        let cook = employee("cook", &["cook"]);
        let cashier = employee("cashier", &["cashier"]);
        let shift = shift_on(monday(), 9, 13, &["cook"]);

        assert_eq!(check_eligibility(&cook, &shift, &[]), None);
        assert_eq!(
            check_eligibility(&cashier, &shift, &[]),
            Some(Ineligibility::QualificationMissing)
        );
    }

    #[test]
    fn test_availability_gate() {
        let e = employee("a", &[]);
        // Availability is 9-17; an 8-12 shift starts too early
        let early = shift_on(monday(), 8, 12, &[]);
        assert_eq!(
            check_eligibility(&e, &early, &[]),
            Some(Ineligibility::Unavailable)
        );
    }

    #[test]
    fn test_negated_availability_rule_blocks() {
        let mut e = employee("sarah", &[]);
        e.availability = Availability::all_week(window(9, 23));
        let evening = shift_on(monday(), 18, 22, &[]);

        let rule = Rule::new(
            "Sarah can't work past 5pm on weekdays",
            RulePayload::Availability {
                employee_id: Some(e.id),
                days: vec![
                    Weekday::Mon,
                    Weekday::Tue,
                    Weekday::Wed,
                    Weekday::Thu,
                    Weekday::Fri,
                ],
                window: Some(TimeWindow {
                    start: t(17),
                    end: NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
                }),
                negation: true,
            },
        );

        assert_eq!(
            check_eligibility(&e, &evening, &[rule.clone()]),
            Some(Ineligibility::BlockedByRule)
        );

        // Other employees are unaffected
        let mut other = employee("other", &[]);
        other.availability = Availability::all_week(window(9, 23));
        assert_eq!(check_eligibility(&other, &evening, &[rule]), None);
    }

    #[test]
    fn test_only_available_rule() {
        let mut e = employee("a", &[]);
        e.availability = Availability::all_week(window(6, 23));
        let rule = Rule::new(
            "only available weekday mornings",
            RulePayload::Availability {
                employee_id: Some(e.id),
                days: vec![Weekday::Mon, Weekday::Tue],
                window: Some(window(6, 12)),
                negation: false,
            },
        );

        let morning = shift_on(monday(), 9, 12, &[]);
        let afternoon = shift_on(monday(), 13, 17, &[]);

        assert_eq!(check_eligibility(&e, &morning, std::slice::from_ref(&rule)), None);
        assert_eq!(
            check_eligibility(&e, &afternoon, &[rule]),
            Some(Ineligibility::BlockedByRule)
        );
    }

    #[test]
    fn test_restriction_rule_tightens_cap() {
        let e = employee("a", &[]);
        let snapshot = SolverSnapshot {
            employees: vec![e],
            shifts: vec![],
            rules: vec![Rule::new(
                "no more than 30 hours",
                RulePayload::Restriction {
                    scope: RuleScope::Global,
                    employee_id: None,
                    max_hours_per_week: Some(30.0),
                    min_rest_hours: Some(10.0),
                },
            )],
            prior_plan: vec![],
        };
        let model = Model::lower(&snapshot, &SolverOptions::default());

        assert_eq!(model.hour_caps[0], 30.0);
        assert_eq!(model.rest_floors[0], 10.0);
    }

    #[test]
    fn test_rest_floor_uses_default_when_lower() {
        let e = employee("a", &[]);
        let snapshot = SolverSnapshot {
            employees: vec![e],
            shifts: vec![],
            rules: vec![Rule::new(
                "4 hours rest",
                RulePayload::Restriction {
                    scope: RuleScope::Global,
                    employee_id: None,
                    max_hours_per_week: None,
                    min_rest_hours: Some(4.0),
                },
            )],
            prior_plan: vec![],
        };
        let model = Model::lower(&snapshot, &SolverOptions::default());

        // The configured floor (8h) wins over a weaker rule
        assert_eq!(model.rest_floors[0], 8.0);
    }
}
