//! Rule parser scenarios over a realistic employee directory

use chrono::Weekday;
use uuid::Uuid;

use rota::models::{RulePayload, RuleScope, RuleType, ShiftType};
use rota::parser::{parse_rule, EmployeeRef, ParseResult, SynonymTable};

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
        EmployeeRef {
            id: Uuid::new_v4(),
            first_name: "Dana".to_string(),
            last_name: "Cho".to_string(),
        },
    ]
}

fn parse(text: &str) -> ParseResult {
    parse_rule(text, &SynonymTable::default(), &directory())
}

fn expect_parsed(text: &str) -> rota::parser::ParsedRule {
    match parse(text) {
        ParseResult::Parsed(rule) => rule,
        ParseResult::Ambiguous { reason, .. } => {
            panic!("expected a parse for {text:?}, got ambiguous: {reason}")
        }
    }
}

// S4's structured form: availability, weekdays, 17:00-23:59, negated
#[test]
fn availability_past_time_on_weekdays() {
    let rule = expect_parsed("Sarah can't work past 5pm on weekdays");

    assert_eq!(rule.rule_type, RuleType::Availability);
    let RulePayload::Availability {
        employee_id,
        days,
        window,
        negation,
    } = rule.payload
    else {
        panic!("wrong payload type");
    };
    assert!(employee_id.is_some());
    assert_eq!(
        days,
        vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
    );
    assert!(negation);
    let w = window.unwrap();
    assert_eq!(w.start.format("%H:%M").to_string(), "17:00");
}

#[test]
fn requirement_with_headcount_and_period() {
    let rule = expect_parsed("We need at least 3 people during lunch hours");

    let RulePayload::Requirement {
        min_headcount,
        window,
        ..
    } = rule.payload
    else {
        panic!("wrong payload type");
    };
    assert_eq!(min_headcount, 3);
    assert_eq!(window.start.format("%H:%M").to_string(), "11:00");
    assert_eq!(window.end.format("%H:%M").to_string(), "14:00");
}

#[test]
fn preference_for_shift_type() {
    let rule = expect_parsed("Mike prefers morning shifts");

    let RulePayload::Preference {
        employee_id,
        shift_types,
        ..
    } = rule.payload
    else {
        panic!("wrong payload type");
    };
    assert!(employee_id.is_some());
    assert_eq!(shift_types, vec![ShiftType::Morning]);
}

#[test]
fn global_hour_restriction() {
    let rule = expect_parsed("No more than 40 hours per week for anyone");

    let RulePayload::Restriction {
        scope,
        max_hours_per_week,
        ..
    } = rule.payload
    else {
        panic!("wrong payload type");
    };
    assert_eq!(scope, RuleScope::Global);
    assert_eq!(max_hours_per_week, Some(40.0));
}

#[test]
fn rest_restriction() {
    let rule = expect_parsed("Everyone needs 8 hours rest between shifts");

    let RulePayload::Restriction { min_rest_hours, .. } = rule.payload else {
        panic!("wrong payload type");
    };
    assert_eq!(min_rest_hours, Some(8.0));
}

#[test]
fn day_off_request() {
    let rule = expect_parsed("Dana needs Tuesdays off");

    let RulePayload::Availability { days, negation, .. } = rule.payload else {
        panic!("wrong payload type");
    };
    assert_eq!(days, vec![Weekday::Tue]);
    assert!(negation);
}

#[test]
fn ambiguous_name_lists_candidates() {
    let mut dir = directory();
    dir.push(EmployeeRef {
        id: Uuid::new_v4(),
        first_name: "Sarah".to_string(),
        last_name: "Kim".to_string(),
    });

    let result = parse_rule(
        "Sarah can't work weekends",
        &SynonymTable::default(),
        &dir,
    );
    let ParseResult::Ambiguous { reason, .. } = result else {
        panic!("expected ambiguous result");
    };
    assert!(reason.contains("Sarah"));
}

#[test]
fn unrelated_text_is_ambiguous() {
    assert!(parse("please water the office plants").is_ambiguous());
}

// Determinism: same text, synonym table, and directory snapshot
#[test]
fn parsing_is_deterministic() {
    let dir = directory();
    let table = SynonymTable::default();
    for text in [
        "Sarah can't work past 5pm on weekdays",
        "We need at least 3 people during lunch hours",
        "Mike prefers morning shifts",
        "No more than 40 hours per week",
    ] {
        let a = parse_rule(text, &table, &dir);
        let b = parse_rule(text, &table, &dir);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            serde_json::to_value(&b).unwrap(),
            "non-deterministic parse for {text:?}"
        );
    }
}

// A customized synonym table changes the structured output
#[test]
fn synonym_table_is_configurable() {
    let table = SynonymTable::default().with_period(
        "lunch hours",
        rota::models::TimeWindow::new(
            chrono::NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
            chrono::NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
        )
        .unwrap(),
    );

    let result = parse_rule("at least 2 people during lunch hours", &table, &directory());
    let ParseResult::Parsed(rule) = result else {
        panic!("expected parse");
    };
    let RulePayload::Requirement { window, .. } = rule.payload else {
        panic!("wrong payload type");
    };
    assert_eq!(window.start.format("%H:%M").to_string(), "12:00");
}
