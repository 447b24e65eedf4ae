//! Time expression grammar
//!
//! Normalizes clock times ("5pm", "17:00", "5:30 pm"), named periods
//! ("lunch hours", "morning") via a configurable synonym table, and day
//! expressions ("weekdays", "weekends", "Monday").

use chrono::{NaiveTime, Weekday};
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use crate::models::TimeWindow;

lazy_static! {
    static ref CLOCK_12H: Regex =
        Regex::new(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b").expect("12h regex");
    static ref CLOCK_24H: Regex = Regex::new(r"\b([01]?\d|2[0-3]):([0-5]\d)\b").expect("24h regex");
}

/// Named time periods, configurable per deployment
#[derive(Debug, Clone)]
pub struct SynonymTable {
    periods: HashMap<String, TimeWindow>,
}

fn window(sh: u32, sm: u32, eh: u32, em: u32) -> TimeWindow {
    TimeWindow {
        start: NaiveTime::from_hms_opt(sh, sm, 0).unwrap(),
        end: NaiveTime::from_hms_opt(eh, em, 0).unwrap(),
    }
}

impl Default for SynonymTable {
    fn default() -> Self {
        let mut periods = HashMap::new();
        periods.insert("lunch hours".to_string(), window(11, 0, 14, 0));
        periods.insert("lunch".to_string(), window(11, 0, 14, 0));
        periods.insert("morning".to_string(), window(6, 0, 12, 0));
        periods.insert("mornings".to_string(), window(6, 0, 12, 0));
        periods.insert("afternoon".to_string(), window(12, 0, 17, 0));
        periods.insert("afternoons".to_string(), window(12, 0, 17, 0));
        periods.insert("evening".to_string(), window(17, 0, 22, 0));
        periods.insert("evenings".to_string(), window(17, 0, 22, 0));
        periods.insert("dinner".to_string(), window(17, 0, 21, 0));
        Self { periods }
    }
}

impl SynonymTable {
    pub fn with_period(mut self, name: impl Into<String>, period: TimeWindow) -> Self {
        self.periods.insert(name.into().to_lowercase(), period);
        self
    }

    /// Longest synonym found in the text, if any
    pub fn find(&self, text: &str) -> Option<TimeWindow> {
        let lower = text.to_lowercase();
        self.periods
            .iter()
            .filter(|(name, _)| lower.contains(name.as_str()))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, w)| *w)
    }
}

/// A clock time found in text, with its byte offset for ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundTime {
    pub time: NaiveTime,
    pub offset: usize,
}

/// Extract all clock times in order of appearance
pub fn extract_times(text: &str) -> Vec<FoundTime> {
    let mut found = Vec::new();

    for cap in CLOCK_12H.captures_iter(text) {
        let hour: u32 = cap[1].parse().unwrap_or(0);
        let minute: u32 = cap.get(2).map(|m| m.as_str().parse().unwrap_or(0)).unwrap_or(0);
        if hour == 0 || hour > 12 || minute > 59 {
            continue;
        }
        let meridiem = cap[3].to_lowercase();
        let hour24 = match (hour, meridiem.as_str()) {
            (12, "am") => 0,
            (12, "pm") => 12,
            (h, "pm") => h + 12,
            (h, _) => h,
        };
        if let Some(time) = NaiveTime::from_hms_opt(hour24, minute, 0) {
            found.push(FoundTime {
                time,
                offset: cap.get(0).unwrap().start(),
            });
        }
    }

    for cap in CLOCK_24H.captures_iter(text) {
        let offset = cap.get(0).unwrap().start();
        // Skip spans the 12h pass already claimed ("5:30pm" contains "5:30")
        if CLOCK_12H
            .captures_iter(text)
            .any(|c| {
                let m = c.get(0).unwrap();
                offset >= m.start() && offset < m.end()
            })
        {
            continue;
        }
        let hour: u32 = cap[1].parse().unwrap_or(0);
        let minute: u32 = cap[2].parse().unwrap_or(0);
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            found.push(FoundTime { time, offset });
        }
    }

    found.sort_by_key(|f| f.offset);
    found
}

/// Extract day expressions: named weekdays, "weekdays", "weekends", "every day"
pub fn extract_days(text: &str) -> Vec<Weekday> {
    let lower = text.to_lowercase();
    let mut days = Vec::new();

    if lower.contains("weekday") || lower.contains("week days") {
        days.extend([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
        ]);
    }
    if lower.contains("weekend") {
        days.extend([Weekday::Sat, Weekday::Sun]);
    }
    if lower.contains("every day") || lower.contains("everyday") || lower.contains("daily") {
        days.extend([
            Weekday::Mon,
            Weekday::Tue,
            Weekday::Wed,
            Weekday::Thu,
            Weekday::Fri,
            Weekday::Sat,
            Weekday::Sun,
        ]);
    }

    for (names, day) in [
        (["monday", "mondays", "mon"], Weekday::Mon),
        (["tuesday", "tuesdays", "tue"], Weekday::Tue),
        (["wednesday", "wednesdays", "wed"], Weekday::Wed),
        (["thursday", "thursdays", "thu"], Weekday::Thu),
        (["friday", "fridays", "fri"], Weekday::Fri),
        (["saturday", "saturdays", "sat"], Weekday::Sat),
        (["sunday", "sundays", "sun"], Weekday::Sun),
    ] {
        if names.iter().any(|n| contains_word(&lower, n)) {
            days.push(day);
        }
    }

    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    days
}

fn contains_word(haystack: &str, word: &str) -> bool {
    haystack.split(|c: char| !c.is_alphanumeric()).any(|t| t == word)
}

/// End-of-day sentinel used for "past X" windows
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap()
}

/// Start-of-day sentinel used for "before X" windows
pub fn start_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(0, 0, 0).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn test_12h_clock() {
        let times = extract_times("works until 5pm");
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].time, t(17, 0));

        let times = extract_times("from 9am to 5:30pm");
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].time, t(9, 0));
        assert_eq!(times[1].time, t(17, 30));
    }

    #[test]
    fn test_midnight_and_noon() {
        assert_eq!(extract_times("starts at 12am")[0].time, t(0, 0));
        assert_eq!(extract_times("lunch at 12pm")[0].time, t(12, 0));
    }

    #[test]
    fn test_24h_clock() {
        let times = extract_times("between 17:00 and 22:30");
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].time, t(17, 0));
        assert_eq!(times[1].time, t(22, 30));
    }

    #[test]
    fn test_mixed_formats_keep_order() {
        let times = extract_times("from 08:00 until 5pm");
        assert_eq!(times.len(), 2);
        assert_eq!(times[0].time, t(8, 0));
        assert_eq!(times[1].time, t(17, 0));
    }

    #[test]
    fn test_no_double_count() {
        // "5:30pm" must not also match as a bare 24h "5:30"
        let times = extract_times("ends at 5:30pm");
        assert_eq!(times.len(), 1);
        assert_eq!(times[0].time, t(17, 30));
    }

    #[test]
    fn test_weekday_extraction() {
        assert_eq!(
            extract_days("on weekdays"),
            vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri]
        );
        assert_eq!(extract_days("weekend shifts"), vec![Weekday::Sat, Weekday::Sun]);
        assert_eq!(extract_days("on Mondays and Fridays"), vec![Weekday::Mon, Weekday::Fri]);
        assert!(extract_days("no days named").is_empty());
    }

    #[test]
    fn test_day_word_boundaries() {
        // "saturated" must not match "sat"
        assert!(extract_days("the market is saturated").is_empty());
    }

    #[test]
    fn test_synonym_table() {
        let table = SynonymTable::default();
        let lunch = table.find("at least 3 people during lunch hours").unwrap();
        assert_eq!(lunch.start, t(11, 0));
        assert_eq!(lunch.end, t(14, 0));

        assert!(table.find("no named period here").is_none());
    }

    #[test]
    fn test_synonym_override() {
        let table = SynonymTable::default().with_period(
            "lunch hours",
            TimeWindow {
                start: t(12, 0),
                end: t(13, 0),
            },
        );
        let lunch = table.find("during lunch hours").unwrap();
        assert_eq!(lunch.start, t(12, 0));
    }
}
