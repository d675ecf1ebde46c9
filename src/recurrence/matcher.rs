//! Deterministic recurrence matcher.
//!
//! Patterns are tried from most to least specific; the first hit wins.

use chrono::Weekday;
use regex::Regex;
use serde::Serialize;

use crate::entities::{Frequency, Recurrence, weekday_from_name};

const FULL_DAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
const SHORT_DAYS: &str = "mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun";
const PLURAL_DAYS: &str = "mondays|tuesdays|wednesdays|thursdays|fridays|saturdays|sundays";

/// Which pattern produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// "every Wednesday", "each other Monday and Thursday", "every weekday"
    ExplicitDays,
    /// "on Wednesdays"
    PluralDays,
    /// "every wed"
    AbbreviatedDays,
    /// "every 2 weeks", "daily", "monthly"
    Generic,
}

impl PatternKind {
    /// Whether the text named specific days.
    pub fn names_days(&self) -> bool {
        !matches!(self, Self::Generic)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecurrenceMatch {
    pub recurrence: Recurrence,
    pub pattern: PatternKind,
}

pub struct RecurrenceMatcher {
    explicit_days: Regex,
    every_weekday: Regex,
    every_weekend: Regex,
    plural_days: Regex,
    abbreviated_days: Regex,
    day_name: Regex,
    every_n: Regex,
    daily: Regex,
    weekly: Regex,
    monthly: Regex,
    yearly: Regex,
}

impl RecurrenceMatcher {
    pub fn new() -> Self {
        let day_list = |days: &str| format!(r"(?:{days})(?:\s*(?:,|and|&)\s*(?:{days}))*");
        Self {
            explicit_days: Regex::new(&format!(
                r"(?i)\b(?:every|each)\s+(other\s+)?({})\b",
                day_list(FULL_DAYS)
            ))
            .unwrap(),
            every_weekday: Regex::new(r"(?i)\b(?:every|each)\s+weekday\b").unwrap(),
            every_weekend: Regex::new(r"(?i)\b(?:every|each)\s+weekend\b").unwrap(),
            plural_days: Regex::new(&format!(r"(?i)\b({PLURAL_DAYS})\b")).unwrap(),
            abbreviated_days: Regex::new(&format!(
                r"(?i)\b(?:every|each)\s+(other\s+)?({})\b",
                day_list(SHORT_DAYS)
            ))
            .unwrap(),
            day_name: Regex::new(&format!(r"(?i)\b({FULL_DAYS}|{SHORT_DAYS})s?\b")).unwrap(),
            every_n: Regex::new(r"(?i)\b(?:every|each)\s+(\d{1,3}|other)\s+(day|week|month|year)s?\b")
                .unwrap(),
            daily: Regex::new(r"(?i)\b(?:daily|every\s+day|each\s+day)\b").unwrap(),
            weekly: Regex::new(r"(?i)\b(?:weekly|every\s+week|each\s+week)\b").unwrap(),
            monthly: Regex::new(r"(?i)\b(?:monthly|every\s+month|each\s+month)\b").unwrap(),
            yearly: Regex::new(r"(?i)\b(?:yearly|annually|every\s+year|each\s+year)\b").unwrap(),
        }
    }

    /// Find the most specific recurrence the text states, if any.
    pub fn find(&self, text: &str) -> Option<RecurrenceMatch> {
        self.explicit(text)
            .or_else(|| self.plural(text))
            .or_else(|| self.abbreviated(text))
            .or_else(|| self.generic(text))
    }

    fn explicit(&self, text: &str) -> Option<RecurrenceMatch> {
        if let Some(c) = self.explicit_days.captures(text) {
            let days = self.days_in(&c[2]);
            if !days.is_empty() {
                let interval = if c.get(1).is_some() { 2 } else { 1 };
                return Some(weekly(days, interval, PatternKind::ExplicitDays));
            }
        }
        if self.every_weekday.is_match(text) {
            return Some(weekly(
                vec![Weekday::Mon, Weekday::Tue, Weekday::Wed, Weekday::Thu, Weekday::Fri],
                1,
                PatternKind::ExplicitDays,
            ));
        }
        if self.every_weekend.is_match(text) {
            return Some(weekly(
                vec![Weekday::Sat, Weekday::Sun],
                1,
                PatternKind::ExplicitDays,
            ));
        }
        None
    }

    fn plural(&self, text: &str) -> Option<RecurrenceMatch> {
        let days: Vec<Weekday> = self
            .plural_days
            .captures_iter(text)
            .filter_map(|c| weekday_from_name(c[1].trim_end_matches(['s', 'S'])))
            .collect();
        (!days.is_empty()).then(|| weekly(days, 1, PatternKind::PluralDays))
    }

    fn abbreviated(&self, text: &str) -> Option<RecurrenceMatch> {
        let c = self.abbreviated_days.captures(text)?;
        let days = self.days_in(&c[2]);
        let interval = if c.get(1).is_some() { 2 } else { 1 };
        (!days.is_empty()).then(|| weekly(days, interval, PatternKind::AbbreviatedDays))
    }

    fn generic(&self, text: &str) -> Option<RecurrenceMatch> {
        let recurrence = if let Some(c) = self.every_n.captures(text) {
            let interval = match &c[1] {
                n if n.eq_ignore_ascii_case("other") => 2,
                n => n.parse().ok()?,
            };
            Recurrence::new(c[2].parse::<Frequency>().ok()?).with_interval(interval)
        } else if self.daily.is_match(text) {
            Recurrence::new(Frequency::Daily)
        } else if self.weekly.is_match(text) {
            Recurrence::new(Frequency::Weekly)
        } else if self.monthly.is_match(text) {
            Recurrence::new(Frequency::Monthly)
        } else if self.yearly.is_match(text) {
            Recurrence::new(Frequency::Yearly)
        } else {
            return None;
        };

        Some(RecurrenceMatch {
            recurrence,
            pattern: PatternKind::Generic,
        })
    }

    fn days_in(&self, list: &str) -> Vec<Weekday> {
        self.day_name
            .captures_iter(list)
            .filter_map(|c| weekday_from_name(&c[1]))
            .collect()
    }
}

impl Default for RecurrenceMatcher {
    fn default() -> Self {
        Self::new()
    }
}

fn weekly(days: Vec<Weekday>, interval: u32, pattern: PatternKind) -> RecurrenceMatch {
    RecurrenceMatch {
        recurrence: Recurrence::weekly_on(days).with_interval(interval),
        pattern,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn find(text: &str) -> Option<RecurrenceMatch> {
        RecurrenceMatcher::new().find(text)
    }

    fn days(text: &str) -> Vec<Weekday> {
        find(text).unwrap().recurrence.days_of_week
    }

    #[test]
    fn explicit_single_and_multiple_days() {
        let m = find("Meeting tomorrow at 3 with Dana and Ron every Wednesday").unwrap();
        assert_eq!(m.pattern, PatternKind::ExplicitDays);
        assert_eq!(m.recurrence.frequency, Frequency::Weekly);
        assert_eq!(m.recurrence.days_of_week, vec![Weekday::Wed]);

        assert_eq!(
            days("gym every Monday, Wednesday and Friday"),
            vec![Weekday::Mon, Weekday::Wed, Weekday::Fri]
        );
    }

    #[test]
    fn every_other_sets_interval() {
        let m = find("cleaning each other Thursday").unwrap();
        assert_eq!(m.recurrence.interval, 2);
        assert_eq!(m.recurrence.days_of_week, vec![Weekday::Thu]);
    }

    #[test]
    fn weekday_and_weekend() {
        assert_eq!(days("standup every weekday at 9").len(), 5);
        assert_eq!(
            days("hike every weekend"),
            vec![Weekday::Sat, Weekday::Sun]
        );
    }

    #[test]
    fn plural_days() {
        let m = find("piano on Tuesdays and Thursdays").unwrap();
        assert_eq!(m.pattern, PatternKind::PluralDays);
        assert_eq!(m.recurrence.days_of_week, vec![Weekday::Tue, Weekday::Thu]);
    }

    #[test]
    fn abbreviated_days() {
        let m = find("yoga every wed").unwrap();
        assert_eq!(m.pattern, PatternKind::AbbreviatedDays);
        assert_eq!(m.recurrence.days_of_week, vec![Weekday::Wed]);
    }

    #[test]
    fn explicit_beats_generic() {
        // "every week" also matches, but the day name is more specific.
        let m = find("every week, every Friday").unwrap();
        assert_eq!(m.pattern, PatternKind::ExplicitDays);
    }

    #[test]
    fn generic_frequencies() {
        let m = find("water plants every 3 days").unwrap();
        assert_eq!(m.pattern, PatternKind::Generic);
        assert_eq!(m.recurrence.frequency, Frequency::Daily);
        assert_eq!(m.recurrence.interval, 3);

        assert_eq!(
            find("review every other week").unwrap().recurrence.interval,
            2
        );
        assert_eq!(find("pills daily").unwrap().recurrence.frequency, Frequency::Daily);
        assert_eq!(find("report every day").unwrap().recurrence.frequency, Frequency::Daily);
        assert_eq!(find("sync weekly").unwrap().recurrence.frequency, Frequency::Weekly);
        assert_eq!(find("rent monthly").unwrap().recurrence.frequency, Frequency::Monthly);
        assert_eq!(
            find("checkup annually").unwrap().recurrence.frequency,
            Frequency::Yearly
        );
        assert!(!find("rent monthly").unwrap().pattern.names_days());
    }

    #[test]
    fn no_recurrence() {
        assert!(find("dentist on Wednesday").is_none());
        assert!(find("lunch tomorrow").is_none());
    }
}
