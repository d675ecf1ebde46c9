//! Structured entities extracted from a message.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

// ── Entity bag ──────────────────────────────────────────────────────

/// Everything known about the calendar item a message describes.
///
/// Field ownership:
/// - `participants` is written only by participant resolution. Entity fusion
///   writes its union into `provisional_participants` instead.
/// - `recurrence` is finalized by recurrence resolution; entity fusion only
///   seeds it with the probabilistic guess.
/// - `confidence` starts as the weighted fusion score and is adjusted by
///   validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityBag {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    /// The date phrase as the user wrote it ("tomorrow", "next friday").
    pub date_text: Option<String>,
    pub location: Option<String>,
    pub participants: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provisional_participants: Vec<String>,
    pub duration_minutes: Option<u32>,
    pub recurrence: Option<Recurrence>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
    pub confidence: f32,
    /// Names of fields filled from the user's history.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub defaults_applied: Vec<String>,
}

impl EntityBag {
    /// True when nothing at all was extracted.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.location.is_none()
            && self.participants.is_empty()
            && self.provisional_participants.is_empty()
            && self.duration_minutes.is_none()
            && self.recurrence.is_none()
    }
}

// ── Priority ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" | "medium" => Ok(Self::Normal),
            "high" | "urgent" => Ok(Self::High),
            other => Err(format!("unknown priority '{other}'")),
        }
    }
}

// ── Recurrence ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "daily" | "day" => Ok(Self::Daily),
            "weekly" | "week" => Ok(Self::Weekly),
            "monthly" | "month" => Ok(Self::Monthly),
            "yearly" | "year" | "annually" => Ok(Self::Yearly),
            other => Err(format!("unknown frequency '{other}'")),
        }
    }
}

impl Frequency {
    fn unit(&self) -> &'static str {
        match self {
            Self::Daily => "day",
            Self::Weekly => "week",
            Self::Monthly => "month",
            Self::Yearly => "year",
        }
    }
}

/// A recurring schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub frequency: Frequency,
    /// Repeat every `interval` units (1 = every, 2 = every other).
    pub interval: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub days_of_week: Vec<Weekday>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exceptions: Vec<NaiveDate>,
}

impl Recurrence {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            interval: 1,
            days_of_week: Vec::new(),
            until: None,
            exceptions: Vec::new(),
        }
    }

    pub fn weekly_on(days: Vec<Weekday>) -> Self {
        let mut rec = Self::new(Frequency::Weekly);
        rec.days_of_week = normalize_days(days);
        rec
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval.max(1);
        self
    }

    /// Same frequency, interval and day set. End dates and exceptions are
    /// not part of the schedule shape.
    pub fn same_schedule(&self, other: &Recurrence) -> bool {
        self.frequency == other.frequency
            && self.interval == other.interval
            && normalize_days(self.days_of_week.clone()) == normalize_days(other.days_of_week.clone())
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let every = match self.interval {
            1 => "every".to_string(),
            2 => "every other".to_string(),
            n => format!("every {n}"),
        };
        if !self.days_of_week.is_empty() && self.frequency == Frequency::Weekly {
            let days: Vec<&str> = self.days_of_week.iter().map(|d| weekday_name(*d)).collect();
            write!(f, "{every} {}", join_words(&days))?;
        } else if self.interval > 2 {
            write!(f, "{every} {}s", self.frequency.unit())?;
        } else {
            write!(f, "{every} {}", self.frequency.unit())?;
        }
        if let Some(until) = self.until {
            write!(f, " until {}", until.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

/// Sort Monday-first and drop duplicates.
pub fn normalize_days(mut days: Vec<Weekday>) -> Vec<Weekday> {
    days.sort_by_key(|d| d.num_days_from_monday());
    days.dedup();
    days
}

pub fn weekday_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Parse a full or abbreviated English day name ("wed", "Thursday").
pub fn weekday_from_name(name: &str) -> Option<Weekday> {
    match name.trim().to_lowercase().as_str() {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tues" | "tue" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thurs" | "thur" | "thu" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" | "sat" => Some(Weekday::Sat),
        "sunday" | "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parse a full or abbreviated English month name into 1–12.
pub fn month_from_name(name: &str) -> Option<u32> {
    let month = match name.trim().trim_end_matches('.').to_lowercase().as_str() {
        "january" | "jan" => 1,
        "february" | "feb" => 2,
        "march" | "mar" => 3,
        "april" | "apr" => 4,
        "may" => 5,
        "june" | "jun" => 6,
        "july" | "jul" => 7,
        "august" | "aug" => 8,
        "september" | "sept" | "sep" => 9,
        "october" | "oct" => 10,
        "november" | "nov" => 11,
        "december" | "dec" => 12,
        _ => return None,
    };
    Some(month)
}

/// "a", "a and b", "a, b and c".
pub fn join_words(words: &[&str]) -> String {
    match words {
        [] => String::new(),
        [one] => one.to_string(),
        [init @ .., last] => format!("{} and {}", init.join(", "), last),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_schedule_ignores_day_order_and_end_date() {
        let a = Recurrence::weekly_on(vec![Weekday::Thu, Weekday::Mon]);
        let mut b = Recurrence::weekly_on(vec![Weekday::Mon, Weekday::Thu]);
        b.until = NaiveDate::from_ymd_opt(2027, 1, 1);
        assert!(a.same_schedule(&b));
    }

    #[test]
    fn same_schedule_detects_different_day() {
        let a = Recurrence::weekly_on(vec![Weekday::Wed]);
        let b = Recurrence::weekly_on(vec![Weekday::Tue]);
        assert!(!a.same_schedule(&b));
    }

    #[test]
    fn display_reads_naturally() {
        assert_eq!(
            Recurrence::weekly_on(vec![Weekday::Wed]).to_string(),
            "every Wednesday"
        );
        assert_eq!(
            Recurrence::weekly_on(vec![Weekday::Mon, Weekday::Thu])
                .with_interval(2)
                .to_string(),
            "every other Monday and Thursday"
        );
        assert_eq!(Recurrence::new(Frequency::Daily).to_string(), "every day");
        assert_eq!(
            Recurrence::new(Frequency::Weekly).with_interval(3).to_string(),
            "every 3 weeks"
        );
    }

    #[test]
    fn frequency_and_priority_parse() {
        assert_eq!("Weekly".parse::<Frequency>().unwrap(), Frequency::Weekly);
        assert_eq!("annually".parse::<Frequency>().unwrap(), Frequency::Yearly);
        assert_eq!("urgent".parse::<Priority>().unwrap(), Priority::High);
        assert!("sometimes".parse::<Frequency>().is_err());
    }

    #[test]
    fn day_and_month_names_parse() {
        assert_eq!(weekday_from_name("Wed"), Some(Weekday::Wed));
        assert_eq!(weekday_from_name("thurs"), Some(Weekday::Thu));
        assert_eq!(weekday_from_name("Dana"), None);
        assert_eq!(month_from_name("Sept."), Some(9));
        assert_eq!(month_from_name("Janet"), None);
    }

    #[test]
    fn join_words_uses_oxford_free_list() {
        assert_eq!(join_words(&["Dana"]), "Dana");
        assert_eq!(join_words(&["Dana", "Ron"]), "Dana and Ron");
        assert_eq!(join_words(&["A", "B", "C"]), "A, B and C");
    }

    #[test]
    fn empty_bag_is_empty() {
        assert!(EntityBag::default().is_empty());
        let bag = EntityBag {
            title: Some("Dentist".into()),
            ..Default::default()
        };
        assert!(!bag.is_empty());
    }
}
