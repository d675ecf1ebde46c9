//! Deterministic entity extractor.
//!
//! Plain regex matching over English phrasing, no LLM. It is less fluent
//! than the model but never hallucinates, so fusion prefers it for
//! durations and the recurrence resolver trusts its day names.
//!
//! Dates are resolved against the sender's local date at receipt.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc, Weekday};
use regex::{Captures, Regex};
use tracing::debug;

use crate::entities::{Priority, month_from_name, weekday_from_name};
use crate::extract::types::{ExtractionResult, FieldConfidence};
use crate::intent::Intent;

const DAYS: &str = "monday|tuesday|wednesday|thursday|friday|saturday|sunday";
/// Abbreviations collide with words ("sat", "wed"), so they only count
/// after a lead-in.
const SHORT_DAYS: &str = "mon|tues|tue|wed|thurs|thur|thu|fri|sat|sun";
const MONTHS: &str = "january|february|march|april|may|june|july|august|september|\
                      october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|\
                      oct|nov|dec";

const DATE_CONFIDENCE: f32 = 0.9;
const CLOCK_TIME_CONFIDENCE: f32 = 0.9;
const BARE_HOUR_CONFIDENCE: f32 = 0.7;
const PARTICIPANT_CONFIDENCE: f32 = 0.7;
const DURATION_CONFIDENCE: f32 = 0.9;
const LOCATION_CONFIDENCE: f32 = 0.5;
const TITLE_CONFIDENCE: f32 = 0.5;

/// Regex-driven extractor for dates, times, people, durations, places,
/// priority and a best-effort title.
pub struct RuleExtractor {
    relative_day: Regex,
    in_days: Regex,
    iso_date: Regex,
    numeric_date: Regex,
    day_month: Regex,
    month_day: Regex,
    next_weekday: Regex,
    weekday: Regex,
    short_weekday: Regex,
    clock_time: Regex,
    meridiem_time: Regex,
    named_time: Regex,
    bare_hour: Regex,
    companion: Regex,
    duration_numeric: Regex,
    duration_words: Regex,
    location: Regex,
    high_priority: Regex,
    low_priority: Regex,
    command_prefix: Regex,
    title_stop: Regex,
}

impl RuleExtractor {
    pub fn new() -> Self {
        Self {
            relative_day: Regex::new(r"(?i)\b(day after tomorrow|tomorrow|today|tonight)\b")
                .unwrap(),
            in_days: Regex::new(r"(?i)\bin\s+(\d{1,3})\s+days?\b").unwrap(),
            iso_date: Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap(),
            numeric_date: Regex::new(r"\b(\d{1,2})([/.])(\d{1,2})(?:[/.](\d{2,4}))?\b").unwrap(),
            day_month: Regex::new(&format!(
                r"(?i)\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({MONTHS})\b"
            ))
            .unwrap(),
            month_day: Regex::new(&format!(
                r"(?i)\b({MONTHS})\.?\s+(\d{{1,2}})(?:st|nd|rd|th)?\b"
            ))
            .unwrap(),
            next_weekday: Regex::new(&format!(r"(?i)\bnext\s+({DAYS}|{SHORT_DAYS})\b")).unwrap(),
            weekday: Regex::new(&format!(r"(?i)\b(?:on\s+)?({DAYS})s?\b")).unwrap(),
            short_weekday: Regex::new(&format!(r"(?i)\b(on\s+|this\s+|every\s+)({SHORT_DAYS})\b"))
                .unwrap(),
            clock_time: Regex::new(r"(?i)\b(\d{1,2}):(\d{2})\s*(a\.m\.|p\.m\.|am\b|pm\b)?")
                .unwrap(),
            meridiem_time: Regex::new(r"(?i)\b(\d{1,2})\s*(a\.m\.|p\.m\.|am\b|pm\b)").unwrap(),
            named_time: Regex::new(r"(?i)\b(noon|midday|midnight)\b").unwrap(),
            bare_hour: Regex::new(r"(?i)\bat\s+(\d{1,2})\b").unwrap(),
            companion: Regex::new(r"(?i)\bwith\s+").unwrap(),
            duration_numeric: Regex::new(
                r"(?i)\bfor\s+(\d+(?:\.\d+)?)\s*(hours?|hrs?|h|minutes?|mins?|m)\b",
            )
            .unwrap(),
            duration_words: Regex::new(
                r"(?i)\bfor\s+(an?\s+hour\s+and\s+a\s+half|half\s+an?\s+hour|an?\s+hour)\b",
            )
            .unwrap(),
            location: Regex::new(r"\b(?i:at|in)\s+([A-Z][\w'&-]*(?:\s+[A-Z][\w'&-]*)*)").unwrap(),
            high_priority: Regex::new(r"(?i)\b(urgent|asap|important|high priority)\b").unwrap(),
            low_priority: Regex::new(r"(?i)\b(low priority|whenever)\b").unwrap(),
            command_prefix: Regex::new(
                r"(?i)^\s*(?:please\s+)?(?:remind me to|remind me|schedule|add|create|set up|set|book|put|plan)\s+(?:an?\s+|the\s+)?",
            )
            .unwrap(),
            title_stop: Regex::new(&format!(
                r"(?i)\b(?:today|tonight|tomorrow|day after|on|at|in|next|this|with|every|each|for|from|by|daily|weekly|monthly|yearly|annually|{DAYS})\b|\d"
            ))
            .unwrap(),
        }
    }

    /// Extract everything the patterns can find.
    ///
    /// `intent` is a hint: listing intents carry no title. `reference` is the
    /// receipt time; relative dates resolve against its local date.
    pub fn extract(
        &self,
        text: &str,
        intent: Option<Intent>,
        offset: FixedOffset,
        reference: DateTime<Utc>,
    ) -> ExtractionResult {
        let today = reference.with_timezone(&offset).date_naive();
        let mut result = ExtractionResult::default();
        let mut confidence = FieldConfidence::default();

        if let Some((date, date_text)) = self.extract_date(text, today) {
            result.date = Some(date);
            result.date_text = Some(date_text);
            confidence.date = DATE_CONFIDENCE;
        }

        if let Some((time, time_confidence)) = self.extract_time(text) {
            result.time = Some(time);
            confidence.time = time_confidence;
        }

        result.participants = self.extract_participants(text);
        if !result.participants.is_empty() {
            confidence.participants = PARTICIPANT_CONFIDENCE;
        }

        if let Some(minutes) = self.extract_duration(text) {
            result.duration_minutes = Some(minutes);
            confidence.duration = DURATION_CONFIDENCE;
        }

        if let Some(location) = self.extract_location(text) {
            result.location = Some(location);
            confidence.location = LOCATION_CONFIDENCE;
        }

        result.priority = self.extract_priority(text);

        if intent != Some(Intent::ListEvents)
            && let Some(title) = self.extract_title(text)
        {
            result.title = Some(title);
            confidence.title = TITLE_CONFIDENCE;
        }

        result.confidence = confidence;
        debug!(
            date = ?result.date,
            time = ?result.time,
            participants = result.participants.len(),
            duration = ?result.duration_minutes,
            "Rule extraction complete"
        );
        result
    }

    // ── Dates ───────────────────────────────────────────────────────

    fn extract_date(&self, text: &str, today: NaiveDate) -> Option<(NaiveDate, String)> {
        if let Some(c) = self.relative_day.captures(text) {
            let days = match c[1].to_lowercase().as_str() {
                "day after tomorrow" => 2,
                "tomorrow" => 1,
                _ => 0,
            };
            return Some((today + Duration::days(days), c[0].to_string()));
        }

        if let Some(c) = self.in_days.captures(text)
            && let Ok(days) = c[1].parse::<i64>()
        {
            return Some((today + Duration::days(days), c[0].to_string()));
        }

        if let Some(c) = self.iso_date.captures(text)
            && let Some(date) = ymd(&c[1], &c[2], &c[3])
        {
            return Some((date, c[0].to_string()));
        }

        for c in self.numeric_date.captures_iter(text) {
            if let Some(date) = self.numeric_date_from(&c, text, today) {
                return Some((date, c[0].to_string()));
            }
        }

        if let Some(c) = self.day_month.captures(text)
            && let Some(date) = month_name_date(&c[2], &c[1], today)
        {
            return Some((date, c[0].to_string()));
        }

        if let Some(c) = self.month_day.captures(text)
            && let Some(date) = month_name_date(&c[1], &c[2], today)
        {
            return Some((date, c[0].to_string()));
        }

        if let Some(c) = self.next_weekday.captures(text)
            && let Some(day) = weekday_from_name(&c[1])
        {
            return Some((next_occurrence(today, day, false), c[0].to_string()));
        }

        if let Some(c) = self.weekday.captures(text)
            && let Some(day) = weekday_from_name(&c[1])
        {
            return Some((next_occurrence(today, day, true), c[0].trim().to_string()));
        }

        if let Some(c) = self.short_weekday.captures(text)
            && let Some(day) = weekday_from_name(&c[2])
        {
            // "every" belongs to the recurrence, not the date phrase.
            let phrase = if c[1].trim().eq_ignore_ascii_case("every") { &c[2] } else { &c[0] };
            return Some((next_occurrence(today, day, true), phrase.to_string()));
        }

        None
    }

    /// Day-first `DD/MM[/YYYY]` or `DD.MM[.YYYY]`. A dotted match followed
    /// by a unit ("1.5 hours") is a number, not a date.
    fn numeric_date_from(&self, c: &Captures<'_>, text: &str, today: NaiveDate) -> Option<NaiveDate> {
        let whole = c.get(0)?;
        if &c[2] == "." && c.get(4).is_none() {
            let after = text[whole.end()..].trim_start().to_lowercase();
            if after.starts_with('h') || after.starts_with("min") {
                return None;
            }
        }

        let day: u32 = c[1].parse().ok()?;
        let month: u32 = c[3].parse().ok()?;
        match c.get(4) {
            Some(year) => {
                let mut year: i32 = year.as_str().parse().ok()?;
                if year < 100 {
                    year += 2000;
                }
                NaiveDate::from_ymd_opt(year, month, day)
            }
            None => upcoming(today, month, day),
        }
    }

    // ── Times ───────────────────────────────────────────────────────

    fn extract_time(&self, text: &str) -> Option<(NaiveTime, f32)> {
        if let Some(c) = self.clock_time.captures(text) {
            let hour = with_meridiem(c[1].parse().ok()?, c.get(3).map(|m| m.as_str()))?;
            let minute: u32 = c[2].parse().ok()?;
            return NaiveTime::from_hms_opt(hour, minute, 0).map(|t| (t, CLOCK_TIME_CONFIDENCE));
        }

        if let Some(c) = self.meridiem_time.captures(text) {
            let hour = with_meridiem(c[1].parse().ok()?, Some(&c[2]))?;
            return NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, CLOCK_TIME_CONFIDENCE));
        }

        if let Some(c) = self.named_time.captures(text) {
            let hour = if c[1].eq_ignore_ascii_case("midnight") { 0 } else { 12 };
            return NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, CLOCK_TIME_CONFIDENCE));
        }

        if let Some(c) = self.bare_hour.captures(text) {
            let hour: u32 = c[1].parse().ok()?;
            // Nobody books a 3am meeting by saying "at 3".
            let hour = match hour {
                1..=7 => hour + 12,
                0 | 8..=23 => hour,
                _ => return None,
            };
            return NaiveTime::from_hms_opt(hour, 0, 0).map(|t| (t, BARE_HOUR_CONFIDENCE));
        }

        None
    }

    // ── People ──────────────────────────────────────────────────────

    /// Capitalized names after "with", split on commas, "and" and "&".
    /// Multi-word names ("Dana Cohen") stay together.
    fn extract_participants(&self, text: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        for m in self.companion.find_iter(text) {
            let mut current: Vec<&str> = Vec::new();
            for raw in text[m.end()..].split_whitespace() {
                if raw == "&" || raw.eq_ignore_ascii_case("and") {
                    flush_name(&mut current, &mut names);
                    continue;
                }

                let token = raw
                    .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '-')
                    .trim_end_matches("'s");
                if !is_name_token(token) {
                    break;
                }
                current.push(token);

                if raw.ends_with([',', ';']) {
                    flush_name(&mut current, &mut names);
                } else if raw.ends_with(['.', '!', '?']) {
                    break;
                }
            }
            flush_name(&mut current, &mut names);
        }

        dedupe_case_insensitive(names)
    }

    // ── Duration ────────────────────────────────────────────────────

    fn extract_duration(&self, text: &str) -> Option<u32> {
        if let Some(c) = self.duration_words.captures(text) {
            let phrase = c[1].to_lowercase();
            return Some(if phrase.contains("half an") || phrase.starts_with("half") {
                30
            } else if phrase.contains("and a half") {
                90
            } else {
                60
            });
        }

        let c = self.duration_numeric.captures(text)?;
        let amount: f64 = c[1].parse().ok()?;
        let minutes = if c[2].to_lowercase().starts_with('h') {
            amount * 60.0
        } else {
            amount
        };
        let minutes = minutes.round();
        (minutes >= 1.0 && minutes <= u32::MAX as f64).then_some(minutes as u32)
    }

    // ── Location ────────────────────────────────────────────────────

    fn extract_location(&self, text: &str) -> Option<String> {
        self.location.captures_iter(text).find_map(|c| {
            let phrase = c[1].trim();
            let first = phrase.split_whitespace().next()?;
            if weekday_from_name(first).is_some() || month_from_name(first).is_some() {
                return None;
            }
            Some(phrase.to_string())
        })
    }

    // ── Priority ────────────────────────────────────────────────────

    fn extract_priority(&self, text: &str) -> Option<Priority> {
        if self.high_priority.is_match(text) {
            Some(Priority::High)
        } else if self.low_priority.is_match(text) {
            Some(Priority::Low)
        } else {
            None
        }
    }

    // ── Title ───────────────────────────────────────────────────────

    /// Leading words after the command prefix, up to the first date, time
    /// or people keyword.
    fn extract_title(&self, text: &str) -> Option<String> {
        let body = self.command_prefix.replace(text.trim(), "");
        let end = self
            .title_stop
            .find(&body)
            .map(|m| m.start())
            .unwrap_or(body.len());
        let title = body[..end]
            .trim()
            .trim_end_matches(|c: char| !c.is_alphanumeric())
            .trim();
        if title.is_empty() {
            return None;
        }

        let mut chars = title.chars();
        let first = chars.next()?;
        Some(first.to_uppercase().chain(chars).collect())
    }
}

impl Default for RuleExtractor {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

/// This year's `month/day`, or next year's if it already passed.
fn upcoming(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
    if date < today {
        NaiveDate::from_ymd_opt(today.year() + 1, month, day)
    } else {
        Some(date)
    }
}

fn month_name_date(month: &str, day: &str, today: NaiveDate) -> Option<NaiveDate> {
    upcoming(today, month_from_name(month)?, day.parse().ok()?)
}

/// Next date falling on `day`. `include_today` makes today itself count.
fn next_occurrence(today: NaiveDate, day: Weekday, include_today: bool) -> NaiveDate {
    let from = today.weekday().num_days_from_monday() as i64;
    let to = day.num_days_from_monday() as i64;
    let mut ahead = (to - from).rem_euclid(7);
    if ahead == 0 && !include_today {
        ahead = 7;
    }
    today + Duration::days(ahead)
}

fn with_meridiem(hour: u32, meridiem: Option<&str>) -> Option<u32> {
    let hour = match meridiem.map(|m| m.to_lowercase().starts_with('p')) {
        Some(true) if hour < 12 => hour + 12,
        Some(false) if hour == 12 => 0,
        _ => hour,
    };
    (hour < 24).then_some(hour)
}

fn is_name_token(token: &str) -> bool {
    token.chars().next().is_some_and(char::is_uppercase)
        && token != "I"
        && weekday_from_name(token).is_none()
        && month_from_name(token).is_none()
}

fn flush_name(current: &mut Vec<&str>, names: &mut Vec<String>) {
    if !current.is_empty() {
        names.push(current.join(" "));
        current.clear();
    }
}

/// Keep the first spelling of each name.
pub(crate) fn dedupe_case_insensitive(names: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .filter(|name| seen.insert(name.to_lowercase()))
        .collect()
}
