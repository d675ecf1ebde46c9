//! Output shape shared by both extractors.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::entities::{Priority, Recurrence};

/// How sure an extractor is about each field. Zero for absent fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldConfidence {
    pub title: f32,
    pub date: f32,
    pub time: f32,
    pub location: f32,
    pub participants: f32,
    pub duration: f32,
}

/// What one extractor found. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub title: Option<String>,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub date_text: Option<String>,
    pub location: Option<String>,
    pub participants: Vec<String>,
    pub duration_minutes: Option<u32>,
    pub recurrence: Option<Recurrence>,
    pub priority: Option<Priority>,
    pub notes: Option<String>,
    pub confidence: FieldConfidence,
}

impl ExtractionResult {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.location.is_none()
            && self.participants.is_empty()
            && self.duration_minutes.is_none()
            && self.recurrence.is_none()
    }
}

/// `Some(trimmed)` for non-blank text.
pub(crate) fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
