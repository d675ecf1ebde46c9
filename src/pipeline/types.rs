//! Shared types for the interpretation pipeline.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entities::EntityBag;
use crate::intent::Intent;

// ── Inbound message ─────────────────────────────────────────────────

/// A chat message handed to the pipeline by the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Sender identifier (phone number, chat handle).
    pub sender: String,
    /// Message body.
    pub text: String,
    /// When the message was received.
    pub received_at: DateTime<Utc>,
    /// Timezone label: `UTC`, `Z`, or an offset like `+03:00`.
    pub timezone: String,
}

impl InboundMessage {
    pub fn new(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            received_at: Utc::now(),
            timezone: "UTC".to_string(),
        }
    }

    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    pub fn received_at(mut self, at: DateTime<Utc>) -> Self {
        self.received_at = at;
        self
    }
}

/// Parse a timezone label into a fixed offset.
///
/// Accepts `UTC`, `GMT`, `Z`, `+HH:MM`, `-HH:MM`, `+HHMM` and `+HH`.
pub fn parse_utc_offset(label: &str) -> Option<FixedOffset> {
    let label = label.trim();
    if label.eq_ignore_ascii_case("utc") || label.eq_ignore_ascii_case("gmt") || label == "Z" {
        return FixedOffset::east_opt(0);
    }

    let label = label
        .strip_prefix("UTC")
        .or_else(|| label.strip_prefix("GMT"))
        .unwrap_or(label);
    let (sign, rest) = match label.chars().next()? {
        '+' => (1, &label[1..]),
        '-' => (-1, &label[1..]),
        _ => return None,
    };

    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

// ── Pipeline result ─────────────────────────────────────────────────

/// The sole artifact handed back to the caller after one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: Uuid,
    /// True when no errors were recorded. A clarification request still
    /// counts as success.
    pub success: bool,
    pub intent: Option<Intent>,
    pub confidence: f32,
    pub entities: EntityBag,
    pub needs_clarification: bool,
    pub clarification_question: Option<String>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// The sender's local date at receipt, for callers rendering dates.
    pub local_date: NaiveDate,
}

impl PipelineResult {
    /// Wire label of the resolved intent, if any.
    pub fn intent_label(&self) -> Option<&'static str> {
        self.intent.map(|i| i.as_str())
    }
}
