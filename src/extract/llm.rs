//! Probabilistic entity extractor backed by a language model.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::entities::{Frequency, Priority, Recurrence, normalize_days, weekday_from_name};
use crate::error::ExtractionError;
use crate::extract::types::{ExtractionResult, FieldConfidence, non_blank};
use crate::llm::extract_json_object;
use crate::llm::provider::{ChatMessage, CompletionRequest, FinishReason, LlmProvider};
use crate::pipeline::context::InterpretationContext;

/// Max tokens for extraction. Room for every field plus recurrence.
const EXTRACT_MAX_TOKENS: u32 = 768;

/// Temperature for extraction.
const EXTRACT_TEMPERATURE: f32 = 0.1;

/// Confidence assumed for a present field the model did not score.
const DEFAULT_FIELD_CONFIDENCE: f32 = 0.8;

/// Asks a language model for every entity field in one JSON object.
pub struct LlmExtractor {
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            llm,
            temperature: EXTRACT_TEMPERATURE,
            max_tokens: EXTRACT_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// Extract entities for the message in `ctx`.
    pub async fn extract(&self, ctx: &InterpretationContext) -> Result<ExtractionResult, ExtractionError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_extract_system_prompt()),
            ChatMessage::user(build_extract_user_prompt(ctx)),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = self.llm.complete(request).await?;
        let cost = response.cost(self.llm.cost_per_token());
        debug!(
            run_id = %ctx.run_id(),
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = %cost,
            "Extractor call complete"
        );
        if response.finish_reason == FinishReason::Length {
            warn!(
                run_id = %ctx.run_id(),
                max_tokens = self.max_tokens,
                "Extractor response hit the token limit, output may be cut short"
            );
        }

        parse_extraction(&response.content).inspect_err(|e| {
            warn!(
                run_id = %ctx.run_id(),
                raw_response = %response.content,
                error = %e,
                "Unusable extractor response"
            );
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_extract_system_prompt() -> String {
    "You extract calendar details from a chat message.\n\n\
     Respond with ONLY a JSON object. Omit fields that are not mentioned:\n\
     {\"title\": \"...\", \"date\": \"YYYY-MM-DD\", \"time\": \"HH:MM\", \"date_text\": \"...\", \
     \"location\": \"...\", \"participants\": [\"...\"], \"duration_minutes\": 60, \
     \"priority\": \"low|normal|high\", \"notes\": \"...\", \
     \"recurrence\": {\"frequency\": \"daily|weekly|monthly|yearly\", \"interval\": 1, \
     \"days_of_week\": [\"monday\"], \"until\": \"YYYY-MM-DD\", \"exceptions\": [\"YYYY-MM-DD\"]}, \
     \"confidence\": {\"title\": 0.0, \"date\": 0.0, \"time\": 0.0, \"location\": 0.0, \
     \"participants\": 0.0, \"duration\": 0.0}}\n\n\
     Rules:\n\
     - Resolve relative dates (\"tomorrow\", \"next friday\") against the local date given\n\
     - date_text is the date phrase exactly as the user wrote it\n\
     - time is 24-hour local time\n\
     - participants are people the user will meet, never the user themself\n\
     - title is a short label (max 6 words), without the date or time\n\
     - confidence is your certainty per field between 0.0 and 1.0"
        .to_string()
}

fn build_extract_user_prompt(ctx: &InterpretationContext) -> String {
    let local = ctx.received_at().with_timezone(&ctx.offset());
    let mut prompt = String::with_capacity(256);
    prompt.push_str(&format!(
        "Local date: {} ({})\n",
        local.format("%A %Y-%m-%d %H:%M"),
        ctx.input().timezone
    ));
    if let Some(intent) = ctx.intent() {
        prompt.push_str(&format!("Intent: {intent}\n"));
    }

    let content_preview: String = ctx.text().chars().take(1000).collect();
    prompt.push_str(&format!("\nMessage:\n{}", content_preview));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    time: Option<String>,
    #[serde(default)]
    date_text: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    participants: Option<Vec<String>>,
    #[serde(default)]
    duration_minutes: Option<f64>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    notes: Option<String>,
    #[serde(default)]
    recurrence: Option<RecurrenceResponse>,
    #[serde(default)]
    confidence: Option<ConfidenceResponse>,
}

#[derive(Debug, Deserialize)]
struct RecurrenceResponse {
    frequency: String,
    #[serde(default)]
    interval: Option<f64>,
    #[serde(default)]
    days_of_week: Option<Vec<String>>,
    #[serde(default)]
    until: Option<String>,
    #[serde(default)]
    exceptions: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfidenceResponse {
    title: Option<f32>,
    date: Option<f32>,
    time: Option<f32>,
    location: Option<f32>,
    participants: Option<f32>,
    duration: Option<f32>,
}

/// Parse the model's JSON into an extraction result.
///
/// Malformed individual values (a date that doesn't parse, an unknown
/// priority) are dropped rather than failing the whole extraction.
pub fn parse_extraction(raw: &str) -> Result<ExtractionResult, ExtractionError> {
    let json_str = extract_json_object(raw);
    let response: ExtractResponse = serde_json::from_str(json_str)
        .map_err(|e| ExtractionError::Parse(format!("JSON parse error: {e}")))?;

    let participants: Vec<String> = response
        .participants
        .unwrap_or_default()
        .iter()
        .filter_map(|p| non_blank(Some(p.as_str())))
        .collect();

    let result = ExtractionResult {
        title: non_blank(response.title.as_deref()),
        date: response.date.as_deref().and_then(parse_date),
        time: response.time.as_deref().and_then(parse_time),
        date_text: non_blank(response.date_text.as_deref()),
        location: non_blank(response.location.as_deref()),
        duration_minutes: response.duration_minutes.and_then(whole_minutes),
        priority: response
            .priority
            .as_deref()
            .and_then(|p| p.parse::<Priority>().ok()),
        notes: non_blank(response.notes.as_deref()),
        recurrence: response.recurrence.and_then(parse_recurrence),
        participants,
        confidence: FieldConfidence::default(),
    };

    let scores = response.confidence.unwrap_or_default();
    let score = |present: bool, reported: Option<f32>| {
        if present {
            reported.unwrap_or(DEFAULT_FIELD_CONFIDENCE).clamp(0.0, 1.0)
        } else {
            0.0
        }
    };
    let confidence = FieldConfidence {
        title: score(result.title.is_some(), scores.title),
        date: score(result.date.is_some(), scores.date),
        time: score(result.time.is_some(), scores.time),
        location: score(result.location.is_some(), scores.location),
        participants: score(!result.participants.is_empty(), scores.participants),
        duration: score(result.duration_minutes.is_some(), scores.duration),
    };

    Ok(ExtractionResult { confidence, ..result })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

/// Round a model-reported duration to whole minutes; non-positive is dropped.
fn whole_minutes(value: f64) -> Option<u32> {
    let minutes = value.round();
    (minutes.is_finite() && minutes >= 1.0 && minutes <= u32::MAX as f64).then_some(minutes as u32)
}

fn parse_recurrence(raw: RecurrenceResponse) -> Option<Recurrence> {
    let frequency = raw.frequency.parse::<Frequency>().ok()?;
    let days: Vec<Weekday> = raw
        .days_of_week
        .unwrap_or_default()
        .iter()
        .filter_map(|d| weekday_from_name(d))
        .collect();

    let interval = raw
        .interval
        .filter(|i| i.is_finite() && *i >= 1.0)
        .map_or(1, |i| i.round() as u32);
    let mut recurrence = Recurrence::new(frequency).with_interval(interval);
    recurrence.days_of_week = normalize_days(days);
    recurrence.until = raw.until.as_deref().and_then(parse_date);
    recurrence.exceptions = raw
        .exceptions
        .unwrap_or_default()
        .iter()
        .filter_map(|d| parse_date(d))
        .collect();
    Some(recurrence)
}
