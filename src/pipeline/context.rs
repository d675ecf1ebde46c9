//! The interpretation context threaded through every phase of one run.

use std::collections::HashMap;

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::entities::EntityBag;
use crate::intent::Intent;
use crate::pipeline::phase::PhaseResult;
use crate::pipeline::types::{InboundMessage, PipelineResult, parse_utc_offset};

/// Mutable state for one pipeline run.
///
/// The original message is private and only handed out by shared
/// reference, so phases can read it but never change it. Intent and
/// confidence go through guarded setters: once the run needs clarification
/// or has recorded an error, a plain `set_intent` is refused and only
/// `override_intent` (which states a reason) may change them.
#[derive(Debug)]
pub struct InterpretationContext {
    run_id: Uuid,
    input: InboundMessage,
    offset: FixedOffset,

    intent: Option<Intent>,
    confidence: f32,
    /// Entity bag. Phases write fields they own directly.
    pub entities: EntityBag,
    needs_clarification: bool,
    clarification_question: Option<String>,
    warnings: Vec<String>,
    errors: Vec<String>,

    phase_results: HashMap<String, PhaseResult>,
}

impl InterpretationContext {
    /// Create a context for one inbound message.
    ///
    /// An unparseable timezone falls back to UTC and leaves a warning.
    pub fn new(input: InboundMessage) -> Self {
        let mut warnings = Vec::new();
        let offset = match parse_utc_offset(&input.timezone) {
            Some(offset) => offset,
            None => {
                warnings.push(format!(
                    "unrecognized timezone '{}', interpreting times as UTC",
                    input.timezone
                ));
                Utc.fix()
            }
        };

        Self {
            run_id: Uuid::new_v4(),
            input,
            offset,
            intent: None,
            confidence: 0.0,
            entities: EntityBag::default(),
            needs_clarification: false,
            clarification_question: None,
            warnings,
            errors: Vec::new(),
            phase_results: HashMap::new(),
        }
    }

    // ── Immutable input ─────────────────────────────────────────────

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn input(&self) -> &InboundMessage {
        &self.input
    }

    pub fn text(&self) -> &str {
        &self.input.text
    }

    pub fn sender(&self) -> &str {
        &self.input.sender
    }

    pub fn received_at(&self) -> DateTime<Utc> {
        self.input.received_at
    }

    /// The sender's UTC offset.
    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// The sender's local calendar date when the message arrived.
    pub fn local_date(&self) -> NaiveDate {
        self.input.received_at.with_timezone(&self.offset).date_naive()
    }

    // ── Intent & confidence ─────────────────────────────────────────

    pub fn intent(&self) -> Option<Intent> {
        self.intent
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Whether intent/confidence are frozen by an earlier signal.
    pub fn intent_locked(&self) -> bool {
        self.needs_clarification || !self.errors.is_empty()
    }

    /// Set intent and confidence. Refused (returns false, leaves a warning)
    /// once the run needs clarification or has recorded an error.
    pub fn set_intent(&mut self, intent: Intent, confidence: f32) -> bool {
        if self.intent_locked() {
            warn!(
                run_id = %self.run_id,
                intent = %intent,
                "Refusing to overwrite intent after clarification/error signal"
            );
            self.warnings.push(format!(
                "ignored attempt to change intent to {intent} after an earlier clarification or error"
            ));
            return false;
        }
        self.intent = Some(intent);
        self.confidence = confidence.clamp(0.0, 1.0);
        true
    }

    /// Change intent/confidence regardless of earlier signals. The reason
    /// is kept as a warning so the override is visible on the result.
    pub fn override_intent(&mut self, intent: Intent, confidence: f32, reason: &str) {
        self.warnings.push(format!("intent overridden to {intent}: {reason}"));
        self.intent = Some(intent);
        self.confidence = confidence.clamp(0.0, 1.0);
    }

    // ── Clarification ───────────────────────────────────────────────

    pub fn needs_clarification(&self) -> bool {
        self.needs_clarification
    }

    pub fn clarification_question(&self) -> Option<&str> {
        self.clarification_question.as_deref()
    }

    /// Flag the run as needing user input. The first question asked wins.
    pub fn request_clarification(&mut self, question: impl Into<String>) {
        self.needs_clarification = true;
        if self.clarification_question.is_none() {
            self.clarification_question = Some(question.into());
        }
    }

    // ── Warnings & errors ───────────────────────────────────────────

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub(crate) fn extend_warnings(&mut self, warnings: impl IntoIterator<Item = String>) {
        self.warnings.extend(warnings);
    }

    pub(crate) fn extend_errors(&mut self, errors: impl IntoIterator<Item = String>) {
        self.errors.extend(errors);
    }

    // ── Phase results ───────────────────────────────────────────────

    /// Raw result of a phase that already ran.
    pub fn phase_result(&self, phase: &str) -> Option<&PhaseResult> {
        self.phase_results.get(phase)
    }

    pub(crate) fn record_phase_result(&mut self, phase: &str, result: PhaseResult) {
        self.phase_results.insert(phase.to_string(), result);
    }

    /// Consume the context into the caller-facing result.
    pub fn into_result(self) -> PipelineResult {
        let local_date = self.local_date();
        PipelineResult {
            run_id: self.run_id,
            success: self.errors.is_empty(),
            intent: self.intent,
            confidence: self.confidence,
            entities: self.entities,
            needs_clarification: self.needs_clarification,
            clarification_question: self.clarification_question,
            warnings: self.warnings,
            errors: self.errors,
            local_date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(text: &str) -> InterpretationContext {
        InterpretationContext::new(InboundMessage::new("user-1", text))
    }

    #[test]
    fn set_intent_clamps_confidence() {
        let mut c = ctx("hi");
        assert!(c.set_intent(Intent::CreateEvent, 1.4));
        assert_eq!(c.intent(), Some(Intent::CreateEvent));
        assert_eq!(c.confidence(), 1.0);
    }

    #[test]
    fn set_intent_refused_after_clarification() {
        let mut c = ctx("hi");
        c.set_intent(Intent::CreateEvent, 0.6);
        c.request_clarification("event or reminder?");
        assert!(!c.set_intent(Intent::CreateReminder, 0.9));
        assert_eq!(c.intent(), Some(Intent::CreateEvent));
        assert!((c.confidence() - 0.6).abs() < 1e-6);
        assert_eq!(c.warnings().len(), 1);
    }

    #[test]
    fn set_intent_refused_after_error_but_override_allowed() {
        let mut c = ctx("hi");
        c.add_error("boom");
        assert!(!c.set_intent(Intent::ListEvents, 0.9));
        c.override_intent(Intent::ListEvents, 0.9, "user picked option 4");
        assert_eq!(c.intent(), Some(Intent::ListEvents));
        assert!(c.warnings().iter().any(|w| w.contains("user picked option 4")));
    }

    #[test]
    fn first_clarification_question_wins() {
        let mut c = ctx("hi");
        c.request_clarification("first?");
        c.request_clarification("second?");
        assert_eq!(c.clarification_question(), Some("first?"));
    }

    #[test]
    fn bad_timezone_falls_back_to_utc_with_warning() {
        let c = InterpretationContext::new(
            InboundMessage::new("u", "x").with_timezone("Mars/Olympus"),
        );
        assert_eq!(c.offset().local_minus_utc(), 0);
        assert!(c.warnings()[0].contains("Mars/Olympus"));
    }

    #[test]
    fn local_date_respects_offset() {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 23, 30, 0).unwrap();
        let c = InterpretationContext::new(
            InboundMessage::new("u", "x").with_timezone("+02:00").received_at(at),
        );
        assert_eq!(c.local_date(), NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
    }

    #[test]
    fn into_result_reports_success_from_errors() {
        let mut c = ctx("hi");
        c.request_clarification("which one?");
        let result = c.into_result();
        assert!(result.success);
        assert!(result.needs_clarification);

        let mut c = ctx("hi");
        c.add_error("classifier failed");
        assert!(!c.into_result().success);
    }
}
