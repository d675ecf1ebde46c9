//! Entity validation, the last look before the result goes back to the user.

use async_trait::async_trait;
use tracing::debug;

use crate::entities::EntityBag;
use crate::error::PhaseError;
use crate::intent::Intent;
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::phase::{Phase, PhaseResult};

pub const PHASE_NAME: &str = "entity_validation";
pub const PHASE_ORDER: u32 = 60;

const MISSING_FIELD_PENALTY: f32 = 0.1;
const COMPLETE_BONUS: f32 = 0.05;

pub const UNKNOWN_INTENT_QUESTION: &str = "I'm not sure what you'd like me to do. \
     I can create events, set reminders, add tasks, or show your upcoming events.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Title,
    Timing,
}

impl Field {
    fn label(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Timing => "date_or_time",
        }
    }
}

/// Fields an intent cannot do without, in the order we ask for them.
fn missing_fields(intent: Intent, entities: &EntityBag) -> Vec<Field> {
    let mut missing = Vec::new();
    match intent {
        Intent::CreateEvent => {
            if entities.title.is_none() {
                missing.push(Field::Title);
            }
            if entities.date.is_none() {
                missing.push(Field::Timing);
            }
        }
        Intent::CreateReminder | Intent::CreateTask => {
            if entities.title.is_none() {
                missing.push(Field::Title);
            }
            if entities.date.is_none() && entities.time.is_none() {
                missing.push(Field::Timing);
            }
        }
        _ => {}
    }
    missing
}

fn question_for(intent: Intent, field: Field) -> &'static str {
    match (intent, field) {
        (Intent::CreateReminder, Field::Title) => "What should I remind you about?",
        (Intent::CreateReminder, Field::Timing) => "When should I remind you?",
        (Intent::CreateTask, Field::Title) => "What's the task?",
        (Intent::CreateTask, Field::Timing) => "When is it due?",
        (_, Field::Title) => "What should I call the event?",
        (_, Field::Timing) => "What day is the event on?",
    }
}

/// Checks required fields per intent and asks for the first one missing.
#[derive(Debug, Default)]
pub struct EntityValidationPhase;

impl EntityValidationPhase {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Phase for EntityValidationPhase {
    fn name(&self) -> &str {
        PHASE_NAME
    }

    fn order(&self) -> u32 {
        PHASE_ORDER
    }

    fn should_run(&self, ctx: &InterpretationContext) -> bool {
        ctx.intent().is_some()
    }

    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError> {
        let Some(intent) = ctx.intent() else {
            return Ok(PhaseResult::success(serde_json::Value::Null));
        };

        if intent == Intent::Unknown {
            ctx.request_clarification(UNKNOWN_INTENT_QUESTION);
            return Ok(PhaseResult::success(serde_json::json!({ "missing": [] })));
        }

        let mut warnings = Vec::new();
        if let Some(date) = ctx.entities.date
            && date < ctx.local_date()
        {
            warnings.push(format!("{} is in the past", date.format("%Y-%m-%d")));
        }

        let missing = missing_fields(intent, &ctx.entities);
        let confidence = if missing.is_empty() {
            ctx.entities.confidence + COMPLETE_BONUS
        } else {
            ctx.entities.confidence - MISSING_FIELD_PENALTY * missing.len() as f32
        };
        ctx.entities.confidence = confidence.clamp(0.0, 1.0);

        if let Some(first) = missing.first() {
            ctx.request_clarification(question_for(intent, *first));
        }

        let labels: Vec<&str> = missing.iter().map(Field::label).collect();
        debug!(
            run_id = %ctx.run_id(),
            intent = %intent,
            missing = ?labels,
            entity_confidence = ctx.entities.confidence,
            "Entities validated"
        );

        Ok(PhaseResult::success(serde_json::json!({
            "missing": labels,
            "complete": missing.is_empty(),
        }))
        .with_warnings(warnings))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    use super::*;
    use crate::pipeline::types::InboundMessage;

    fn ctx(intent: Intent) -> InterpretationContext {
        let at = Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap();
        let mut c = InterpretationContext::new(InboundMessage::new("u", "x").received_at(at));
        c.set_intent(intent, 0.9);
        c.entities.confidence = 0.5;
        c
    }

    #[tokio::test]
    async fn complete_event_gets_bonus() {
        let mut c = ctx(Intent::CreateEvent);
        c.entities.title = Some("Sync".into());
        c.entities.date = NaiveDate::from_ymd_opt(2026, 3, 11);
        let result = EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert_eq!(result.payload["complete"], true);
        assert!(!c.needs_clarification());
        assert!((c.entities.confidence - 0.55).abs() < 1e-5);
    }

    #[tokio::test]
    async fn missing_title_asked_first() {
        let mut c = ctx(Intent::CreateEvent);
        EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert_eq!(
            c.clarification_question(),
            Some("What should I call the event?")
        );
        assert!((c.entities.confidence - 0.3).abs() < 1e-5);
    }

    #[tokio::test]
    async fn reminder_accepts_time_without_date() {
        let mut c = ctx(Intent::CreateReminder);
        c.entities.title = Some("Call mom".into());
        c.entities.time = NaiveTime::from_hms_opt(17, 0, 0);
        EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert!(!c.needs_clarification());
    }

    #[tokio::test]
    async fn reminder_without_timing_asks_when() {
        let mut c = ctx(Intent::CreateReminder);
        c.entities.title = Some("Call mom".into());
        EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert_eq!(c.clarification_question(), Some("When should I remind you?"));
    }

    #[tokio::test]
    async fn unknown_intent_asks_what_to_do() {
        let mut c = ctx(Intent::Unknown);
        EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert_eq!(c.clarification_question(), Some(UNKNOWN_INTENT_QUESTION));
    }

    #[tokio::test]
    async fn past_date_warns() {
        let mut c = ctx(Intent::CreateEvent);
        c.entities.title = Some("Retro".into());
        c.entities.date = NaiveDate::from_ymd_opt(2026, 3, 1);
        let result = EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert_eq!(result.warnings, vec!["2026-03-01 is in the past"]);
    }

    #[tokio::test]
    async fn list_intent_needs_nothing() {
        let mut c = ctx(Intent::ListEvents);
        EntityValidationPhase::new().execute(&mut c).await.unwrap();
        assert!(!c.needs_clarification());
    }
}
