//! Turning a pipeline result into the reply text sent back to the user.

use crate::entities::join_words;
use crate::pipeline::types::PipelineResult;

pub const APOLOGY: &str =
    "Sorry, something went wrong while reading your message. Please try again in a moment.";

/// One reply line for `result`.
///
/// Errors win over clarification, clarification over confirmation.
pub fn render_reply(result: &PipelineResult) -> String {
    if !result.success {
        return APOLOGY.to_string();
    }
    if result.needs_clarification {
        return result
            .clarification_question
            .clone()
            .unwrap_or_else(|| "Could you tell me a bit more?".to_string());
    }
    let Some(intent) = result.intent else {
        return APOLOGY.to_string();
    };

    let e = &result.entities;
    let mut reply = format!("Got it, I'll {}", intent.describe());
    if let Some(title) = &e.title {
        reply.push_str(&format!(": \"{title}\""));
    }
    if let Some(date) = e.date {
        if date == result.local_date {
            reply.push_str(" today");
        } else if result.local_date.succ_opt() == Some(date) {
            reply.push_str(" tomorrow");
        } else {
            reply.push_str(&format!(" on {}", date.format("%a %b %-d")));
        }
    }
    if let Some(time) = e.time {
        reply.push_str(&format!(" at {}", time.format("%H:%M")));
    }
    if let Some(location) = &e.location {
        reply.push_str(&format!(" at {location}"));
    }
    if !e.participants.is_empty() {
        let names: Vec<&str> = e.participants.iter().map(String::as_str).collect();
        reply.push_str(&format!(" with {}", join_words(&names)));
    }
    if let Some(recurrence) = &e.recurrence {
        reply.push_str(&format!(", {recurrence}"));
    }
    reply.push('.');
    reply
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Weekday};
    use uuid::Uuid;

    use super::*;
    use crate::entities::{EntityBag, Recurrence};
    use crate::intent::Intent;

    fn result(entities: EntityBag) -> PipelineResult {
        PipelineResult {
            run_id: Uuid::new_v4(),
            success: true,
            intent: Some(Intent::CreateEvent),
            confidence: 0.9,
            entities,
            needs_clarification: false,
            clarification_question: None,
            warnings: Vec::new(),
            errors: Vec::new(),
            local_date: NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(),
        }
    }

    #[test]
    fn confirms_full_event() {
        let r = result(EntityBag {
            title: Some("Planning".into()),
            date: NaiveDate::from_ymd_opt(2026, 3, 11),
            time: NaiveTime::from_hms_opt(15, 0, 0),
            participants: vec!["Dana".into(), "Ron".into()],
            recurrence: Some(Recurrence::weekly_on(vec![Weekday::Wed])),
            ..Default::default()
        });
        assert_eq!(
            render_reply(&r),
            "Got it, I'll create an event: \"Planning\" tomorrow at 15:00 with Dana and Ron, every Wednesday."
        );
    }

    #[test]
    fn far_dates_are_spelled_out() {
        let r = result(EntityBag {
            title: Some("Dentist".into()),
            date: NaiveDate::from_ymd_opt(2026, 3, 20),
            ..Default::default()
        });
        assert_eq!(
            render_reply(&r),
            "Got it, I'll create an event: \"Dentist\" on Fri Mar 20."
        );
    }

    #[test]
    fn clarification_is_verbatim() {
        let mut r = result(EntityBag::default());
        r.needs_clarification = true;
        r.clarification_question = Some("What day is the event on?".into());
        assert_eq!(render_reply(&r), "What day is the event on?");
    }

    #[test]
    fn errors_get_an_apology() {
        let mut r = result(EntityBag::default());
        r.success = false;
        r.errors = vec!["intent_classification: no classifier produced a vote".into()];
        r.needs_clarification = true;
        assert_eq!(render_reply(&r), APOLOGY);
    }
}
