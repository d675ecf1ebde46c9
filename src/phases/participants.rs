//! Participant resolution. The only writer of `entities.participants`.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::error::PhaseError;
use crate::extract::rules::dedupe_case_insensitive;
use crate::intent::Intent;
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::phase::{Phase, PhaseResult};

pub const PHASE_NAME: &str = "participant_resolution";
pub const PHASE_ORDER: u32 = 30;

/// Words that refer to the sender, never to someone they meet.
const PRONOUNS: [&str; 4] = ["me", "myself", "i", "us"];

#[derive(Debug, Clone, Serialize)]
struct Dropped {
    name: String,
    reason: &'static str,
}

/// Turns the provisional participant union into the final list.
pub struct ParticipantResolutionPhase {
    companion: Regex,
}

impl ParticipantResolutionPhase {
    pub fn new() -> Self {
        Self {
            companion: Regex::new(r"(?i)\bwith\b").unwrap(),
        }
    }
}

impl Default for ParticipantResolutionPhase {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether `name` occurs in `text` as whole words.
fn mentioned(text: &str, name: &str) -> bool {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name)))
        .map(|re| re.is_match(text))
        .unwrap_or(false)
}

#[async_trait]
impl Phase for ParticipantResolutionPhase {
    fn name(&self) -> &str {
        PHASE_NAME
    }

    fn order(&self) -> u32 {
        PHASE_ORDER
    }

    fn should_run(&self, ctx: &InterpretationContext) -> bool {
        ctx.intent().is_some_and(|i| i.wants_entities()) && !ctx.entities.is_empty()
    }

    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError> {
        let provisional = std::mem::take(&mut ctx.entities.provisional_participants);
        let mut kept = Vec::new();
        let mut dropped = Vec::new();

        for name in provisional {
            let name = name.trim().to_string();
            if name.is_empty() {
                continue;
            }
            if PRONOUNS.contains(&name.to_lowercase().as_str()) {
                dropped.push(Dropped {
                    name,
                    reason: "refers to the sender",
                });
            } else if !mentioned(ctx.text(), &name) {
                dropped.push(Dropped {
                    name,
                    reason: "not mentioned in the message",
                });
            } else {
                kept.push(name);
            }
        }

        let solo_intent = matches!(
            ctx.intent(),
            Some(Intent::CreateReminder | Intent::CreateTask)
        );
        if solo_intent && !kept.is_empty() && !self.companion.is_match(ctx.text()) {
            dropped.extend(kept.drain(..).map(|name| Dropped {
                name,
                reason: "reminders and tasks have no participants without \"with\"",
            }));
        }

        let kept = dedupe_case_insensitive(kept);
        debug!(
            run_id = %ctx.run_id(),
            kept = ?kept,
            dropped = dropped.len(),
            "Participants resolved"
        );

        ctx.entities.participants = kept.clone();
        Ok(PhaseResult::success(serde_json::json!({
            "participants": kept,
            "dropped": dropped,
        })))
    }
}
