//! Recurrence resolution phase.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::entities::Recurrence;
use crate::error::PhaseError;
use crate::intent::Intent;
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::phase::{Phase, PhaseResult};
use crate::recurrence::matcher::{RecurrenceMatch, RecurrenceMatcher};

pub const PHASE_NAME: &str = "recurrence_resolution";
pub const PHASE_ORDER: u32 = 40;

/// How the final recurrence was chosen. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    KeptProbabilistic,
    OverriddenByDeterministic,
    AdoptedDeterministic,
    None,
}

/// Arbitrate between the model's recurrence guess and the matcher.
///
/// Day names the user actually typed beat the model. When they disagree
/// the matched schedule replaces the guess, but an end date or exception
/// dates the model found are kept since the matcher never produces them.
pub fn resolve(
    probabilistic: Option<Recurrence>,
    deterministic: Option<&RecurrenceMatch>,
) -> (Option<Recurrence>, Decision) {
    match (probabilistic, deterministic) {
        (None, Some(det)) => (Some(det.recurrence.clone()), Decision::AdoptedDeterministic),
        (None, None) => (None, Decision::None),
        (Some(prob), Some(det)) if det.pattern.names_days() => {
            if prob.same_schedule(&det.recurrence) {
                (Some(prob), Decision::KeptProbabilistic)
            } else {
                let mut merged = det.recurrence.clone();
                merged.until = prob.until;
                merged.exceptions = prob.exceptions;
                (Some(merged), Decision::OverriddenByDeterministic)
            }
        }
        (Some(prob), _) => (Some(prob), Decision::KeptProbabilistic),
    }
}

/// Finalizes `entities.recurrence`.
pub struct RecurrenceResolutionPhase {
    matcher: RecurrenceMatcher,
}

impl RecurrenceResolutionPhase {
    pub fn new(matcher: RecurrenceMatcher) -> Self {
        Self { matcher }
    }
}

impl Default for RecurrenceResolutionPhase {
    fn default() -> Self {
        Self::new(RecurrenceMatcher::new())
    }
}

#[async_trait]
impl Phase for RecurrenceResolutionPhase {
    fn name(&self) -> &str {
        PHASE_NAME
    }

    fn order(&self) -> u32 {
        PHASE_ORDER
    }

    fn should_run(&self, ctx: &InterpretationContext) -> bool {
        ctx.intent()
            .is_some_and(|i| i.is_create() || i == Intent::UpdateEvent)
    }

    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError> {
        let matched = self.matcher.find(ctx.text());
        let probabilistic = ctx.entities.recurrence.take();
        let (recurrence, decision) = resolve(probabilistic, matched.as_ref());

        debug!(
            run_id = %ctx.run_id(),
            decision = ?decision,
            pattern = ?matched.as_ref().map(|m| m.pattern),
            recurrence = recurrence.as_ref().map(|r| r.to_string()).unwrap_or_default(),
            "Recurrence resolved"
        );

        ctx.entities.recurrence = recurrence;
        Ok(PhaseResult::success(serde_json::json!({
            "decision": decision,
            "matched": matched,
        })))
    }
}
