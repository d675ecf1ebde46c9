//! Intent classification phase: fan out to every backend, fuse the votes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::classify::backend::{ClassificationPrompt, ClassifierBackend, Vote};
use crate::classify::ensemble::fuse_votes;
use crate::error::{ClassifierError, PhaseError};
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::phase::{Phase, PhaseResult, ValidationResult};

pub const PHASE_NAME: &str = "intent_classification";
pub const PHASE_ORDER: u32 = 10;

/// Queries every classifier backend concurrently and reduces the votes to
/// one intent, or to a clarification request.
pub struct ClassificationPhase {
    backends: Vec<Arc<dyn ClassifierBackend>>,
    timeout: Duration,
}

impl ClassificationPhase {
    pub fn new(backends: Vec<Arc<dyn ClassifierBackend>>, timeout: Duration) -> Self {
        Self { backends, timeout }
    }

    /// Ask one backend, bounded by the phase timeout.
    async fn ask(
        &self,
        backend: &Arc<dyn ClassifierBackend>,
        prompt: &ClassificationPrompt,
        ctx: &InterpretationContext,
    ) -> (Result<Vote, ClassifierError>, Duration) {
        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(self.timeout, backend.classify(prompt, ctx.input())).await {
                Ok(result) => result,
                Err(_) => Err(ClassifierError::Timeout {
                    backend: backend.id().to_string(),
                    timeout: self.timeout,
                }),
            };
        (outcome, started.elapsed())
    }
}

#[async_trait]
impl Phase for ClassificationPhase {
    fn name(&self) -> &str {
        PHASE_NAME
    }

    fn order(&self) -> u32 {
        PHASE_ORDER
    }

    fn is_required(&self) -> bool {
        true
    }

    fn validate(&self, ctx: &InterpretationContext) -> Option<ValidationResult> {
        if self.backends.is_empty() {
            return Some(ValidationResult::invalid("no classifier backends configured"));
        }
        if ctx.text().trim().is_empty() {
            return Some(ValidationResult::invalid("message is empty"));
        }
        Some(ValidationResult::ok())
    }

    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError> {
        let run_id = ctx.run_id();
        let prompt = ClassificationPrompt::for_context(ctx);

        // Wait for every backend; one failure never cancels the others.
        let outcomes = {
            let shared: &InterpretationContext = ctx;
            join_all(
                self.backends
                    .iter()
                    .map(|backend| self.ask(backend, &prompt, shared)),
            )
            .await
        };

        let mut votes = Vec::with_capacity(outcomes.len());
        let mut warnings = Vec::new();
        for (backend, (outcome, elapsed)) in self.backends.iter().zip(outcomes) {
            match outcome {
                Ok(vote) => {
                    debug!(
                        run_id = %run_id,
                        backend = backend.id(),
                        intent = %vote.intent,
                        confidence = vote.confidence,
                        duration_ms = elapsed.as_millis() as u64,
                        "Classifier voted"
                    );
                    votes.push(vote);
                }
                Err(e) => {
                    warn!(
                        run_id = %run_id,
                        backend = e.backend(),
                        error = %e,
                        duration_ms = elapsed.as_millis() as u64,
                        "Classifier backend abstained"
                    );
                    warnings.push(format!("classifier {} unavailable: {e}", e.backend()));
                }
            }
        }

        let Some(consensus) = fuse_votes(&votes) else {
            return Ok(PhaseResult::failure(format!(
                "no classifier produced a vote ({} backends failed)",
                self.backends.len()
            ))
            .with_warnings(warnings));
        };

        info!(
            run_id = %run_id,
            intent = %consensus.winner,
            confidence = consensus.confidence,
            agreement = format!("{}/{}", consensus.winner_votes, consensus.total_votes),
            needs_clarification = consensus.needs_clarification,
            "Intent classified"
        );

        ctx.set_intent(consensus.winner, consensus.confidence);
        if let Some(question) = &consensus.question {
            ctx.request_clarification(question.clone());
        }

        Ok(PhaseResult::success(serde_json::json!({
            "votes": votes,
            "consensus": consensus,
        }))
        .with_warnings(warnings))
    }
}
