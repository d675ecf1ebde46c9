//! Entity fusion phase.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{ExtractionError, PhaseError};
use crate::extract::fusion::fuse_entities;
use crate::extract::llm::LlmExtractor;
use crate::extract::rules::RuleExtractor;
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::phase::{Phase, PhaseResult};

pub const PHASE_NAME: &str = "entity_fusion";
pub const PHASE_ORDER: u32 = 20;

/// Runs both extractors and merges their output into the context.
///
/// The probabilistic side is best effort: a failure or timeout costs a
/// warning, never the phase.
pub struct EntityFusionPhase {
    rules: RuleExtractor,
    llm: Option<LlmExtractor>,
    timeout: Duration,
}

impl EntityFusionPhase {
    pub fn new(rules: RuleExtractor, llm: Option<LlmExtractor>, timeout: Duration) -> Self {
        Self {
            rules,
            llm,
            timeout,
        }
    }
}

#[async_trait]
impl Phase for EntityFusionPhase {
    fn name(&self) -> &str {
        PHASE_NAME
    }

    fn order(&self) -> u32 {
        PHASE_ORDER
    }

    fn should_run(&self, ctx: &InterpretationContext) -> bool {
        ctx.intent().is_some_and(|i| i.wants_entities())
    }

    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError> {
        let run_id = ctx.run_id();
        let mut warnings = Vec::new();

        let probabilistic = match &self.llm {
            Some(extractor) => {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(self.timeout, extractor.extract(ctx)).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(ExtractionError::Timeout(self.timeout)),
                };
                match outcome {
                    Ok(result) => {
                        debug!(
                            run_id = %run_id,
                            model = extractor.model_name(),
                            duration_ms = started.elapsed().as_millis() as u64,
                            "Probabilistic extraction succeeded"
                        );
                        Some(result)
                    }
                    Err(e) => {
                        warn!(run_id = %run_id, error = %e, "Probabilistic extraction failed");
                        warnings.push(format!("entity extraction fell back to rules only: {e}"));
                        None
                    }
                }
            }
            None => None,
        };

        let deterministic =
            self.rules
                .extract(ctx.text(), ctx.intent(), ctx.offset(), ctx.received_at());

        let fusion = fuse_entities(probabilistic.as_ref(), &deterministic);
        if fusion.entities.is_empty() {
            warnings.push("no calendar details found in the message".to_string());
        }

        debug!(
            run_id = %run_id,
            sources = ?fusion.sources,
            confidence = fusion.entities.confidence,
            "Entities fused"
        );

        let payload = serde_json::json!({
            "sources": fusion.sources,
            "probabilistic_available": probabilistic.is_some(),
            "deterministic": deterministic,
        });
        ctx.entities = fusion.entities;

        Ok(PhaseResult::success(payload).with_warnings(warnings))
    }
}
