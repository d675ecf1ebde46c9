//! Profile defaults: fill missing time, duration and location from the
//! user's habits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::PhaseError;
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::phase::{Phase, PhaseResult};
use crate::profile::ProfileStore;

pub const PHASE_NAME: &str = "profile_defaults";
pub const PHASE_ORDER: u32 = 50;

pub struct ProfileDefaultsPhase {
    store: Arc<dyn ProfileStore>,
}

impl ProfileDefaultsPhase {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Phase for ProfileDefaultsPhase {
    fn name(&self) -> &str {
        PHASE_NAME
    }

    fn order(&self) -> u32 {
        PHASE_ORDER
    }

    fn should_run(&self, ctx: &InterpretationContext) -> bool {
        ctx.intent().is_some_and(|i| i.is_create())
            && (ctx.entities.time.is_none()
                || ctx.entities.duration_minutes.is_none()
                || ctx.entities.location.is_none())
    }

    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError> {
        let run_id = ctx.run_id();
        let summary = match self.store.pattern_summary(ctx.sender()).await {
            Ok(Some(summary)) => summary,
            Ok(None) => {
                debug!(run_id = %run_id, "No profile for sender, no defaults");
                return Ok(PhaseResult::success(serde_json::json!({ "applied": [] })));
            }
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Profile lookup failed");
                return Ok(PhaseResult::success(serde_json::json!({ "applied": [] }))
                    .with_warning(format!("could not load your usual preferences: {e}")));
            }
        };

        let mut applied = Vec::new();
        if ctx.entities.time.is_none()
            && ctx.entities.date.is_some()
            && let Some(time) = summary.most_common_time
        {
            ctx.entities.time = Some(time);
            applied.push("time".to_string());
        }
        if ctx.entities.duration_minutes.is_none()
            && let Some(minutes) = summary.average_duration_minutes
        {
            ctx.entities.duration_minutes = Some(minutes);
            applied.push("duration_minutes".to_string());
        }
        if ctx.entities.location.is_none()
            && let Some(location) = summary.frequent_locations.first()
        {
            ctx.entities.location = Some(location.clone());
            applied.push("location".to_string());
        }

        if !applied.is_empty() {
            info!(
                run_id = %run_id,
                applied = ?applied,
                samples = summary.samples,
                "Applied profile defaults"
            );
        }
        ctx.entities.defaults_applied.extend(applied.iter().cloned());

        Ok(PhaseResult::success(serde_json::json!({
            "applied": applied,
            "samples": summary.samples,
        })))
    }
}
