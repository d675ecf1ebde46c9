//! The contract every pipeline phase implements.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::PhaseError;
use crate::pipeline::context::InterpretationContext;

/// Outcome of one phase execution.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub success: bool,
    /// Phase-specific diagnostics. Opaque to the orchestrator.
    pub payload: serde_json::Value,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    /// Ask the orchestrator to stop after this phase. Not a failure.
    pub stop_pipeline: bool,
}

impl PhaseResult {
    pub fn success(payload: serde_json::Value) -> Self {
        Self {
            success: true,
            payload,
            warnings: Vec::new(),
            errors: Vec::new(),
            stop_pipeline: false,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            payload: serde_json::Value::Null,
            warnings: Vec::new(),
            errors: vec![error.into()],
            stop_pipeline: false,
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn stop(mut self) -> Self {
        self.stop_pipeline = true;
        self
    }
}

/// Outcome of a phase's precondition check.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self {
            valid: true,
            ..Default::default()
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            errors: vec![error.into()],
            warnings: Vec::new(),
        }
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// One ordered, independently pluggable step of the pipeline.
///
/// `should_run` and `validate` must be cheap and side-effect free.
/// `execute` may do network I/O and is responsible for its own timeouts.
/// Returning `Err` or panicking is handled exactly like returning a failed
/// [`PhaseResult`].
#[async_trait]
pub trait Phase: Send + Sync {
    /// Unique, human-readable name. Keys the context's result map and metrics.
    fn name(&self) -> &str;

    /// Execution order. Must be unique within an orchestrator.
    fn order(&self) -> u32;

    /// A failed required phase aborts the run.
    fn is_required(&self) -> bool {
        false
    }

    /// Whether this phase applies to the current message.
    fn should_run(&self, _ctx: &InterpretationContext) -> bool {
        true
    }

    /// Optional precondition check. `None` means the phase has none.
    fn validate(&self, _ctx: &InterpretationContext) -> Option<ValidationResult> {
        None
    }

    /// Do the work.
    async fn execute(&self, ctx: &mut InterpretationContext) -> Result<PhaseResult, PhaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_carries_error() {
        let result = PhaseResult::failure("no votes");
        assert!(!result.success);
        assert_eq!(result.errors, vec!["no votes".to_string()]);
        assert!(!result.stop_pipeline);
    }

    #[test]
    fn builders_compose() {
        let result = PhaseResult::success(serde_json::json!({"n": 1}))
            .with_warning("slow backend")
            .stop();
        assert!(result.success);
        assert!(result.stop_pipeline);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.payload["n"], 1);
    }

    #[test]
    fn validation_builders() {
        assert!(ValidationResult::ok().valid);
        let v = ValidationResult::invalid("no date").with_warning("skipping");
        assert!(!v.valid);
        assert_eq!(v.errors.len(), 1);
        assert_eq!(v.warnings.len(), 1);
    }
}
