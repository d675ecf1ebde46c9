//! Pipeline orchestrator. Runs registered phases in order against one
//! interpretation context.
//!
//! Flow per message:
//! 1. `should_run` false → skip
//! 2. `validate` fails → abort (required) or skip with warnings (optional)
//! 3. `execute` → store result, merge errors and warnings
//! 4. Failure of a required phase aborts; failure of an optional one doesn't
//! 5. Stop signal, clarification, or new context errors end the run early
//!
//! Nothing a phase does, panics included, escapes `run`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, PhaseError};
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::metrics::{MetricsTable, PhaseOutcome};
use crate::pipeline::phase::{Phase, PhaseResult};
use crate::pipeline::types::{InboundMessage, PipelineResult};

/// How the phase loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// Every phase was considered.
    Completed,
    /// A phase asked to stop, or the context needs clarification / has new
    /// errors. Not a failure of the orchestrator.
    Stopped { phase: String },
    /// A required phase failed validation or execution.
    Aborted { phase: String },
    /// A panic escaped the per-phase handling.
    Crashed,
}

/// Ordered registry of phases plus their metrics.
///
/// Constructed once at startup and shared by reference; each `run` owns a
/// fresh context.
pub struct PipelineOrchestrator {
    /// Sorted ascending by `order()`; kept sorted on insert.
    phases: Vec<Arc<dyn Phase>>,
    metrics: Arc<MetricsTable>,
}

impl PipelineOrchestrator {
    pub fn new() -> Self {
        Self {
            phases: Vec::new(),
            metrics: Arc::new(MetricsTable::new()),
        }
    }

    /// Register a phase. Duplicate orders or names are configuration errors.
    pub fn register(&mut self, phase: Arc<dyn Phase>) -> Result<(), ConfigError> {
        if let Some(existing) = self.phases.iter().find(|p| p.order() == phase.order()) {
            return Err(ConfigError::DuplicatePhaseOrder {
                order: phase.order(),
                existing: existing.name().to_string(),
                phase: phase.name().to_string(),
            });
        }
        if self.phases.iter().any(|p| p.name() == phase.name()) {
            return Err(ConfigError::DuplicatePhaseName(phase.name().to_string()));
        }

        let position = self.phases.partition_point(|p| p.order() < phase.order());
        self.metrics.register_sync(phase.name());
        debug!(
            phase = phase.name(),
            order = phase.order(),
            required = phase.is_required(),
            "Registered phase"
        );
        self.phases.insert(position, phase);
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_phase(mut self, phase: Arc<dyn Phase>) -> Result<Self, ConfigError> {
        self.register(phase)?;
        Ok(self)
    }

    /// Phase names in execution order.
    pub fn phase_names(&self) -> Vec<&str> {
        self.phases.iter().map(|p| p.name()).collect()
    }

    pub fn metrics(&self) -> &Arc<MetricsTable> {
        &self.metrics
    }

    /// Operator action: zero all phase counters.
    pub async fn reset_metrics(&self) {
        self.metrics.reset().await;
        info!("Phase metrics reset");
    }

    /// Interpret one message.
    pub async fn run(&self, message: InboundMessage) -> PipelineResult {
        let mut ctx = InterpretationContext::new(message);
        self.interpret(&mut ctx).await;
        ctx.into_result()
    }

    /// Run every phase against an existing context.
    ///
    /// Exposed so callers (and tests) can inspect per-phase results before
    /// the context is consumed.
    pub async fn interpret(&self, ctx: &mut InterpretationContext) -> RunExit {
        let run_id = ctx.run_id();
        info!(
            run_id = %run_id,
            sender = %ctx.sender(),
            phases = self.phases.len(),
            "Interpreting message"
        );

        let outcome = AssertUnwindSafe(self.run_phases(ctx)).catch_unwind().await;
        let exit = match outcome {
            Ok(exit) => exit,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(run_id = %run_id, panic = %message, "Pipeline crashed");
                ctx.add_error(format!("pipeline crashed: {message}"));
                RunExit::Crashed
            }
        };

        info!(
            run_id = %run_id,
            exit = ?exit,
            intent = ctx.intent().map(|i| i.as_str()).unwrap_or("none"),
            confidence = ctx.confidence(),
            needs_clarification = ctx.needs_clarification(),
            errors = ctx.errors().len(),
            "Interpretation finished"
        );
        exit
    }

    async fn run_phases(&self, ctx: &mut InterpretationContext) -> RunExit {
        let run_id = ctx.run_id();

        for phase in &self.phases {
            let name = phase.name();

            if !phase.should_run(ctx) {
                debug!(run_id = %run_id, phase = name, "Phase not applicable, skipping");
                self.metrics
                    .record(name, PhaseOutcome::Skipped, Default::default())
                    .await;
                continue;
            }

            if let Some(validation) = phase.validate(ctx)
                && !validation.valid
            {
                let mut errors = validation.errors;
                if errors.is_empty() {
                    errors.push("validation failed".to_string());
                }

                if phase.is_required() {
                    warn!(
                        run_id = %run_id,
                        phase = name,
                        errors = ?errors,
                        "Required phase failed validation, aborting"
                    );
                    ctx.extend_errors(errors.into_iter().map(|e| format!("{name}: {e}")));
                    ctx.extend_warnings(validation.warnings);
                    self.metrics.record_rejection(name).await;
                    return RunExit::Aborted {
                        phase: name.to_string(),
                    };
                }

                debug!(
                    run_id = %run_id,
                    phase = name,
                    errors = ?errors,
                    "Optional phase failed validation, skipping"
                );
                ctx.extend_warnings(validation.warnings);
                ctx.extend_warnings(errors.into_iter().map(|e| format!("{name} skipped: {e}")));
                self.metrics
                    .record(name, PhaseOutcome::Skipped, Default::default())
                    .await;
                continue;
            }

            let errors_before = ctx.errors().len();
            let started = Instant::now();
            let executed = AssertUnwindSafe(phase.execute(ctx)).catch_unwind().await;
            let elapsed = started.elapsed();

            let result = match executed {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => PhaseResult::failure(e.to_string()),
                Err(panic) => PhaseResult::failure(
                    PhaseError::Panicked {
                        phase: name.to_string(),
                        message: panic_message(panic.as_ref()),
                    }
                    .to_string(),
                ),
            };

            ctx.record_phase_result(name, result.clone());
            let PhaseResult {
                success,
                warnings,
                errors,
                stop_pipeline,
                ..
            } = result;

            if !success {
                self.metrics.record(name, PhaseOutcome::Error, elapsed).await;
                let errors = if errors.is_empty() {
                    vec![format!("{name}: failed")]
                } else {
                    errors.into_iter().map(|e| format!("{name}: {e}")).collect()
                };
                warn!(
                    run_id = %run_id,
                    phase = name,
                    required = phase.is_required(),
                    duration_ms = elapsed.as_millis() as u64,
                    errors = ?errors,
                    "Phase failed"
                );
                ctx.extend_errors(errors);
                ctx.extend_warnings(warnings);

                if phase.is_required() {
                    return RunExit::Aborted {
                        phase: name.to_string(),
                    };
                }
                continue;
            }

            self.metrics.record(name, PhaseOutcome::Success, elapsed).await;
            ctx.extend_warnings(warnings);
            debug!(
                run_id = %run_id,
                phase = name,
                duration_ms = elapsed.as_millis() as u64,
                "Phase succeeded"
            );

            if stop_pipeline || ctx.needs_clarification() || ctx.errors().len() > errors_before {
                debug!(
                    run_id = %run_id,
                    phase = name,
                    stop_requested = stop_pipeline,
                    needs_clarification = ctx.needs_clarification(),
                    "Stopping pipeline early"
                );
                return RunExit::Stopped {
                    phase: name.to_string(),
                };
            }
        }

        RunExit::Completed
    }
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::intent::Intent;
    use crate::pipeline::phase::ValidationResult;

    #[derive(Clone, Copy)]
    enum Behavior {
        Succeed,
        Fail,
        Error,
        Panic,
        Stop,
        Clarify,
        WriteError,
    }

    struct TestPhase {
        name: String,
        order: u32,
        required: bool,
        applies: bool,
        panics_in_should_run: bool,
        validation: Option<ValidationResult>,
        behavior: Behavior,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl TestPhase {
        fn new(name: &str, order: u32, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                order,
                required: false,
                applies: true,
                panics_in_should_run: false,
                validation: None,
                behavior: Behavior::Succeed,
                log: Arc::clone(log),
            }
        }

        fn required(mut self) -> Self {
            self.required = true;
            self
        }

        fn behavior(mut self, behavior: Behavior) -> Self {
            self.behavior = behavior;
            self
        }

        fn not_applicable(mut self) -> Self {
            self.applies = false;
            self
        }

        fn panics_in_should_run(mut self) -> Self {
            self.panics_in_should_run = true;
            self
        }

        fn invalid(mut self) -> Self {
            self.validation =
                Some(ValidationResult::invalid("missing date").with_warning("no date found"));
            self
        }

        fn into_arc(self) -> Arc<dyn Phase> {
            Arc::new(self)
        }
    }

    #[async_trait]
    impl Phase for TestPhase {
        fn name(&self) -> &str {
            &self.name
        }

        fn order(&self) -> u32 {
            self.order
        }

        fn is_required(&self) -> bool {
            self.required
        }

        fn should_run(&self, _ctx: &InterpretationContext) -> bool {
            if self.panics_in_should_run {
                panic!("predicate exploded");
            }
            self.applies
        }

        fn validate(&self, _ctx: &InterpretationContext) -> Option<ValidationResult> {
            self.validation.clone()
        }

        async fn execute(
            &self,
            ctx: &mut InterpretationContext,
        ) -> Result<PhaseResult, PhaseError> {
            self.log.lock().unwrap().push(self.name.clone());
            match self.behavior {
                Behavior::Succeed => Ok(PhaseResult::success(serde_json::json!({"ok": true}))
                    .with_warning(format!("{} note", self.name))),
                Behavior::Fail => Ok(PhaseResult::failure("nothing extracted")),
                Behavior::Error => Err(PhaseError::Failed {
                    phase: self.name.clone(),
                    reason: "backend exploded".into(),
                }),
                Behavior::Panic => panic!("phase blew up"),
                Behavior::Stop => Ok(PhaseResult::success(serde_json::Value::Null).stop()),
                Behavior::Clarify => {
                    ctx.set_intent(Intent::CreateEvent, 0.6);
                    ctx.request_clarification("event or reminder?");
                    Ok(PhaseResult::success(serde_json::Value::Null))
                }
                Behavior::WriteError => {
                    ctx.add_error("date is in the past");
                    Ok(PhaseResult::success(serde_json::Value::Null))
                }
            }
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn ran(log: &Arc<Mutex<Vec<String>>>) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn executes_in_declared_order_regardless_of_registration_order() {
        let log = log();
        let mut pipeline = PipelineOrchestrator::new();
        for (name, order) in [("c", 30), ("a", 10), ("d", 40), ("b", 20)] {
            pipeline
                .register(TestPhase::new(name, order, &log).into_arc())
                .unwrap();
        }

        assert_eq!(pipeline.phase_names(), vec!["a", "b", "c", "d"]);
        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert!(result.success);
        assert_eq!(ran(&log), vec!["a", "b", "c", "d"]);
        assert_eq!(
            result.warnings,
            vec!["a note", "b note", "c note", "d note"]
        );
    }

    #[test]
    fn duplicate_order_is_rejected() {
        let log = log();
        let mut pipeline = PipelineOrchestrator::new();
        pipeline
            .register(TestPhase::new("first", 10, &log).into_arc())
            .unwrap();
        let err = pipeline
            .register(TestPhase::new("second", 10, &log).into_arc())
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicatePhaseOrder { order: 10, .. }));
        assert_eq!(pipeline.phase_names(), vec!["first"]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("same", 10, &log).into_arc())
            .unwrap();
        let err = pipeline
            .with_phase(TestPhase::new("same", 20, &log).into_arc())
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::DuplicatePhaseName(_)));
    }

    #[tokio::test]
    async fn required_failure_aborts_later_phases() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("a", 10, &log).into_arc())
            .unwrap()
            .with_phase(
                TestPhase::new("b", 20, &log)
                    .required()
                    .behavior(Behavior::Fail)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("c", 30, &log).into_arc())
            .unwrap();

        let mut ctx = InterpretationContext::new(InboundMessage::new("u", "hi"));
        let exit = pipeline.interpret(&mut ctx).await;
        assert_eq!(exit, RunExit::Aborted { phase: "b".into() });
        assert_eq!(ran(&log), vec!["a", "b"]);
        assert!(ctx.phase_result("b").is_some_and(|r| !r.success));
        assert!(ctx.phase_result("c").is_none());

        let result = ctx.into_result();
        assert!(!result.success);
        assert_eq!(result.errors, vec!["b: nothing extracted"]);
    }

    #[tokio::test]
    async fn optional_failure_continues_and_surfaces_error() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(
                TestPhase::new("a", 10, &log)
                    .behavior(Behavior::Fail)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert_eq!(ran(&log), vec!["a", "b"]);
        assert!(!result.success);
        assert_eq!(result.errors, vec!["a: nothing extracted"]);
    }

    #[tokio::test]
    async fn returned_error_is_treated_like_failure() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(
                TestPhase::new("a", 10, &log)
                    .required()
                    .behavior(Behavior::Error)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert_eq!(ran(&log), vec!["a"]);
        assert!(result.errors[0].contains("backend exploded"));
    }

    #[tokio::test]
    async fn panicking_phase_is_contained() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(
                TestPhase::new("a", 10, &log)
                    .behavior(Behavior::Panic)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        // Optional phase panicked: recorded as its failure, run continues.
        assert_eq!(ran(&log), vec!["a", "b"]);
        assert!(!result.success);
        assert!(result.errors[0].contains("phase blew up"));
        let metrics = pipeline.metrics().get("a").await.unwrap();
        assert_eq!(metrics.errors, 1);
    }

    #[tokio::test]
    async fn panic_outside_execute_crashes_the_run() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("a", 10, &log).into_arc())
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).panics_in_should_run().into_arc())
            .unwrap()
            .with_phase(TestPhase::new("c", 30, &log).into_arc())
            .unwrap();

        let mut ctx = InterpretationContext::new(InboundMessage::new("u", "hi"));
        let exit = pipeline.interpret(&mut ctx).await;
        assert!(matches!(exit, RunExit::Crashed));
        assert_eq!(ran(&log), vec!["a"]);

        let result = ctx.into_result();
        assert!(!result.success);
        assert_eq!(result.errors, vec!["pipeline crashed: predicate exploded"]);
        assert_eq!(result.warnings, vec!["a note"]);
    }

    #[tokio::test]
    async fn skipped_phase_counts_skip_without_warnings() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("a", 10, &log).not_applicable().into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert!(ran(&log).is_empty());
        assert!(result.warnings.is_empty());
        let metrics = pipeline.metrics().get("a").await.unwrap();
        assert_eq!(metrics.skips, 1);
        assert_eq!(metrics.executions, 0);
    }

    #[tokio::test]
    async fn required_validation_failure_aborts() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("a", 10, &log).required().invalid().into_arc())
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert!(ran(&log).is_empty());
        assert_eq!(result.errors, vec!["a: missing date"]);
        assert_eq!(pipeline.metrics().get("a").await.unwrap().errors, 1);
    }

    #[tokio::test]
    async fn optional_validation_failure_skips_and_keeps_warnings() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("a", 10, &log).invalid().into_arc())
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert_eq!(ran(&log), vec!["b"]);
        assert!(result.success);
        assert!(result.warnings.contains(&"no date found".to_string()));
        assert_eq!(pipeline.metrics().get("a").await.unwrap().skips, 1);
    }

    #[tokio::test]
    async fn stop_signal_ends_run_without_error() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(
                TestPhase::new("a", 10, &log)
                    .behavior(Behavior::Stop)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let mut ctx = InterpretationContext::new(InboundMessage::new("u", "hi"));
        let exit = pipeline.interpret(&mut ctx).await;
        assert_eq!(exit, RunExit::Stopped { phase: "a".into() });
        assert_eq!(ran(&log), vec!["a"]);
        assert!(ctx.into_result().success);
    }

    #[tokio::test]
    async fn clarification_stops_run_and_is_success() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(
                TestPhase::new("a", 10, &log)
                    .behavior(Behavior::Clarify)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert_eq!(ran(&log), vec!["a"]);
        assert!(result.success);
        assert!(result.needs_clarification);
        assert_eq!(result.clarification_question.as_deref(), Some("event or reminder?"));
    }

    #[tokio::test]
    async fn error_written_by_successful_phase_stops_run() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(
                TestPhase::new("a", 10, &log)
                    .behavior(Behavior::WriteError)
                    .into_arc(),
            )
            .unwrap()
            .with_phase(TestPhase::new("b", 20, &log).into_arc())
            .unwrap();

        let result = pipeline.run(InboundMessage::new("u", "hi")).await;
        assert_eq!(ran(&log), vec!["a"]);
        assert!(!result.success);
    }

    #[tokio::test]
    async fn metrics_accumulate_across_runs_and_reset() {
        let log = log();
        let pipeline = PipelineOrchestrator::new()
            .with_phase(TestPhase::new("a", 10, &log).into_arc())
            .unwrap();

        for _ in 0..3 {
            pipeline.run(InboundMessage::new("u", "hi")).await;
        }
        let metrics = pipeline.metrics().get("a").await.unwrap();
        assert_eq!(metrics.executions, 3);
        assert_eq!(metrics.successes, 3);
        assert!(metrics.average_duration() <= Duration::from_secs(1));

        pipeline.reset_metrics().await;
        assert_eq!(pipeline.metrics().get("a").await.unwrap().executions, 0);
    }
}
