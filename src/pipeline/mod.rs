//! Staged interpretation pipeline.
//!
//! Every inbound message flows through an ordered list of phases:
//! 1. `intent_classification`: parallel classifier vote (required)
//! 2. `entity_fusion`: LLM + rule extractors merged field by field
//! 3. `participant_resolution`: authoritative participant list
//! 4. `recurrence_resolution`: deterministic day matcher vs LLM guess
//! 5. `profile_defaults`: fill gaps from the user's history
//! 6. `entity_validation`: required fields, targeted questions
//!
//! The orchestrator owns one [`InterpretationContext`] per run and hands
//! back a [`PipelineResult`]. Low confidence never guesses: it ends the
//! run with a clarification question instead.

pub mod context;
pub mod metrics;
pub mod orchestrator;
pub mod phase;
pub mod standard;
pub mod types;

pub use context::InterpretationContext;
pub use metrics::{MetricsTable, PhaseMetrics, PhaseOutcome};
pub use orchestrator::{PipelineOrchestrator, RunExit};
pub use phase::{Phase, PhaseResult, ValidationResult};
pub use standard::{PipelineDeps, build_standard_pipeline};
pub use types::{InboundMessage, PipelineResult};
