//! Cal Assist: staged interpretation of chat messages into calendar intents.
//!
//! A message runs through an ordered list of phases (classification,
//! entity fusion, participant resolution, recurrence resolution, profile
//! defaults, validation) that share one [`pipeline::InterpretationContext`].
//! The result is either a structured intent with entities or a single
//! clarification question.

pub mod classify;
pub mod config;
pub mod entities;
pub mod error;
pub mod extract;
pub mod intent;
pub mod llm;
pub mod phases;
pub mod pipeline;
pub mod profile;
pub mod recurrence;
pub mod respond;
