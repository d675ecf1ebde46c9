//! Recurrence resolution: the user's own day names against the model's guess.

pub mod matcher;
pub mod phase;

pub use matcher::{PatternKind, RecurrenceMatch, RecurrenceMatcher};
pub use phase::{Decision, RecurrenceResolutionPhase, resolve};
