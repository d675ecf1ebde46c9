//! Enrichment phases that run after entity fusion.

pub mod defaults;
pub mod participants;
pub mod validation;

pub use defaults::ProfileDefaultsPhase;
pub use participants::ParticipantResolutionPhase;
pub use validation::EntityValidationPhase;
