//! Multi-backend intent classification.
//!
//! Several independent backends vote in parallel; [`ensemble::fuse_votes`]
//! reduces the votes to one intent plus a confidence, or decides the user
//! has to be asked.

pub mod backend;
pub mod ensemble;
pub mod phase;

pub use backend::{ClassificationPrompt, ClassifierBackend, LlmClassifier, Vote};
pub use ensemble::{Consensus, fuse_votes};
pub use phase::ClassificationPhase;
