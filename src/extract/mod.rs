//! Entity extraction: a probabilistic (LLM) extractor and a deterministic
//! (regex) extractor, merged field by field.

pub mod fusion;
pub mod llm;
pub mod phase;
pub mod rules;
pub mod types;

pub use fusion::{Fusion, Source, fuse_entities};
pub use llm::LlmExtractor;
pub use phase::EntityFusionPhase;
pub use rules::RuleExtractor;
pub use types::{ExtractionResult, FieldConfidence};
