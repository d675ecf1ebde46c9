//! Assembly of the six standard phases.

use std::sync::Arc;
use std::time::Duration;

use crate::classify::{ClassificationPhase, ClassifierBackend};
use crate::error::ConfigError;
use crate::extract::{EntityFusionPhase, LlmExtractor, RuleExtractor};
use crate::phases::{EntityValidationPhase, ParticipantResolutionPhase, ProfileDefaultsPhase};
use crate::pipeline::orchestrator::PipelineOrchestrator;
use crate::profile::ProfileStore;
use crate::recurrence::{RecurrenceMatcher, RecurrenceResolutionPhase};

/// Everything the standard phases need from the outside world.
pub struct PipelineDeps {
    pub classifiers: Vec<Arc<dyn ClassifierBackend>>,
    /// `None` runs entity extraction on rules alone.
    pub extractor: Option<LlmExtractor>,
    pub profiles: Arc<dyn ProfileStore>,
    pub classify_timeout: Duration,
    pub extract_timeout: Duration,
}

/// Build an orchestrator with classification, entity fusion, participant
/// resolution, recurrence resolution, profile defaults and validation.
pub fn build_standard_pipeline(deps: PipelineDeps) -> Result<PipelineOrchestrator, ConfigError> {
    PipelineOrchestrator::new()
        .with_phase(Arc::new(ClassificationPhase::new(
            deps.classifiers,
            deps.classify_timeout,
        )))?
        .with_phase(Arc::new(EntityFusionPhase::new(
            RuleExtractor::new(),
            deps.extractor,
            deps.extract_timeout,
        )))?
        .with_phase(Arc::new(ParticipantResolutionPhase::new()))?
        .with_phase(Arc::new(RecurrenceResolutionPhase::new(
            RecurrenceMatcher::new(),
        )))?
        .with_phase(Arc::new(ProfileDefaultsPhase::new(deps.profiles)))?
        .with_phase(Arc::new(EntityValidationPhase::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::InMemoryProfileStore;

    #[test]
    fn phases_registered_in_order() {
        let pipeline = build_standard_pipeline(PipelineDeps {
            classifiers: Vec::new(),
            extractor: None,
            profiles: Arc::new(InMemoryProfileStore::new()),
            classify_timeout: Duration::from_secs(1),
            extract_timeout: Duration::from_secs(1),
        })
        .unwrap();

        assert_eq!(
            pipeline.phase_names(),
            vec![
                "intent_classification",
                "entity_fusion",
                "participant_resolution",
                "recurrence_resolution",
                "profile_defaults",
                "entity_validation",
            ]
        );
    }
}
