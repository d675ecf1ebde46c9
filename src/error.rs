//! Error types for Cal Assist.

use std::time::Duration;

/// Configuration-related errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Phase order {order} is already taken by '{existing}', cannot register '{phase}'")]
    DuplicatePhaseOrder {
        order: u32,
        existing: String,
        phase: String,
    },

    #[error("A phase named '{0}' is already registered")]
    DuplicatePhaseName(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by a phase's `execute`.
///
/// The orchestrator treats every variant exactly like a failed `PhaseResult`.
#[derive(Debug, thiserror::Error)]
pub enum PhaseError {
    #[error("Phase {phase} failed: {reason}")]
    Failed { phase: String, reason: String },

    #[error("Phase {phase} panicked: {message}")]
    Panicked { phase: String, message: String },
}

/// A single classifier backend failing to produce a vote.
#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("Backend {backend} call failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: LlmError,
    },

    #[error("Backend {backend} returned an unusable answer: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("Backend {backend} timed out after {timeout:?}")]
    Timeout { backend: String, timeout: Duration },
}

impl ClassifierError {
    /// Identifier of the backend that failed.
    pub fn backend(&self) -> &str {
        match self {
            Self::Backend { backend, .. }
            | Self::InvalidResponse { backend, .. }
            | Self::Timeout { backend, .. } => backend,
        }
    }
}

/// Probabilistic entity extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Extractor LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("Could not parse extractor output: {0}")]
    Parse(String),

    #[error("Extractor timed out after {0:?}")]
    Timeout(Duration),
}

/// Profile lookup errors. Callers downgrade these to "no defaults".
#[derive(Debug, thiserror::Error)]
pub enum ProfileError {
    #[error("Profile lookup failed for {user_id}: {reason}")]
    Lookup { user_id: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_order_message_names_both_phases() {
        let err = ConfigError::DuplicatePhaseOrder {
            order: 20,
            existing: "entity_fusion".into(),
            phase: "other".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("20"));
        assert!(msg.contains("entity_fusion"));
        assert!(msg.contains("other"));
    }

    #[test]
    fn classifier_error_exposes_backend() {
        let err = ClassifierError::Timeout {
            backend: "gpt".into(),
            timeout: Duration::from_secs(3),
        };
        assert_eq!(err.backend(), "gpt");

        let err = ClassifierError::Backend {
            backend: "claude".into(),
            source: LlmError::RequestFailed {
                provider: "anthropic".into(),
                reason: "401 unauthorized".into(),
            },
        };
        assert_eq!(err.backend(), "claude");
        assert!(err.to_string().contains("401 unauthorized"));
    }
}
