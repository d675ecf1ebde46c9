//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::types::parse_utc_offset;

/// Classifier ensemble used when `CAL_ASSIST_CLASSIFIERS` is not set.
pub const DEFAULT_CLASSIFIERS: &str =
    "anthropic:claude-sonnet-4-20250514,anthropic:claude-3-5-haiku-latest,openai:gpt-4o-mini";

pub const DEFAULT_EXTRACTOR: &str = "anthropic:claude-sonnet-4-20250514";

/// A `backend:model` pair, e.g. `openai:gpt-4o-mini`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub backend: LlmBackend,
    pub model: String,
}

impl ModelSpec {
    /// Backend-qualified id, used as the classifier's vote label.
    pub fn id(&self) -> String {
        format!("{}:{}", self.backend, self.model)
    }

    /// Pair this spec with its backend's API key.
    pub fn llm_config(&self, api_key: SecretString) -> LlmConfig {
        LlmConfig {
            backend: self.backend,
            api_key,
            model: self.model.clone(),
        }
    }
}

impl FromStr for ModelSpec {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (backend, model) = s.trim().split_once(':').ok_or_else(|| ConfigError::InvalidValue {
            key: "model".to_string(),
            message: format!("expected backend:model, got '{s}'"),
        })?;
        let model = model.trim();
        if model.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "model".to_string(),
                message: format!("missing model name in '{s}'"),
            });
        }
        Ok(Self {
            backend: backend.parse()?,
            model: model.to_string(),
        })
    }
}

/// Interpreter configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Timezone assumed for messages that don't carry one.
    pub default_timezone: String,
    /// Per-backend classification timeout.
    pub classify_timeout: Duration,
    /// Timeout for the probabilistic extractor.
    pub extract_timeout: Duration,
    pub classifier_temperature: f32,
    pub extractor_temperature: f32,
    pub extractor_max_tokens: u32,
    pub classifiers: Vec<ModelSpec>,
    /// `None` means rules-only extraction.
    pub extractor: Option<ModelSpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_timezone: "UTC".to_string(),
            classify_timeout: Duration::from_secs(10),
            extract_timeout: Duration::from_secs(15),
            classifier_temperature: 0.0,
            extractor_temperature: 0.1,
            extractor_max_tokens: 768,
            classifiers: Vec::new(),
            extractor: None,
        }
    }
}

impl PipelineConfig {
    /// Build from `CAL_ASSIST_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take defaults; set but
    /// unparseable keys are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let default_timezone = lookup("CAL_ASSIST_DEFAULT_TIMEZONE")
            .map(|s| s.trim().to_string())
            .unwrap_or(defaults.default_timezone);
        if parse_utc_offset(&default_timezone).is_none() {
            return Err(ConfigError::InvalidValue {
                key: "CAL_ASSIST_DEFAULT_TIMEZONE".to_string(),
                message: format!("'{default_timezone}' is not a UTC offset"),
            });
        }

        let classify_timeout = parse_or(&lookup, "CAL_ASSIST_CLASSIFY_TIMEOUT_SECS", 10u64)
            .map(Duration::from_secs)?;
        let extract_timeout = parse_or(&lookup, "CAL_ASSIST_EXTRACT_TIMEOUT_SECS", 15u64)
            .map(Duration::from_secs)?;
        let classifier_temperature = parse_or(
            &lookup,
            "CAL_ASSIST_CLASSIFIER_TEMPERATURE",
            defaults.classifier_temperature,
        )?;
        let extractor_temperature = parse_or(
            &lookup,
            "CAL_ASSIST_EXTRACTOR_TEMPERATURE",
            defaults.extractor_temperature,
        )?;
        let extractor_max_tokens = parse_or(
            &lookup,
            "CAL_ASSIST_EXTRACTOR_MAX_TOKENS",
            defaults.extractor_max_tokens,
        )?;

        let classifiers = parse_model_list(
            &lookup("CAL_ASSIST_CLASSIFIERS").unwrap_or_else(|| DEFAULT_CLASSIFIERS.to_string()),
        )?;
        if classifiers.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CAL_ASSIST_CLASSIFIERS".to_string(),
                message: "at least one classifier is required".to_string(),
            });
        }

        // "none" turns the probabilistic extractor off.
        let extractor = match lookup("CAL_ASSIST_EXTRACTOR") {
            Some(s) if s.trim().eq_ignore_ascii_case("none") || s.trim().is_empty() => None,
            Some(s) => Some(s.parse()?),
            None => Some(DEFAULT_EXTRACTOR.parse()?),
        };

        Ok(Self {
            default_timezone,
            classify_timeout,
            extract_timeout,
            classifier_temperature,
            extractor_temperature,
            extractor_max_tokens,
            classifiers,
            extractor,
        })
    }

    /// Resolve the API key for `spec` from its backend's variable.
    pub fn api_key(
        spec: &ModelSpec,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<SecretString, ConfigError> {
        let var = spec.backend.api_key_env();
        lookup(var)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

/// Comma-separated `backend:model` pairs; blanks are skipped.
pub fn parse_model_list(raw: &str) -> Result<Vec<ModelSpec>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
