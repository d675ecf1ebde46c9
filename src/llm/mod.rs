//! Language model access.
//!
//! Classifier backends and the probabilistic extractor only see the
//! [`LlmProvider`] trait. Concrete providers are rig-core completion models
//! wrapped in [`RigAdapter`].

pub mod costs;
pub mod json;
pub mod provider;
mod rig_adapter;

pub use json::extract_json_object;
pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use rig::providers::{anthropic, openai};
use secrecy::{ExposeSecret, SecretString};
use tracing::info;

use crate::error::{ConfigError, LlmError};

/// Hosted model APIs we can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Environment variable holding this backend's API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        })
    }
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "openai" | "gpt" => Ok(Self::OpenAi),
            other => Err(ConfigError::InvalidValue {
                key: "backend".to_string(),
                message: format!("unknown LLM backend '{other}'"),
            }),
        }
    }
}

/// One backend, one model, one key.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: SecretString,
    pub model: String,
}

/// Build a provider for `config`.
///
/// Construction never touches the network; a bad key surfaces on the
/// first request.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let key = config.api_key.expose_secret();
    let model = config.model.as_str();

    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Anthropic => {
            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(key).map_err(|e| client_error(config.backend, e))?;
            Arc::new(RigAdapter::new(client.completion_model(model), model))
        }
        LlmBackend::OpenAi => {
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(key).map_err(|e| client_error(config.backend, e))?;
            Arc::new(RigAdapter::new(client.completion_model(model), model))
        }
    };

    info!(backend = %config.backend, model = model, "LLM provider ready");
    Ok(provider)
}

fn client_error(backend: LlmBackend, e: impl fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.to_string(),
        reason: format!("could not build client: {e}"),
    }
}
