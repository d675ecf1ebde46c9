//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs::model_cost;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Adapter wrapping a rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
        }
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.model_name)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, prompt) = split_messages(&request.messages);

        let mut builder = self.model.completion_request(prompt);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder.send().await.map_err(|e| LlmError::RequestFailed {
            provider: self.model_name.clone(),
            reason: e.to_string(),
        })?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        if content.trim().is_empty() {
            return Err(LlmError::InvalidResponse {
                provider: self.model_name.clone(),
                reason: "response contained no text".to_string(),
            });
        }

        let output_tokens = saturating_tokens(response.usage.output_tokens);
        Ok(CompletionResponse {
            content,
            input_tokens: saturating_tokens(response.usage.input_tokens),
            output_tokens,
            finish_reason: finish_reason(request.max_tokens, output_tokens),
            response_id: None,
        })
    }
}

fn saturating_tokens(count: u64) -> u32 {
    u32::try_from(count).unwrap_or(u32::MAX)
}

/// rig doesn't surface a stop reason uniformly across providers, so a
/// response that used the whole token budget is treated as truncated.
fn finish_reason(max_tokens: Option<u32>, output_tokens: u32) -> FinishReason {
    match max_tokens {
        Some(limit) if output_tokens >= limit => FinishReason::Length,
        _ => FinishReason::Stop,
    }
}

/// Fold our message list into rig's (preamble, prompt) pair.
///
/// System messages become the preamble; the remaining turns are joined into
/// a single prompt since every caller here sends one user turn.
fn split_messages(messages: &[ChatMessage]) -> (Option<String>, String) {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let prompt = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    let preamble = if system.is_empty() {
        None
    } else {
        Some(system.join("\n\n"))
    };
    (preamble, prompt)
}
