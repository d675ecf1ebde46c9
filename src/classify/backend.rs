//! Classifier backends. Each one is an independent source of intent votes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClassifierError;
use crate::intent::Intent;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::llm::extract_json_object;
use crate::pipeline::context::InterpretationContext;
use crate::pipeline::types::InboundMessage;

/// Max tokens for a classification call. The answer is one small object.
const CLASSIFY_MAX_TOKENS: u32 = 256;

/// Temperature for classification.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Confidence assumed when a backend omits it.
const DEFAULT_VOTE_CONFIDENCE: f32 = 0.5;

/// One backend's opinion about a message's intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub backend: String,
    pub intent: Intent,
    /// Self-reported, clamped to 0.0–1.0.
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rationale: Option<String>,
}

impl Vote {
    pub fn new(backend: impl Into<String>, intent: Intent, confidence: f32) -> Self {
        Self {
            backend: backend.into(),
            intent,
            confidence: confidence.clamp(0.0, 1.0),
            rationale: None,
        }
    }

    pub fn with_rationale(mut self, rationale: impl Into<String>) -> Self {
        self.rationale = Some(rationale.into());
        self
    }
}

/// The prompt pair every backend is asked with. Built once per run.
#[derive(Debug, Clone)]
pub struct ClassificationPrompt {
    pub system: String,
    pub user: String,
}

impl ClassificationPrompt {
    pub fn for_context(ctx: &InterpretationContext) -> Self {
        Self {
            system: build_classify_system_prompt(),
            user: build_classify_user_prompt(ctx),
        }
    }
}

/// An independent intent classifier.
///
/// Implementations must not retry internally; the phase applies one
/// timeout per call and treats any error as an abstention.
#[async_trait]
pub trait ClassifierBackend: Send + Sync {
    /// Stable identifier used in votes, warnings and logs.
    fn id(&self) -> &str;

    async fn classify(
        &self,
        prompt: &ClassificationPrompt,
        input: &InboundMessage,
    ) -> Result<Vote, ClassifierError>;
}

// ── LLM-backed classifier ───────────────────────────────────────────

/// Classifier that asks a language model for a JSON verdict.
pub struct LlmClassifier {
    id: String,
    llm: Arc<dyn LlmProvider>,
    temperature: f32,
}

impl LlmClassifier {
    pub fn new(id: impl Into<String>, llm: Arc<dyn LlmProvider>) -> Self {
        Self {
            id: id.into(),
            llm,
            temperature: CLASSIFY_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

#[async_trait]
impl ClassifierBackend for LlmClassifier {
    fn id(&self) -> &str {
        &self.id
    }

    async fn classify(
        &self,
        prompt: &ClassificationPrompt,
        input: &InboundMessage,
    ) -> Result<Vote, ClassifierError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompt.system.clone()),
            ChatMessage::user(prompt.user.clone()),
        ])
        .with_temperature(self.temperature)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|source| ClassifierError::Backend {
                backend: self.id.clone(),
                source,
            })?;

        let cost = response.cost(self.llm.cost_per_token());
        debug!(
            backend = %self.id,
            model = self.llm.model_name(),
            sender = %input.sender,
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            cost_usd = %cost,
            "Classifier call complete"
        );

        parse_vote(&self.id, &response.content).inspect_err(|e| {
            warn!(
                backend = %self.id,
                raw_response = %response.content,
                error = %e,
                "Unusable classifier response"
            );
        })
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classify_system_prompt() -> String {
    let mut prompt = String::from(
        "You classify chat messages sent to a calendar assistant. \
         Pick exactly one intent.\n\nIntents:\n",
    );
    for intent in Intent::ALL {
        prompt.push_str(&format!("- \"{}\": the user wants to {}\n", intent, intent.describe()));
    }
    prompt.push_str(
        "\nRespond with ONLY a JSON object:\n\
         {\"intent\": \"...\", \"confidence\": 0.0, \"rationale\": \"...\"}\n\n\
         Rules:\n\
         - confidence is your certainty between 0.0 and 1.0\n\
         - rationale is one short sentence\n\
         - A message about something that happens at a time with other people is usually an event\n\
         - \"remind me\" is a reminder; a to-do without a fixed time is a task\n\
         - Use \"unknown\" when the message is not about the calendar",
    );
    prompt
}

fn build_classify_user_prompt(ctx: &InterpretationContext) -> String {
    let local = ctx.received_at().with_timezone(&ctx.offset());
    let mut prompt = String::with_capacity(256);
    prompt.push_str(&format!("From: {}\n", ctx.sender()));
    prompt.push_str(&format!(
        "Local time: {} ({})\n",
        local.format("%A %Y-%m-%d %H:%M"),
        ctx.input().timezone
    ));

    let content_preview: String = ctx.text().chars().take(1000).collect();
    prompt.push_str(&format!("\nMessage:\n{}", content_preview));
    prompt
}

// ── Response parsing ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ClassificationResponse {
    intent: String,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Parse a backend's raw answer into a vote.
pub fn parse_vote(backend: &str, raw: &str) -> Result<Vote, ClassifierError> {
    let json_str = extract_json_object(raw);
    let response: ClassificationResponse =
        serde_json::from_str(json_str).map_err(|e| ClassifierError::InvalidResponse {
            backend: backend.to_string(),
            reason: format!("JSON parse error: {e}"),
        })?;

    let intent = response
        .intent
        .parse::<Intent>()
        .map_err(|reason| ClassifierError::InvalidResponse {
            backend: backend.to_string(),
            reason,
        })?;

    let mut vote = Vote::new(
        backend,
        intent,
        response.confidence.unwrap_or(DEFAULT_VOTE_CONFIDENCE),
    );
    if let Some(rationale) = response.rationale.filter(|r| !r.trim().is_empty()) {
        vote = vote.with_rationale(rationale);
    }
    Ok(vote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionResponse, FinishReason};

    struct MockClassifyLlm {
        response: Result<String, ()>,
    }

    #[async_trait]
    impl LlmProvider for MockClassifyLlm {
        fn model_name(&self) -> &str {
            "mock-classify"
        }

        fn cost_per_token(&self) -> (rust_decimal::Decimal, rust_decimal::Decimal) {
            (rust_decimal::Decimal::ZERO, rust_decimal::Decimal::ZERO)
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            match &self.response {
                Ok(content) => Ok(CompletionResponse {
                    content: content.clone(),
                    input_tokens: 120,
                    output_tokens: 20,
                    finish_reason: FinishReason::Stop,
                    response_id: None,
                }),
                Err(()) => Err(LlmError::RequestFailed {
                    provider: "mock".into(),
                    reason: "connection reset".into(),
                }),
            }
        }
    }

    fn prompt_for(text: &str) -> (ClassificationPrompt, InboundMessage) {
        let msg = InboundMessage::new("user-1", text).with_timezone("+02:00");
        let ctx = InterpretationContext::new(msg.clone());
        (ClassificationPrompt::for_context(&ctx), msg)
    }

    #[test]
    fn system_prompt_lists_every_intent() {
        let prompt = build_classify_system_prompt();
        for intent in Intent::ALL {
            assert!(prompt.contains(intent.as_str()));
        }
    }

    #[test]
    fn user_prompt_truncates_message() {
        let (prompt, _) = prompt_for(&"x".repeat(3000));
        assert!(prompt.user.contains("+02:00"));
        assert!(prompt.user.len() < 1200);
    }

    #[test]
    fn parse_plain_and_wrapped_json() {
        let vote = parse_vote(
            "a",
            r#"{"intent": "create_event", "confidence": 0.9, "rationale": "meeting"}"#,
        )
        .unwrap();
        assert_eq!(vote.intent, Intent::CreateEvent);
        assert_eq!(vote.rationale.as_deref(), Some("meeting"));

        let vote = parse_vote(
            "b",
            "Sure!\n```json\n{\"intent\": \"create_reminder\", \"confidence\": 0.7}\n```",
        )
        .unwrap();
        assert_eq!(vote.intent, Intent::CreateReminder);
        assert_eq!(vote.backend, "b");
    }

    #[test]
    fn parse_clamps_and_defaults_confidence() {
        let vote = parse_vote("a", r#"{"intent": "list_events", "confidence": 3.0}"#).unwrap();
        assert_eq!(vote.confidence, 1.0);
        let vote = parse_vote("a", r#"{"intent": "list_events"}"#).unwrap();
        assert_eq!(vote.confidence, DEFAULT_VOTE_CONFIDENCE);
    }

    #[test]
    fn parse_rejects_unknown_label() {
        let err = parse_vote("a", r#"{"intent": "book_flight", "confidence": 0.9}"#).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidResponse { .. }));
        assert_eq!(err.backend(), "a");
    }

    #[tokio::test]
    async fn llm_classifier_produces_vote() {
        let classifier = LlmClassifier::new(
            "claude",
            Arc::new(MockClassifyLlm {
                response: Ok(r#"{"intent": "create_task", "confidence": 0.8}"#.into()),
            }),
        );
        let (prompt, msg) = prompt_for("add buy milk to my list");
        let vote = classifier.classify(&prompt, &msg).await.unwrap();
        assert_eq!(vote.backend, "claude");
        assert_eq!(vote.intent, Intent::CreateTask);
    }

    #[tokio::test]
    async fn llm_classifier_wraps_provider_error() {
        let classifier = LlmClassifier::new("gpt", Arc::new(MockClassifyLlm { response: Err(()) }));
        let (prompt, msg) = prompt_for("hello");
        let err = classifier.classify(&prompt, &msg).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Backend { .. }));
        assert_eq!(err.backend(), "gpt");
    }
}
