use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use cal_assist::classify::{ClassifierBackend, LlmClassifier};
use cal_assist::config::{ModelSpec, PipelineConfig};
use cal_assist::extract::LlmExtractor;
use cal_assist::llm::{LlmProvider, create_provider};
use cal_assist::pipeline::{InboundMessage, PipelineDeps, build_standard_pipeline};
use cal_assist::profile::InMemoryProfileStore;
use cal_assist::respond::render_reply;

fn provider_for(spec: &ModelSpec) -> anyhow::Result<Arc<dyn LlmProvider>> {
    let api_key = PipelineConfig::api_key(spec, |key| std::env::var(key).ok())?;
    let llm = create_provider(&spec.llm_config(api_key))
        .with_context(|| format!("creating provider for {}", spec.id()))?;
    Ok(llm)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PipelineConfig::from_env().context("reading CAL_ASSIST_* configuration")?;

    eprintln!("📅 Cal Assist v{}", env!("CARGO_PKG_VERSION"));

    // ── Classifier ensemble ─────────────────────────────────────────────
    let mut classifiers: Vec<Arc<dyn ClassifierBackend>> = Vec::new();
    for spec in &config.classifiers {
        let llm = provider_for(spec)?;
        classifiers.push(Arc::new(
            LlmClassifier::new(spec.id(), llm).with_temperature(config.classifier_temperature),
        ));
    }
    eprintln!(
        "   Classifiers: {}",
        config
            .classifiers
            .iter()
            .map(ModelSpec::id)
            .collect::<Vec<_>>()
            .join(", ")
    );

    // ── Extractor ───────────────────────────────────────────────────────
    let extractor = match &config.extractor {
        Some(spec) => {
            eprintln!("   Extractor: {}", spec.id());
            Some(
                LlmExtractor::new(provider_for(spec)?)
                    .with_temperature(config.extractor_temperature)
                    .with_max_tokens(config.extractor_max_tokens),
            )
        }
        None => {
            eprintln!("   Extractor: rules only");
            None
        }
    };

    let profiles = Arc::new(InMemoryProfileStore::new());
    let pipeline = build_standard_pipeline(PipelineDeps {
        classifiers,
        extractor,
        profiles: profiles.clone(),
        classify_timeout: config.classify_timeout,
        extract_timeout: config.extract_timeout,
    })?;

    eprintln!("   Timezone: {}", config.default_timezone);
    eprintln!("   Type a message and press Enter. /metrics, /reset-metrics, /quit.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        match line {
            "" => {}
            "/quit" | "/exit" => break,
            "/metrics" => {
                let snapshot = pipeline.metrics().snapshot().await;
                println!("\n{}\n", serde_json::to_string_pretty(&snapshot)?);
            }
            "/reset-metrics" => {
                pipeline.reset_metrics().await;
                println!("\nMetrics reset.\n");
            }
            text => {
                let message =
                    InboundMessage::new("local-user", text).with_timezone(&config.default_timezone);
                let result = pipeline.run(message).await;
                for warning in &result.warnings {
                    tracing::debug!(run_id = %result.run_id, warning = %warning, "Run warning");
                }
                if result.success
                    && !result.needs_clarification
                    && result.intent.is_some_and(|i| i.is_create())
                {
                    profiles.record("local-user", &result.entities).await;
                }
                println!("\n{}\n", render_reply(&result));
            }
        }
        eprint!("> ");
    }

    Ok(())
}
