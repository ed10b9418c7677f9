pub mod insight;

pub use insight::{InsightAdapter, InsightContext, MetricDigest};

use std::time::Duration;

use async_trait::async_trait;

use crate::config::LlmConfig;
use crate::error::{Error, Result};

/// The narrow capability the insight layer consumes: prompt text in, response
/// text out, plus an availability probe. Callers must check `is_available`
/// before generating and degrade to raw stats when it is false.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn is_available(&self) -> bool;

    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// Backend driving a mixtape Agent (Anthropic or Bedrock) with a hard
/// timeout. Expiry is reported as `InsightUnavailable`, never a crash; the
/// in-flight call is simply abandoned.
pub struct AgentBackend {
    agent: mixtape_core::Agent,
    timeout: Duration,
}

impl AgentBackend {
    pub async fn from_config(config: &LlmConfig) -> Result<Self> {
        let agent = build_agent(&config.provider, &config.model).await?;
        Ok(Self {
            agent,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl LlmBackend for AgentBackend {
    fn is_available(&self) -> bool {
        true
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        match tokio::time::timeout(self.timeout, self.agent.run(prompt)).await {
            Err(_) => Err(Error::InsightUnavailable(format!(
                "LLM call timed out after {}s",
                self.timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(Error::InsightUnavailable(e.to_string())),
            Ok(Ok(response)) => Ok(response.text().trim().to_string()),
        }
    }
}

/// Stand-in when no LLM backend could be built. Reports unavailable; the
/// logging and stats paths work exactly as they would otherwise.
pub struct NullBackend;

#[async_trait]
impl LlmBackend for NullBackend {
    fn is_available(&self) -> bool {
        false
    }

    async fn complete(&self, _prompt: &str) -> Result<String> {
        Err(Error::InsightUnavailable("no LLM backend configured".into()))
    }
}

/// Build the configured backend, falling back to `NullBackend` when the
/// agent cannot be constructed. Insight is advisory: a missing backend must
/// never fail startup.
pub async fn create_backend(config: &LlmConfig) -> Box<dyn LlmBackend> {
    match AgentBackend::from_config(config).await {
        Ok(backend) => Box::new(backend),
        Err(e) => {
            log::warn!("LLM backend unavailable: {e}");
            Box::new(NullBackend)
        }
    }
}

async fn build_agent(provider: &str, model_name: &str) -> Result<mixtape_core::Agent> {
    // Each combination needs its own builder call since the model types are different.
    match (provider, model_name) {
        ("bedrock", "claude-haiku-4-5" | "haiku") => mixtape_core::Agent::builder()
            .bedrock(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::InsightUnavailable(e.to_string())),
        ("bedrock", _) => {
            // Default bedrock model
            mixtape_core::Agent::builder()
                .bedrock(mixtape_core::ClaudeSonnet4_5)
                .build()
                .await
                .map_err(|e| Error::InsightUnavailable(e.to_string()))
        }
        ("anthropic", "claude-haiku-4-5" | "haiku") => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeHaiku4_5)
            .build()
            .await
            .map_err(|e| Error::InsightUnavailable(e.to_string())),
        ("anthropic", _) => mixtape_core::Agent::builder()
            .anthropic_from_env(mixtape_core::ClaudeSonnet4_5)
            .build()
            .await
            .map_err(|e| Error::InsightUnavailable(e.to_string())),
        (other, _) => Err(Error::Config(format!("unknown llm_provider: {other}"))),
    }
}
