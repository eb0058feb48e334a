use crate::config::{ProviderConfig, ProviderKind};
use crate::model::LlmResponse;
use async_trait::async_trait;
use std::sync::Arc;

/// Text completion service. No retries and no caching: each call is independent
/// and may return different text for the same prompt.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
}

pub fn build_client(cfg: &ProviderConfig) -> anyhow::Result<Arc<dyn LlmClient>> {
    let client: Arc<dyn LlmClient> = match cfg.kind {
        ProviderKind::Ollama => Arc::new(ollama::OllamaClient::new(
            cfg.model.clone(),
            cfg.base_url
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_BASE_URL.to_string()),
            cfg.temperature,
            cfg.max_tokens,
        )),
        ProviderKind::Openai => {
            let api_key = std::env::var(&cfg.api_key_env).map_err(|_| {
                anyhow::anyhow!(
                    "provider 'openai' needs an API key in ${}",
                    cfg.api_key_env
                )
            })?;
            Arc::new(openai::OpenAIClient::new(
                cfg.model.clone(),
                api_key,
                cfg.base_url
                    .clone()
                    .unwrap_or_else(|| openai::DEFAULT_BASE_URL.to_string()),
                cfg.temperature,
                cfg.max_tokens,
            ))
        }
        ProviderKind::Fake => Arc::new(fake::FakeClient::from_config(&cfg.fake)),
    };
    tracing::debug!(
        event = "provider.ready",
        provider = client.provider_name(),
        model = %cfg.model
    );
    Ok(client)
}

pub mod fake;
pub mod ollama;
pub mod openai;
