use super::LlmClient;
use crate::config::FakeProviderConfig;
use crate::model::LlmResponse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FakeRule {
    pub contains: String,
    pub respond: String,
}

/// Offline provider: the first rule whose needle occurs in the prompt answers,
/// otherwise the default response. Safe to call concurrently.
pub struct FakeClient {
    rules: Vec<FakeRule>,
    default_response: String,
    failure: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn new(default_response: impl Into<String>) -> Self {
        Self {
            rules: Vec::new(),
            default_response: default_response.into(),
            failure: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn from_config(cfg: &FakeProviderConfig) -> Self {
        let mut client = Self::new(cfg.default_response.clone());
        client.rules = cfg.rules.clone();
        client
    }

    pub fn with_rule(mut self, contains: impl Into<String>, respond: impl Into<String>) -> Self {
        self.rules.push(FakeRule {
            contains: contains.into(),
            respond: respond.into(),
        });
        self
    }

    /// Every call fails, as an unreachable service would.
    pub fn failing(message: impl Into<String>) -> Self {
        let mut client = Self::new("");
        client.failure = Some(message.into());
        client
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, prompt: &str) -> anyhow::Result<LlmResponse> {
        if let Ok(mut seen) = self.prompts.lock() {
            seen.push(prompt.to_string());
        }
        if let Some(msg) = &self.failure {
            anyhow::bail!("fake provider failure: {}", msg);
        }

        let text = self
            .rules
            .iter()
            .find(|r| prompt.contains(&r.contains))
            .map(|r| r.respond.clone())
            .unwrap_or_else(|| self.default_response.clone());

        Ok(LlmResponse {
            text,
            provider: "fake".to_string(),
            model: "fake".to_string(),
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}
