//! Generative prompt endpoints.
//!
//! `Plain` prompts only see what the prompt carries. `Agent` prompts run with
//! access to the user's broader personal-data graph.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{PlatformClient, PlatformError};
use crate::config::GenerationConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Plain,
    Agent,
}

impl PromptMode {
    fn path(self) -> &'static str {
        match self {
            PromptMode::Plain => "/llm/prompt",
            PromptMode::Agent => "/llm/agent/prompt",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl From<&GenerationConfig> for PromptOptions {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            temperature: Some(config.temperature),
            max_tokens: Some(config.max_tokens),
            model: config.model.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PromptResponse {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

/// Prompt in, raw text out.
#[async_trait]
pub trait GenerativeContentPort: Send + Sync {
    async fn prompt(
        &self,
        prompt: &str,
        options: &PromptOptions,
        mode: PromptMode,
    ) -> Result<PromptResponse, PlatformError>;
}

#[derive(Debug, Serialize)]
struct PromptRequest<'a> {
    prompt: &'a str,
    options: &'a PromptOptions,
}

/// HTTP-backed [`GenerativeContentPort`].
pub struct HttpGenerative {
    client: Arc<PlatformClient>,
}

impl HttpGenerative {
    pub fn new(client: Arc<PlatformClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GenerativeContentPort for HttpGenerative {
    async fn prompt(
        &self,
        prompt: &str,
        options: &PromptOptions,
        mode: PromptMode,
    ) -> Result<PromptResponse, PlatformError> {
        let body = PromptRequest { prompt, options };
        let resp: PromptResponse = self.client.post_json(mode.path(), &body).await?;
        if let Some(usage) = &resp.usage {
            log::debug!(
                "llm {:?}: {} prompt + {} completion tokens",
                mode,
                usage.prompt_tokens,
                usage.completion_tokens
            );
        }
        Ok(resp)
    }
}
