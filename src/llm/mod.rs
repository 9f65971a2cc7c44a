//! Chat-completion providers.
//!
//! Handlers only see [`AiProvider`]; which backend answers is decided once
//! at startup by [`build_provider`].

pub mod gemini;
pub mod openai;
pub mod prompts;

use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::info;

use crate::config::LlmConfig;
use crate::error::NexusError;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// Base64 image attached to a prompt.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub mime_type: String,
    pub data_b64: String,
}

impl InlineImage {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data_b64)
    }
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub image: Option<InlineImage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
            image: None,
            max_tokens: 1000,
            temperature: 0.7,
        }
    }

    pub fn with_image(mut self, image: Option<InlineImage>) -> Self {
        self.image = image;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// A chat-completion backend. Returns the raw model text, possibly empty.
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<String, NexusError>>;
}

/// Gemini when its key is set, else OpenAI, else [`NexusError::NoProvider`].
pub fn build_provider(
    cfg: &LlmConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn AiProvider>, NexusError> {
    let configured = |key: &Option<String>| key.as_deref().is_some_and(|k| !k.trim().is_empty());

    let provider: Arc<dyn AiProvider> = if configured(&cfg.gemini_api_key) {
        Arc::new(GeminiProvider::new(
            client,
            cfg.gemini_api_key.clone().unwrap_or_default(),
            cfg.gemini_model.clone(),
            cfg.gemini_base_url.clone(),
        ))
    } else if configured(&cfg.openai_api_key) {
        Arc::new(OpenAiProvider::new(
            client,
            cfg.openai_api_key.clone().unwrap_or_default(),
            cfg.openai_model.clone(),
            cfg.openai_base_url.clone(),
        ))
    } else {
        return Err(NexusError::NoProvider);
    };

    info!(provider = provider.name(), "AI provider selected");
    Ok(provider)
}
