use backon::ExponentialBuilder;
use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::debug;
use url::Url;

use super::{AiProvider, CompletionRequest};
use crate::api::upstream::{UpstreamApi, UpstreamAuth, default_retry_policy};
use crate::error::NexusError;
use crate::types::gemini::{Chat, GenerateContentRequest, GeminiResponse, GenerationConfig, Part};

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: Url,
    retry_policy: ExponentialBuilder,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: String, model: String, base_url: Url) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url,
            retry_policy: default_retry_policy(),
        }
    }

    fn generate_url(&self) -> Result<Url, NexusError> {
        let raw = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.as_str().trim_end_matches('/'),
            self.model
        );
        Ok(Url::parse(&raw)?)
    }

    fn build_body(req: &CompletionRequest) -> GenerateContentRequest {
        let mut parts = vec![Part::text(req.user.clone())];
        if let Some(img) = req.image.as_ref() {
            parts.push(Part::inline(img.mime_type.clone(), img.data_b64.clone()));
        }
        GenerateContentRequest {
            system_instruction: Chat {
                role: None,
                parts: vec![Part::text(req.system.clone())],
            },
            contents: vec![Chat {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                max_output_tokens: req.max_tokens,
                temperature: req.temperature,
            },
        }
    }
}

impl AiProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<String, NexusError>> {
        async move {
            let url = self.generate_url()?;
            let body = Self::build_body(req);
            let resp = UpstreamApi::post_json(
                &self.client,
                &url,
                UpstreamAuth::Header("x-goog-api-key", &self.api_key),
                self.retry_policy.clone(),
                &body,
            )
            .await?;
            let parsed: GeminiResponse = UpstreamApi::read_json(resp).await?;
            debug!(
                model = %self.model,
                finish = ?parsed.candidates.first().and_then(|c| c.finishReason.clone()),
                "gemini completion"
            );
            Ok(parsed.first_text().unwrap_or_default())
        }
        .boxed()
    }
}
