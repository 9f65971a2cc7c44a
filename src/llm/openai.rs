use backon::ExponentialBuilder;
use futures::FutureExt;
use futures::future::BoxFuture;
use url::Url;

use super::{AiProvider, CompletionRequest};
use crate::api::upstream::{UpstreamApi, UpstreamAuth, default_retry_policy};
use crate::error::NexusError;
use crate::types::openai::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ContentPart, ImageUrl,
    MessageContent,
};

/// OpenAI chat completions, or any API that speaks the same shape.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: Url,
    retry_policy: ExponentialBuilder,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, api_key: String, model: String, base_url: Url) -> Self {
        Self {
            client,
            api_key,
            model,
            base_url,
            retry_policy: default_retry_policy(),
        }
    }

    fn completions_url(&self) -> Result<Url, NexusError> {
        let raw = format!(
            "{}/v1/chat/completions",
            self.base_url.as_str().trim_end_matches('/')
        );
        Ok(Url::parse(&raw)?)
    }

    fn build_body(&self, req: &CompletionRequest) -> ChatCompletionRequest {
        let user_content = match req.image.as_ref() {
            Some(img) => MessageContent::Parts(vec![
                ContentPart::Text {
                    text: req.user.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: img.data_url(),
                    },
                },
            ]),
            None => MessageContent::Text(req.user.clone()),
        };
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: MessageContent::Text(req.system.clone()),
                },
                ChatMessage {
                    role: "user",
                    content: user_content,
                },
            ],
            max_tokens: req.max_tokens,
            temperature: req.temperature,
        }
    }
}

impl AiProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn complete<'a>(
        &'a self,
        req: &'a CompletionRequest,
    ) -> BoxFuture<'a, Result<String, NexusError>> {
        async move {
            let url = self.completions_url()?;
            let body = self.build_body(req);
            let resp = UpstreamApi::post_json(
                &self.client,
                &url,
                UpstreamAuth::Bearer(&self.api_key),
                self.retry_policy.clone(),
                &body,
            )
            .await?;
            let parsed: ChatCompletionResponse = UpstreamApi::read_json(resp).await?;
            Ok(parsed.first_text().unwrap_or_default())
        }
        .boxed()
    }
}
