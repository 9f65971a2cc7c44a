use crate::config::Config;
use crate::error::{NexusError, UpstreamError};
use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// How a provider call authenticates.
#[derive(Debug, Clone, Copy)]
pub enum UpstreamAuth<'a> {
    Bearer(&'a str),
    Header(&'static str, &'a str),
}

pub fn default_retry_policy() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_max_delay(Duration::from_secs(3))
        .with_max_times(3)
        .with_jitter()
}

/// Shared HTTP client for provider and LINE calls.
pub fn build_http_client(cfg: &Config) -> Result<reqwest::Client, NexusError> {
    let mut builder = reqwest::Client::builder()
        .user_agent(concat!("study-nexus/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(90));
    if let Some(proxy_url) = cfg.proxy.as_ref() {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url.as_str())?);
    }
    Ok(builder.build()?)
}

/// Stateless JSON poster used by the LLM providers.
pub struct UpstreamApi;

impl UpstreamApi {
    /// POST `body` as JSON, retrying 5xx responses with `retry_policy`.
    pub async fn post_json<T>(
        client: &reqwest::Client,
        url: &Url,
        auth: UpstreamAuth<'_>,
        retry_policy: ExponentialBuilder,
        body: &T,
    ) -> Result<reqwest::Response, reqwest::Error>
    where
        T: serde::Serialize,
    {
        (|| async {
            let req = client.post(url.clone()).json(body);
            let req = match auth {
                UpstreamAuth::Bearer(token) => req.bearer_auth(token),
                UpstreamAuth::Header(name, value) => req.header(name, value),
            };
            let resp = req.send().await?;
            if resp.status().is_server_error() {
                warn!(status = %resp.status(), host = url.host_str().unwrap_or("-"), "upstream server error (will retry)");
                return resp.error_for_status();
            }
            Ok(resp)
        })
        .retry(retry_policy)
        .await
    }

    /// Decode a success body, or turn a failure status into a [`NexusError`].
    pub async fn read_json<R>(resp: reqwest::Response) -> Result<R, NexusError>
    where
        R: DeserializeOwned,
    {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(NexusError::UpstreamStatus(status));
        }
        if !status.is_success() {
            return Err(NexusError::UpstreamApi(UpstreamError::from_body(
                status, &bytes,
            )));
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}
