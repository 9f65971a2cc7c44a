use chrono::Utc;
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tracing::info;
use url::Url;

use crate::error::{NexusError, UpstreamError};

/// Claims returned by LINE's id-token verify endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct LineIdToken {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

impl LineIdToken {
    /// Audience must be our channel and the token must not be expired.
    pub fn validate(&self, channel_id: &str, now: i64) -> Result<(), NexusError> {
        if !bool::from(self.aud.as_bytes().ct_eq(channel_id.as_bytes())) {
            return Err(NexusError::LineVerification("audience mismatch".to_string()));
        }
        if self.exp < now {
            return Err(NexusError::LineVerification("token expired".to_string()));
        }
        Ok(())
    }
}

/// Stateless LINE Login endpoints.
pub struct LineApi;

impl LineApi {
    /// Verify an id token with LINE and check its claims.
    pub async fn verify_id_token(
        client: &reqwest::Client,
        verify_url: &Url,
        channel_id: &str,
        id_token: &str,
    ) -> Result<LineIdToken, NexusError> {
        let resp = client
            .post(verify_url.clone())
            .form(&[("id_token", id_token), ("client_id", channel_id)])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            let err = UpstreamError::from_body(status, &body);
            return Err(NexusError::LineVerification(format!(
                "{} {}",
                err.status, err.message
            )));
        }

        let token: LineIdToken = serde_json::from_slice(&body)?;
        token.validate(channel_id, Utc::now().timestamp())?;
        info!(sub = %token.sub, "LINE id token verified");
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(aud: &str, exp: i64) -> LineIdToken {
        LineIdToken {
            iss: "https://access.line.me".to_string(),
            sub: "U1234".to_string(),
            aud: aud.to_string(),
            exp,
            iat: 0,
            name: Some("Hanako".to_string()),
            picture: None,
        }
    }

    #[test]
    fn rejects_foreign_audience() {
        let err = token("999", 2_000).validate("123", 1_000).unwrap_err();
        assert!(matches!(err, NexusError::LineVerification(_)));
    }

    #[test]
    fn rejects_expired_token() {
        assert!(token("123", 999).validate("123", 1_000).is_err());
        assert!(token("123", 1_000).validate("123", 1_000).is_ok());
    }
}
