use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, Key, PrivateCookieJar, SameSite};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use time::Duration;
use tracing::{debug, warn};

use crate::error::NexusError;
use crate::router::NexusState;

pub const SESSION_COOKIE: &str = "auth_session";

/// Payload of the encrypted session cookie.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionClaims {
    pub uid: i64,
    /// Issued-at, unix seconds.
    pub iat: i64,
}

impl SessionClaims {
    pub fn issue(uid: i64) -> Self {
        Self {
            uid,
            iat: Utc::now().timestamp(),
        }
    }

    pub fn is_expired(&self, ttl: Duration, now: i64) -> bool {
        now.saturating_sub(self.iat) > ttl.whole_seconds()
    }
}

/// Authenticated caller, resolved from the private `auth_session` cookie.
///
/// Any cookie that does not decrypt, or is older than the session TTL, is a 401.
#[derive(Debug, Clone, Copy)]
pub struct Session {
    pub user_id: i64,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    NexusState: FromRef<S>,
{
    type Rejection = NexusError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = NexusState::from_ref(state);
        let jar = PrivateCookieJar::from_headers(&parts.headers, state.cookie_key());

        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            debug!("request without session cookie");
            return Err(NexusError::Unauthenticated);
        };
        let claims: SessionClaims = serde_json::from_str(cookie.value()).map_err(|e| {
            warn!(error = %e, "undecodable session payload");
            NexusError::Unauthenticated
        })?;
        if claims.is_expired(state.session_ttl(), Utc::now().timestamp()) {
            debug!(uid = claims.uid, "session expired");
            return Err(NexusError::Unauthenticated);
        }
        Ok(Self {
            user_id: claims.uid,
        })
    }
}

/// Add a fresh session cookie for `uid` to the jar.
pub fn start_session(
    jar: PrivateCookieJar,
    uid: i64,
    max_age: Duration,
    secure: bool,
) -> Result<PrivateCookieJar, NexusError> {
    let payload = serde_json::to_string(&SessionClaims::issue(uid))?;
    Ok(jar.add(build_cookie(SESSION_COOKIE, payload, max_age, secure)))
}

pub fn end_session(jar: PrivateCookieJar) -> PrivateCookieJar {
    jar.remove(clear_cookie(SESSION_COOKIE))
}

fn build_cookie(name: &str, value: String, max_age: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(max_age)
        .build()
}

fn clear_cookie(name: &str) -> Cookie<'static> {
    Cookie::build(Cookie::new(name.to_string(), ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Derive the cookie key from the configured secret; random when the secret is empty.
pub fn session_key(secret: &str) -> Key {
    if secret.is_empty() {
        warn!("session_secret not set; sessions will not survive a restart");
        return Key::generate();
    }
    let digest = Sha512::digest(secret.as_bytes());
    Key::from(digest.as_slice())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_uses_ttl() {
        let claims = SessionClaims { uid: 1, iat: 1_000 };
        let ttl = Duration::days(1);
        assert!(!claims.is_expired(ttl, 1_000 + 86_400));
        assert!(claims.is_expired(ttl, 1_000 + 86_401));
    }

    #[test]
    fn same_secret_same_key() {
        let a = session_key("correct horse battery staple");
        let b = session_key("correct horse battery staple");
        let c = session_key("another secret");
        assert_eq!(a.master(), b.master());
        assert_ne!(a.master(), c.master());
    }
}
