use axum::{
    Json,
    extract::State,
    response::IntoResponse,
};
use axum_extra::extract::cookie::PrivateCookieJar;
use serde::Deserialize;
use serde_json::json;
use subtle::ConstantTimeEq;
use time::Duration;
use tracing::info;

use crate::api::line_api::LineApi;
use crate::middleware::body::{ApiJson, ApiQuery};
use crate::middleware::session::{end_session, start_session};
use crate::service::usage::Plan;
use crate::{NexusError, router::NexusState};

const DEV_LINE_USER_ID: &str = "dev-user";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineLoginBody {
    #[serde(default)]
    pub id_token: Option<String>,
}

/// POST /api/auth/line -> verify a LIFF id token and open a session.
pub async fn line_login(
    State(state): State<NexusState>,
    jar: PrivateCookieJar,
    ApiJson(body): ApiJson<LineLoginBody>,
) -> Result<impl IntoResponse, NexusError> {
    let id_token = body
        .id_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| NexusError::bad_request("ID token is required"))?;

    let line = &state.config.line;
    let profile =
        LineApi::verify_id_token(&state.client, &line.verify_url, &line.channel_id, &id_token)
            .await?;

    let user = state
        .storage
        .upsert_line_user(&profile.sub, profile.name.as_deref().unwrap_or_default())
        .await?;
    let jar = start_session(jar, user.id, state.session_ttl(), state.secure_cookies())?;
    info!(user_id = user.id, "LINE login");

    Ok((
        jar,
        Json(json!({
            "ok": true,
            "user": {
                "id": user.id,
                "name": user.display_name,
                "picture": profile.picture,
            }
        })),
    ))
}

/// POST /api/auth/logout
pub async fn logout(jar: PrivateCookieJar) -> impl IntoResponse {
    (end_session(jar), Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct DevLoginQuery {
    pub plan: Option<String>,
    pub key: Option<String>,
}

/// GET /api/dev/login?plan=free|plus -> log in as the shared dev account.
pub async fn dev_login(
    State(state): State<NexusState>,
    ApiQuery(query): ApiQuery<DevLoginQuery>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, NexusError> {
    ensure_dev_enabled(&state, query.key.as_deref())?;

    let plan: Plan = query
        .plan
        .as_deref()
        .unwrap_or("free")
        .parse()
        .map_err(|_| NexusError::bad_request("Invalid plan"))?;

    let display_name = format!("Dev User ({})", plan.as_str().to_uppercase());
    let user = state
        .storage
        .upsert_line_user(DEV_LINE_USER_ID, &display_name)
        .await?;
    state.storage.set_plan(user.id, plan, None).await?;

    let jar = start_session(jar, user.id, Duration::hours(24), state.secure_cookies())?;
    info!(user_id = user.id, %plan, "dev login");

    Ok((
        jar,
        Json(json!({
            "success": true,
            "user": { "id": user.id, "plan": plan, "displayName": display_name },
            "message": format!("Development login successful as {} user", plan.as_str().to_uppercase()),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct DevLogoutQuery {
    pub key: Option<String>,
}

/// GET /api/dev/logout
pub async fn dev_logout(
    State(state): State<NexusState>,
    ApiQuery(query): ApiQuery<DevLogoutQuery>,
    jar: PrivateCookieJar,
) -> Result<impl IntoResponse, NexusError> {
    ensure_dev_enabled(&state, query.key.as_deref())?;
    Ok((
        end_session(jar),
        Json(json!({ "success": true, "message": "Development logout successful" })),
    ))
}

/// Dev routes do not exist unless bypass is on; a configured key must also match.
fn ensure_dev_enabled(state: &NexusState, key: Option<&str>) -> Result<(), NexusError> {
    if !state.config.dev_bypass {
        return Err(NexusError::NotFound);
    }
    if let Some(expected) = state.config.dev_key.as_deref().filter(|k| !k.is_empty()) {
        let given = key.unwrap_or_default();
        if !bool::from(given.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(NexusError::NotFound);
        }
    }
    Ok(())
}
