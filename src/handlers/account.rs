use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{charge_quota, current_user};
use crate::middleware::body::ApiJson;
use crate::middleware::session::Session;
use crate::service::usage::{UsageKind, day_key, today};
use crate::{NexusError, router::NexusState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub id: i64,
    pub display_name: Option<String>,
    pub plan: String,
    pub paid_until: Option<String>,
}

/// GET /api/me
pub async fn me(
    State(state): State<NexusState>,
    session: Session,
) -> Result<Json<MeResponse>, NexusError> {
    let user = current_user(&state, session).await?;
    Ok(Json(MeResponse {
        id: user.id,
        display_name: user.display_name,
        plan: user.plan.to_string(),
        paid_until: user.paid_until.map(|t| t.to_rfc3339()),
    }))
}

#[derive(Debug, Serialize)]
pub struct LimitsResponse {
    pub gen_left: i64,
    pub navi_left: i64,
    pub today: String,
    pub unlimited: bool,
}

/// GET /api/limits -> what is left of today's quota; -1 means unlimited.
pub async fn limits(
    State(state): State<NexusState>,
    session: Session,
) -> Result<Json<LimitsResponse>, NexusError> {
    let user = current_user(&state, session).await?;
    let day = today();
    if user.plan.is_unlimited() {
        return Ok(Json(LimitsResponse {
            gen_left: -1,
            navi_left: -1,
            today: day_key(day),
            unlimited: true,
        }));
    }

    let counts = state.storage.usage_for(user.id, day).await?;
    let limits = state.limits();
    Ok(Json(LimitsResponse {
        gen_left: limits.remaining(UsageKind::Gen, &counts),
        navi_left: limits.remaining(UsageKind::Navi, &counts),
        today: day_key(day),
        unlimited: false,
    }))
}

#[derive(Debug, Deserialize)]
pub struct IncrementBody {
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

/// POST /api/usage/increment `{type: "gen"|"navi"}`
pub async fn increment_usage(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<IncrementBody>,
) -> Result<Json<Value>, NexusError> {
    let kind = match body.kind.as_deref() {
        Some("gen") => UsageKind::Gen,
        Some("navi") => UsageKind::Navi,
        _ => {
            return Err(NexusError::bad_request(
                "Invalid type. Must be \"gen\" or \"navi\"",
            ));
        }
    };
    let user = current_user(&state, session).await?;

    let Some(new_count) = charge_quota(&state, &user, kind, today()).await? else {
        return Ok(Json(json!({ "success": true, "unlimited": true })));
    };
    let max = state.limits().max_for(kind);
    Ok(Json(json!({
        "success": true,
        "new_count": new_count,
        "remaining": (max - new_count).max(0),
    })))
}
