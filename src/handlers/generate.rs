use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::{charge_quota, current_user, refund_quota};
use crate::llm::prompts::MATH_SUBJECT;
use crate::middleware::body::{ApiJson, ApiQuery};
use crate::middleware::session::Session;
use crate::service::generation_actor::JobSnapshot;
use crate::service::material::MaterialRequest;
use crate::service::usage::{UsageKind, today};
use crate::{NexusError, router::NexusState};

const DEFAULT_DIFFICULTY: &str = "標準";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct StartBody {
    pub subject: Option<String>,
    pub grade: Option<String>,
    pub unit: Option<String>,
    pub difficulty: Option<String>,
}

impl StartBody {
    fn into_request(self) -> Result<MaterialRequest, NexusError> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let unit = non_empty(self.unit).ok_or_else(|| NexusError::bad_request("unit is required"))?;
        Ok(MaterialRequest {
            subject: non_empty(self.subject).unwrap_or_else(|| MATH_SUBJECT.to_string()),
            grade: non_empty(self.grade).unwrap_or_default(),
            unit,
            difficulty: non_empty(self.difficulty).unwrap_or_else(|| DEFAULT_DIFFICULTY.to_string()),
        })
    }
}

/// POST /api/generate/start -> charge one `gen` unit and queue a job.
pub async fn start(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<StartBody>,
) -> Result<Json<Value>, NexusError> {
    let request = body.into_request()?;
    let user = current_user(&state, session).await?;
    let day = today();
    charge_quota(&state, &user, UsageKind::Gen, day).await?;

    let job_id = match state.jobs.submit(user.id, request).await {
        Ok(id) => id,
        Err(e) => {
            refund_quota(&state, &user, UsageKind::Gen, day).await;
            return Err(e);
        }
    };
    info!(user_id = user.id, job = %job_id, "material generation started");
    Ok(Json(json!({
        "jobId": job_id,
        "status": "started",
        "message": "Material generation started",
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub job_id: Option<String>,
}

/// GET /api/generate/status?jobId=
pub async fn status(
    State(state): State<NexusState>,
    session: Session,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<JobSnapshot>, NexusError> {
    let job_id = query
        .job_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| NexusError::bad_request("Job ID is required"))?;
    state
        .jobs
        .status(job_id, session.user_id)
        .await?
        .map(Json)
        .ok_or(NexusError::NotFound)
}
