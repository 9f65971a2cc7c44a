use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::current_user;
use crate::middleware::body::ApiJson;
use crate::middleware::session::Session;
use crate::service::goals::{GoalRequest, build_study_plan, parse_exam_date};
use crate::{NexusError, router::NexusState};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GoalBody {
    pub target_school: Option<String>,
    pub exam_date: Option<String>,
    pub current_level: Option<String>,
    pub target_subjects: Option<Vec<String>>,
}

impl GoalBody {
    fn into_request(self) -> Result<GoalRequest, NexusError> {
        let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
        let subjects: Vec<String> = self
            .target_subjects
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let (Some(target_school), Some(exam_date), Some(current_level)) = (
            non_empty(self.target_school),
            non_empty(self.exam_date),
            non_empty(self.current_level),
        ) else {
            return Err(NexusError::bad_request("Missing required fields"));
        };
        if subjects.is_empty() {
            return Err(NexusError::bad_request("Missing required fields"));
        }
        let exam_date = parse_exam_date(&exam_date)
            .ok_or_else(|| NexusError::bad_request("examDate must be a date (YYYY-MM-DD)"))?;
        Ok(GoalRequest {
            target_school,
            exam_date,
            current_level,
            target_subjects: subjects,
        })
    }
}

/// POST /api/goal-planner -> save the exam target and its study plan.
pub async fn save(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<GoalBody>,
) -> Result<Json<Value>, NexusError> {
    let user = current_user(&state, session).await?;
    let request = body.into_request()?;
    let plan = build_study_plan(&request, Utc::now());
    let goal = state.storage.upsert_goal(user.id, &request, &plan).await?;
    info!(
        user_id = user.id,
        goal_id = goal.id,
        weeks = plan.total_weeks,
        "goal saved"
    );
    Ok(Json(json!({
        "success": true,
        "goal": goal,
        "studyPlan": plan,
    })))
}

/// GET /api/goal-planner -> the saved goal, or `null`.
pub async fn current(
    State(state): State<NexusState>,
    session: Session,
) -> Result<Json<Value>, NexusError> {
    let goal = state.storage.goal_for(session.user_id).await?;
    Ok(Json(json!({ "goal": goal })))
}
