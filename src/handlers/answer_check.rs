use axum::{
    Json,
    extract::State,
};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::current_user;
use crate::db::models::NewHistoryEntry;
use crate::middleware::body::{ApiJson, ApiQuery};
use crate::middleware::session::Session;
use crate::service::answer_check::analyze_answer;
use crate::{NexusError, router::NexusState};

const QUIZ_TYPE: &str = "answer_check";
const DEFAULT_TOPIC: &str = "Answer Check";
const DEFAULT_HISTORY_LIMIT: i64 = 10;
const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckBody {
    pub subject: String,
    pub handwritten_text: String,
    pub expected_text: String,
    pub question_text: Option<String>,
}

/// POST /api/answer-check -> score the student's answer and keep it in history.
pub async fn check(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<CheckBody>,
) -> Result<Json<Value>, NexusError> {
    if body.subject.trim().is_empty()
        || body.handwritten_text.trim().is_empty()
        || body.expected_text.trim().is_empty()
    {
        return Err(NexusError::bad_request("Missing required fields"));
    }
    let user = current_user(&state, session).await?;

    let analysis = analyze_answer(&body.handwritten_text, &body.expected_text);
    let topic = body
        .question_text
        .filter(|q| !q.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_TOPIC.to_string());

    let check_id = state
        .storage
        .insert_history(NewHistoryEntry {
            user_id: user.id,
            subject: body.subject,
            topic: Some(topic),
            score: Some(analysis.score),
            max_score: Some(100),
            weak_areas: Some(json!({
                "incorrectParts": analysis.incorrect_parts,
                "handwrittenText": body.handwritten_text,
                "expectedText": body.expected_text,
            })),
            quiz_type: QUIZ_TYPE.to_string(),
            difficulty: None,
        })
        .await?;
    info!(user_id = user.id, check_id, score = analysis.score, "answer checked");

    Ok(Json(json!({
        "success": true,
        "checkId": check_id,
        "analysis": analysis,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// GET /api/answer-check?limit= -> newest answer checks first.
pub async fn history(
    State(state): State<NexusState>,
    session: Session,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<Json<Value>, NexusError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let history = state
        .storage
        .list_history(session.user_id, QUIZ_TYPE, limit)
        .await?;
    Ok(Json(json!({ "history": history })))
}
