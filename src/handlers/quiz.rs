use axum::{Json, extract::State};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use super::current_user;
use crate::db::models::{DbUser, NewHistoryEntry};
use crate::middleware::body::ApiJson;
use crate::middleware::session::Session;
use crate::service::quiz::{
    ADVANCED_FEATURE, MAX_QUESTIONS, QUIZ_TYPE, QuizGrade, QuizLevel, QuizQuestion,
    build_questions, grade,
};
use crate::{NexusError, router::NexusState};

fn parse_level(raw: &str) -> Result<QuizLevel, NexusError> {
    raw.trim()
        .parse()
        .map_err(|_| NexusError::bad_request("Invalid level"))
}

fn ensure_level_open(user: &DbUser, level: QuizLevel) -> Result<(), NexusError> {
    if level.is_open_to(user.plan) {
        Ok(())
    } else {
        Err(NexusError::PlusRequired {
            feature: ADVANCED_FEATURE,
            level,
            plan: user.plan,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LevelBody {
    pub level: Option<String>,
}

/// POST /api/quiz/levels -> whether the user's plan opens `level`.
pub async fn levels(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<LevelBody>,
) -> Result<Json<Value>, NexusError> {
    let raw = body
        .level
        .filter(|l| !l.trim().is_empty())
        .ok_or_else(|| NexusError::bad_request("Level is required"))?;
    let level = parse_level(&raw)?;
    let user = current_user(&state, session).await?;
    ensure_level_open(&user, level)?;
    Ok(Json(json!({
        "allowed": true,
        "level": level,
        "plan": user.plan,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StartBody {
    pub level: Option<String>,
    pub subject: Option<String>,
    pub question_count: Option<u32>,
}

/// POST /api/quiz/start -> questions plus the history row that will hold the score.
pub async fn start(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<StartBody>,
) -> Result<Json<Value>, NexusError> {
    let (Some(level), Some(subject), Some(count)) = (
        body.level.filter(|l| !l.trim().is_empty()),
        body.subject.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
        body.question_count.filter(|c| *c > 0),
    ) else {
        return Err(NexusError::bad_request("Missing required fields"));
    };
    if count > MAX_QUESTIONS {
        return Err(NexusError::bad_request(format!(
            "questionCount must be at most {MAX_QUESTIONS}"
        )));
    }
    let level = parse_level(&level)?;
    let user = current_user(&state, session).await?;
    ensure_level_open(&user, level)?;

    let seed = (Utc::now().timestamp_subsec_nanos() as u64) ^ (user.id as u64).rotate_left(32);
    let questions = build_questions(&subject, level, count, seed);
    let quiz_id = state
        .storage
        .insert_history(NewHistoryEntry {
            user_id: user.id,
            subject,
            topic: None,
            score: None,
            max_score: Some(i64::from(count)),
            weak_areas: Some(json!({ "questions": questions })),
            quiz_type: QUIZ_TYPE.to_string(),
            difficulty: Some(level.to_string()),
        })
        .await?;
    info!(user_id = user.id, quiz_id, %level, count, "quiz started");

    Ok(Json(json!({
        "success": true,
        "quizId": quiz_id,
        "questions": questions,
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SubmitBody {
    pub quiz_id: Option<i64>,
    pub answers: Option<Vec<Option<i64>>>,
}

/// POST /api/quiz/submit -> grade against the questions stored at start.
pub async fn submit(
    State(state): State<NexusState>,
    session: Session,
    ApiJson(body): ApiJson<SubmitBody>,
) -> Result<Json<QuizGrade>, NexusError> {
    let (Some(quiz_id), Some(answers)) = (body.quiz_id, body.answers) else {
        return Err(NexusError::bad_request("Missing required fields"));
    };

    let entry = state
        .storage
        .history_entry(session.user_id, quiz_id, QUIZ_TYPE)
        .await?
        .ok_or(NexusError::NotFound)?;
    let questions: Vec<QuizQuestion> = entry
        .weak_areas
        .as_ref()
        .and_then(|w| w.get("questions"))
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .ok()
        .flatten()
        .ok_or(NexusError::NotFound)?;

    let graded = grade(&questions, &answers);
    state
        .storage
        .complete_attempt(
            session.user_id,
            quiz_id,
            graded.score,
            &json!({
                "questions": questions,
                "answers": answers,
                "missedQuestionIds": graded.missed_question_ids(),
            }),
        )
        .await?;
    info!(
        user_id = session.user_id,
        quiz_id,
        score = graded.score,
        "quiz submitted"
    );
    Ok(Json(graded))
}
