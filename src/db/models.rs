use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::service::goals::StudyPlan;
use crate::service::usage::Plan;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbUser {
    pub id: i64,
    pub line_user_id: String,
    pub display_name: Option<String>,
    pub plan: Plan,
    pub paid_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for `learning_history`.
#[derive(Debug, Clone)]
pub struct NewHistoryEntry {
    pub user_id: i64,
    pub subject: String,
    pub topic: Option<String>,
    pub score: Option<i64>,
    pub max_score: Option<i64>,
    pub weak_areas: Option<Value>,
    pub quiz_type: String,
    pub difficulty: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DbHistoryEntry {
    pub id: i64,
    pub subject: String,
    pub topic: Option<String>,
    pub score: Option<i64>,
    pub completed_at: DateTime<Utc>,
    pub weak_areas: Option<Value>,
}

/// Row of `goals`; serialized with the column names.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbGoal {
    pub id: i64,
    pub user_id: i64,
    pub target_school: String,
    pub exam_date: NaiveDate,
    pub current_level: String,
    pub target_subjects: Vec<String>,
    pub study_plan: StudyPlan,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
