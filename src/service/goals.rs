use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

const WEEK_SECONDS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

const MILESTONES: [(u32, &str); 3] = [(4, "基礎固め完了"), (8, "応用力強化"), (12, "過去問対策")];

/// A student's exam target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoalRequest {
    pub target_school: String,
    pub exam_date: NaiveDate,
    pub current_level: String,
    pub target_subjects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyPlan {
    pub total_weeks: i64,
    pub weekly_schedule: Vec<SubjectSchedule>,
    pub milestones: Vec<Milestone>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectSchedule {
    pub subject: String,
    pub hours_per_week: u32,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    pub week: u32,
    pub description: String,
}

/// `YYYY-MM-DD`, or an RFC3339 timestamp whose date part is used.
pub fn parse_exam_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

pub fn hours_per_week(current_level: &str) -> u32 {
    match current_level {
        "基礎" => 8,
        "標準" => 10,
        _ => 12,
    }
}

/// Whole weeks left until the exam starts (midnight Asia/Tokyo), rounded up.
/// An exam date in the past gives zero.
pub fn weeks_until(exam_date: NaiveDate, now: DateTime<Utc>) -> i64 {
    let exam_start = exam_date.and_time(chrono::NaiveTime::MIN).and_utc() - TimeDelta::hours(9);
    let seconds = (exam_start - now).num_seconds() as f64;
    ((seconds / WEEK_SECONDS).ceil() as i64).max(0)
}

pub fn build_study_plan(req: &GoalRequest, now: DateTime<Utc>) -> StudyPlan {
    let hours = hours_per_week(&req.current_level);
    StudyPlan {
        total_weeks: weeks_until(req.exam_date, now),
        weekly_schedule: req
            .target_subjects
            .iter()
            .map(|subject| SubjectSchedule {
                subject: subject.clone(),
                hours_per_week: hours,
                topics: vec![
                    format!("{subject}の基礎復習"),
                    format!("{subject}の応用問題"),
                    format!("{subject}の過去問演習"),
                ],
            })
            .collect(),
        milestones: MILESTONES
            .iter()
            .map(|(week, description)| Milestone {
                week: *week,
                description: description.to_string(),
            })
            .collect(),
    }
}
