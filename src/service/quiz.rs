use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::service::usage::Plan;

/// `quiz_type` of quiz rows in `learning_history`.
pub const QUIZ_TYPE: &str = "basic_quiz";
/// Feature tag sent with the upgrade prompt for advanced quizzes.
pub const ADVANCED_FEATURE: &str = "quiz-advanced";
pub const MAX_QUESTIONS: u32 = 50;

const OPTION_LABELS: [&str; 4] = ["選択肢A", "選択肢B", "選択肢C", "選択肢D"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizLevel {
    Basic,
    Standard,
    Advanced,
}

impl QuizLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizLevel::Basic => "basic",
            QuizLevel::Standard => "standard",
            QuizLevel::Advanced => "advanced",
        }
    }

    /// Advanced quizzes are a plus feature.
    pub fn is_open_to(&self, plan: Plan) -> bool {
        !matches!(self, QuizLevel::Advanced) || plan == Plan::Plus
    }
}

impl FromStr for QuizLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(QuizLevel::Basic),
            "standard" => Ok(QuizLevel::Standard),
            "advanced" => Ok(QuizLevel::Advanced),
            other => Err(format!("unknown quiz level `{other}`")),
        }
    }
}

impl fmt::Display for QuizLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizQuestion {
    pub id: u32,
    pub question: String,
    pub options: Vec<String>,
    /// Index into `options`.
    pub correct: usize,
    pub explanation: String,
}

/// Build `count` multiple-choice questions. `seed` picks the correct options.
pub fn build_questions(subject: &str, level: QuizLevel, count: u32, seed: u64) -> Vec<QuizQuestion> {
    (1..=count)
        .map(|id| QuizQuestion {
            id,
            question: format!("{subject}の{level}レベル問題 {id}"),
            options: OPTION_LABELS.iter().map(|o| o.to_string()).collect(),
            correct: pick_option(seed, id),
            explanation: format!(
                "この問題の解説です。{subject}の基本的な概念を理解していれば解ける問題です。"
            ),
        })
        .collect()
}

// splitmix64 step over (seed, id)
fn pick_option(seed: u64, id: u32) -> usize {
    let mut z = seed.wrapping_add(u64::from(id).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    (z % OPTION_LABELS.len() as u64) as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Performance {
    Excellent,
    Good,
    NeedsImprovement,
}

impl Performance {
    pub fn from_score(score: i64) -> Self {
        match score {
            s if s >= 80 => Performance::Excellent,
            s if s >= 60 => Performance::Good,
            _ => Performance::NeedsImprovement,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: u32,
    pub question: String,
    pub options: Vec<String>,
    pub user_answer: Option<i64>,
    pub correct_answer: usize,
    pub is_correct: bool,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGrade {
    pub score: i64,
    pub correct_count: usize,
    pub total_questions: usize,
    pub performance: Performance,
    pub results: Vec<QuestionResult>,
}

impl QuizGrade {
    pub fn missed_question_ids(&self) -> Vec<u32> {
        self.results
            .iter()
            .filter(|r| !r.is_correct)
            .map(|r| r.question_id)
            .collect()
    }
}

/// Score `answers` by position against `questions`. Missing or
/// out-of-range answers count as wrong.
pub fn grade(questions: &[QuizQuestion], answers: &[Option<i64>]) -> QuizGrade {
    let results: Vec<QuestionResult> = questions
        .iter()
        .enumerate()
        .map(|(idx, q)| {
            let user_answer = answers.get(idx).copied().flatten();
            QuestionResult {
                question_id: q.id,
                question: q.question.clone(),
                options: q.options.clone(),
                user_answer,
                correct_answer: q.correct,
                is_correct: user_answer.is_some_and(|a| usize::try_from(a) == Ok(q.correct)),
                explanation: q.explanation.clone(),
            }
        })
        .collect();

    let correct_count = results.iter().filter(|r| r.is_correct).count();
    let total_questions = results.len();
    let score = if total_questions == 0 {
        0
    } else {
        (correct_count as f64 / total_questions as f64 * 100.0).round() as i64
    };
    QuizGrade {
        score,
        correct_count,
        total_questions,
        performance: Performance::from_score(score),
        results,
    }
}
