use serde::Serialize;

/// Word-overlap comparison of a student's answer against the expected one.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAnalysis {
    pub score: i64,
    pub feedback: Vec<String>,
    pub correct_parts: Vec<String>,
    pub incorrect_parts: Vec<String>,
}

/// Words this short are not worth flagging as wrong.
const MIN_FLAGGED_LEN: usize = 3;
const FEEDBACK_SAMPLE: usize = 3;

pub fn analyze_answer(extracted: &str, expected: &str) -> AnswerAnalysis {
    let extracted = extracted.trim().to_lowercase();
    let expected = expected.trim().to_lowercase();

    let expected_words: Vec<&str> = expected.split_whitespace().collect();

    let mut correct_parts = Vec::new();
    let mut incorrect_parts = Vec::new();
    for word in extracted.split_whitespace() {
        if expected_words.contains(&word) {
            correct_parts.push(word.to_string());
        } else if word.chars().count() >= MIN_FLAGGED_LEN {
            incorrect_parts.push(word.to_string());
        }
    }

    let ratio = correct_parts.len() as f64 / expected_words.len().max(1) as f64;
    let score = ((ratio * 100.0).round() as i64).min(100);

    let mut feedback = vec![
        match score {
            90.. => "素晴らしい解答です！",
            70..=89 => "良い解答ですが、いくつか改善点があります。",
            50..=69 => "基本的な理解はできていますが、もう少し詳しく書きましょう。",
            _ => "解答を見直して、もう一度挑戦してみましょう。",
        }
        .to_string(),
    ];
    if !incorrect_parts.is_empty() {
        feedback.push(format!("確認が必要な部分: {}", sample(&incorrect_parts)));
    }
    if !correct_parts.is_empty() {
        feedback.push(format!("正しく書けている部分: {}", sample(&correct_parts)));
    }

    AnswerAnalysis {
        score,
        feedback,
        correct_parts,
        incorrect_parts,
    }
}

fn sample(parts: &[String]) -> String {
    parts
        .iter()
        .take(FEEDBACK_SAMPLE)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_answer_scores_full_marks() {
        let a = analyze_answer("X = 3", "x = 3");
        assert_eq!(a.score, 100);
        assert_eq!(a.correct_parts, vec!["x", "=", "3"]);
        assert!(a.incorrect_parts.is_empty());
        assert_eq!(a.feedback[0], "素晴らしい解答です！");
        assert_eq!(a.feedback[1], "正しく書けている部分: x, =, 3");
    }

    #[test]
    fn short_wrong_words_are_not_flagged() {
        let a = analyze_answer("x = 4 because", "x = 3");
        assert_eq!(a.score, 67);
        assert_eq!(a.incorrect_parts, vec!["because"]);
        assert_eq!(
            a.feedback[0],
            "基本的な理解はできていますが、もう少し詳しく書きましょう。"
        );
        assert_eq!(a.feedback[1], "確認が必要な部分: because");
    }

    #[test]
    fn repeated_words_cannot_exceed_full_marks() {
        let a = analyze_answer("yes yes yes", "yes");
        assert_eq!(a.score, 100);
    }

    #[test]
    fn empty_answer_scores_zero() {
        let a = analyze_answer("", "the mitochondria");
        assert_eq!(a.score, 0);
        assert_eq!(a.feedback, vec!["解答を見直して、もう一度挑戦してみましょう。"]);
    }
}
