use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::notation::MathNormalizer;

/// What the student asked to generate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MaterialRequest {
    pub subject: String,
    pub grade: String,
    pub unit: String,
    pub difficulty: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Problem {
    pub number: u32,
    pub question: String,
    pub answer: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GeneratedMaterial {
    pub title: String,
    pub content: String,
    pub difficulty: String,
    pub problems: Vec<Problem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Question,
    Answer,
    Explanation,
}

/// `問題1:`, `**解答2：**`, `__解説3:__`, `## 問題4:` ...
static SECTION_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[#*_\s]*(問題|解答|解説)\s*([0-9]+)\s*[:：]\s*[*_]*\s*(.*)$")
        .expect("static regex must compile")
});

static MARKDOWN_HEADING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*#{1,6}[ \t]+").expect("static regex must compile"));

/// `**bold**` and `__bold__` spans. Runs of three or more `*` are variable
/// placeholders and never open a span.
static MARKDOWN_EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^*_])(?:\*\*([^*\n]+)\*\*|__([^_\n]+)__)")
        .expect("static regex must compile")
});

/// Drop heading markers and bold emphasis so they are not read as operators.
fn strip_markdown(raw: &str) -> String {
    let without_headings = MARKDOWN_HEADING.replace_all(raw, "");
    MARKDOWN_EMPHASIS
        .replace_all(&without_headings, "$1$2$3")
        .into_owned()
}

/// Split model output in the `問題N:/解答N:/解説N:` layout into problems.
///
/// Raw text is split first because normalization collapses newlines. Text
/// before the first header is ignored. Numbers without a question are dropped.
pub fn parse_problems(raw: &str, normalizer: &MathNormalizer) -> Vec<Problem> {
    let mut problems: Vec<(u32, [String; 3])> = Vec::new();
    let mut current: Option<(usize, Section)> = None;

    for line in raw.lines() {
        if let Some(caps) = SECTION_HEADER.captures(line) {
            let section = match &caps[1] {
                "問題" => Section::Question,
                "解答" => Section::Answer,
                _ => Section::Explanation,
            };
            let Ok(number) = caps[2].parse::<u32>() else {
                current = None;
                continue;
            };
            let idx = match problems.iter().position(|(n, _)| *n == number) {
                Some(idx) => idx,
                None => {
                    problems.push((number, Default::default()));
                    problems.len() - 1
                }
            };
            append(&mut problems[idx].1[section as usize], &caps[3]);
            current = Some((idx, section));
        } else if let Some((idx, section)) = current {
            append(&mut problems[idx].1[section as usize], line);
        }
    }

    problems
        .into_iter()
        .filter(|(_, [q, _, _])| !q.trim().is_empty())
        .map(|(number, [q, a, e])| Problem {
            number,
            question: normalizer.normalize_generated(&q),
            answer: normalizer.normalize_generated(&a),
            explanation: normalizer.normalize_generated(&e),
        })
        .collect()
}

fn append(buf: &mut String, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

/// Build the job result from raw model output.
pub fn build_material(
    req: &MaterialRequest,
    raw: &str,
    normalizer: &MathNormalizer,
) -> GeneratedMaterial {
    GeneratedMaterial {
        title: format!("{}レベル: {} {}", req.difficulty, req.subject, req.unit),
        content: normalizer.normalize_generated(&strip_markdown(raw)),
        difficulty: req.difficulty.clone(),
        problems: parse_problems(raw, normalizer),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RAW: &str = "以下が教材です。\n\n\
**問題1:**\n\
×××^2 - 5××× + 6 = 0 を解きなさい。\n\n\
解答1:\n\
x=2, x=3\n\n\
解説1:\n\
(x-2)(x-3)=0 と因数分解できます。\n\
よって x=2, 3\n\n\
問題2：2*x+4=10\n\
解答2: x=3\n";

    #[test]
    fn splits_sections_and_normalizes_fields() {
        let problems = parse_problems(RAW, &MathNormalizer::default());
        assert_eq!(problems.len(), 2);

        let p1 = &problems[0];
        assert_eq!(p1.number, 1);
        assert_eq!(p1.question, "x² − 5x ＋ 6 = 0 を解きなさい。");
        assert_eq!(p1.answer, "x = 2, x = 3");
        assert_eq!(p1.explanation, "x − 2x − 3 = 0 と因数分解できます。 よって x = 2, 3");

        let p2 = &problems[1];
        assert_eq!(p2.question, "2 × x ＋ 4 = 10");
        assert_eq!(p2.answer, "x = 3");
        assert_eq!(p2.explanation, "");
    }

    #[test]
    fn output_without_headers_has_no_problems() {
        assert!(parse_problems("ただの文章です。", &MathNormalizer::default()).is_empty());
    }

    #[test]
    fn material_title_and_content() {
        let req = MaterialRequest {
            subject: "数学".to_string(),
            grade: "中学3年".to_string(),
            unit: "二次方程式".to_string(),
            difficulty: "基礎".to_string(),
        };
        let m = build_material(&req, "問題1: x^2=4", &MathNormalizer::default());
        assert_eq!(m.title, "基礎レベル: 数学 二次方程式");
        assert_eq!(m.content, "問題1: x² = 4");
        assert_eq!(m.problems.len(), 1);
    }

    #[test]
    fn markdown_is_not_read_as_operators() {
        let req = MaterialRequest {
            subject: "数学".to_string(),
            grade: "中学3年".to_string(),
            unit: "二次方程式".to_string(),
            difficulty: "標準".to_string(),
        };
        let raw = "## 練習問題\n**問題1:** x^2=4\n__解答1:__ x=2, x=-2";
        let m = build_material(&req, raw, &MathNormalizer::default());
        assert!(!m.content.contains('×'), "{}", m.content);
        assert!(!m.content.contains('#'), "{}", m.content);
        assert!(m.content.contains("問題1: x² = 4"), "{}", m.content);
        assert_eq!(m.problems[0].answer, "x = 2, x = −2");
    }

    #[test]
    fn placeholder_runs_survive_markdown_stripping() {
        assert_eq!(strip_markdown("***-1 と **太字**"), "***-1 と 太字");
        assert_eq!(strip_markdown("# 見出し\n本文"), "見出し\n本文");
    }
}
