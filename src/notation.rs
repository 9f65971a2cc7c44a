//! Math-notation normalization for AI-generated study text.
//!
//! Models answer with a mix of LaTeX fragments (`\(`, `\frac{1}{2}`, `\sqrt{x}`)
//! and ASCII operators. Students read full-width/Unicode notation instead, so
//! every model answer shown to them goes through [`normalize_math`], and
//! generated materials through [`normalize_generated`].
//!
//! Stage order matters:
//! 1. `\frac` is rewritten before generic command stripping consumes it.
//! 2. Operators are substituted after LaTeX is gone, so `\frac{a}{b}` never sees `/`.
//! 3. Superscripts are produced last and only from `^` + ASCII digits.
//!
//! Nothing here fails: unmatched markers pass through untouched.

use regex::{Captures, Regex};
use std::borrow::Cow;
use std::sync::LazyLock;

fn static_regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex must compile")
}

static LATEX_INLINE_OPEN: LazyLock<Regex> = LazyLock::new(|| static_regex(r"\\?\\\("));
static LATEX_INLINE_CLOSE: LazyLock<Regex> = LazyLock::new(|| static_regex(r"\\?\\\)"));
static LATEX_FRAC: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\\frac\{([^}]+)\}\{([^}]+)\}"));
static LATEX_COMMAND_ARG: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"\\[a-zA-Z]+\{([^}]*)\}"));
static LATEX_COMMAND_BARE: LazyLock<Regex> = LazyLock::new(|| static_regex(r"\\[a-zA-Z]+"));
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| static_regex(r"\s+"));
static CARET_DIGITS: LazyLock<Regex> = LazyLock::new(|| static_regex(r"\^([0-9]+)"));
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| static_regex(r"×××|xxx|XXX|\*\*\*|\?\?\?"));

const SUPERSCRIPT_DIGITS: [char; 10] = ['⁰', '¹', '²', '³', '⁴', '⁵', '⁶', '⁷', '⁸', '⁹'];

/// Operators that get spacing inferred in generated material.
const SPACED_OPERATORS: [char; 5] = ['+', '-', '*', '/', '='];

/// Configurable normalizer. The default strips parentheses.
#[derive(Debug, Clone, Copy, Default)]
pub struct MathNormalizer {
    keep_parentheses: bool,
}

impl MathNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep `(` and `)` instead of deleting them. Deleting them changes the
    /// meaning of `(a+b)*c`.
    pub fn keep_parentheses(mut self, keep: bool) -> Self {
        self.keep_parentheses = keep;
        self
    }

    /// Normalize a chat/tutoring answer.
    pub fn normalize(&self, input: &str) -> String {
        let text = strip_latex(input);
        let text = self.strip_parentheses(&text);
        let text = collapse_whitespace(&text);
        let text = substitute_operators(&text);
        superscript_exponents(&text).into_owned()
    }

    /// Normalize generated material: placeholder repair and operator spacing
    /// on top of [`MathNormalizer::normalize`].
    pub fn normalize_generated(&self, input: &str) -> String {
        let text = repair_placeholders(input);
        let text = strip_latex(&text);
        let text = self.strip_parentheses(&text);
        let text = space_operators(&text);
        let text = collapse_whitespace(&text);
        let text = substitute_operators(&text);
        superscript_exponents(&text).into_owned()
    }

    fn strip_parentheses<'a>(&self, text: &'a str) -> Cow<'a, str> {
        if self.keep_parentheses || !text.contains(['(', ')']) {
            return Cow::Borrowed(text);
        }
        Cow::Owned(text.chars().filter(|c| !matches!(c, '(' | ')')).collect())
    }
}

/// Normalize with default settings.
pub fn normalize_math(input: &str) -> String {
    MathNormalizer::default().normalize(input)
}

/// Normalize generated material with default settings.
pub fn normalize_generated(input: &str) -> String {
    MathNormalizer::default().normalize_generated(input)
}

fn strip_latex(input: &str) -> String {
    let text = LATEX_INLINE_OPEN.replace_all(input, "");
    let text = LATEX_INLINE_CLOSE.replace_all(&text, "");
    let text = text.replace("\\[", "").replace("\\]", "");
    let text = LATEX_FRAC.replace_all(&text, "${1}÷${2}");
    let text = LATEX_COMMAND_ARG.replace_all(&text, "${1}");
    LATEX_COMMAND_BARE.replace_all(&text, "").into_owned()
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

fn substitute_operators(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '+' => '＋',
            '-' => '−',
            '*' => '×',
            '/' => '÷',
            other => other,
        })
        .collect()
}

fn superscript_exponents(text: &str) -> Cow<'_, str> {
    CARET_DIGITS.replace_all(text, |caps: &Captures| {
        caps[1]
            .chars()
            .map(|d| {
                d.to_digit(10)
                    .map(|n| SUPERSCRIPT_DIGITS[n as usize])
                    .unwrap_or(d)
            })
            .collect::<String>()
    })
}

fn repair_placeholders(text: &str) -> Cow<'_, str> {
    PLACEHOLDER.replace_all(text, "x")
}

fn is_operand(c: char) -> bool {
    c.is_alphanumeric() || c == ')' || SUPERSCRIPT_DIGITS.contains(&c)
}

/// Insert single spaces around binary operators whose neighbours are both operands.
fn space_operators(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);

    for (i, &c) in chars.iter().enumerate() {
        if !SPACED_OPERATORS.contains(&c) {
            out.push(c);
            continue;
        }

        let prev = chars[..i].iter().rev().find(|ch| !ch.is_whitespace());
        let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
        // `=` is always binary; `x=-3` becomes `x = -3`.
        let binary = if c == '=' {
            prev.is_some() && next.is_some()
        } else {
            matches!(prev, Some(&p) if is_operand(p))
                && matches!(next, Some(&n) if is_operand(n) || n == '(')
        };

        if binary {
            let trimmed = out.trim_end().len();
            out.truncate(trimmed);
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frac_becomes_division() {
        assert_eq!(normalize_math("\\frac{1}{2}"), "1÷2");
    }

    #[test]
    fn exponent_and_plus() {
        let out = normalize_math("x^2 + 3");
        assert!(out.contains("x²"));
        assert!(out.contains('＋'));
        assert!(!out.contains('+'));
        assert_eq!(out, "x² ＋ 3");
    }

    #[test]
    fn parentheses_are_dropped_by_default() {
        assert_eq!(normalize_math("(a+b)"), "a＋b");
        assert_eq!(normalize_math("(a+b)*c"), "a＋b×c");
    }

    #[test]
    fn parentheses_can_be_kept() {
        let n = MathNormalizer::new().keep_parentheses(true);
        assert_eq!(n.normalize("(a+b)*c"), "(a＋b)×c");
    }

    #[test]
    fn empty_input() {
        assert_eq!(normalize_math(""), "");
        assert_eq!(normalize_generated(""), "");
    }

    #[test]
    fn latex_delimiters_and_commands() {
        assert_eq!(normalize_math("\\( \\sqrt{16} = 4 \\)"), "16 = 4");
        assert_eq!(normalize_math("\\[x^10\\]"), "x¹⁰");
        assert_eq!(normalize_math("\\\\(a\\\\)"), "a");
        assert_eq!(normalize_math("3 \\times 4"), "3 4");
        assert_eq!(normalize_math("\\frac{x+1}{2}"), "x＋1÷2");
    }

    #[test]
    fn operators_and_whitespace() {
        assert_eq!(normalize_math("  6 / 2 - 1\n\n* 4  "), "6 ÷ 2 − 1 × 4");
    }

    #[test]
    fn non_digit_exponent_is_left_alone() {
        assert_eq!(normalize_math("e^x"), "e^x");
        assert_eq!(normalize_math("2^n+1"), "2^n＋1");
    }

    #[test]
    fn malformed_markers_pass_through() {
        assert_eq!(normalize_math("\\frac{1}"), "1");
        assert_eq!(normalize_math("{a}"), "{a}");
        assert_eq!(normalize_math("x^"), "x^");
    }

    #[test]
    fn single_application_is_deterministic() {
        let input = "\\(x^2 - 4 = (x-2)(x+2)\\)";
        assert_eq!(normalize_math(input), normalize_math(input));
        assert_eq!(normalize_math(input), "x² − 4 = x−2x＋2");
    }

    #[test]
    fn generated_spacing() {
        assert_eq!(normalize_generated("x+5"), "x ＋ 5");
        assert_eq!(normalize_generated("2*x=10"), "2 × x = 10");
        assert_eq!(normalize_generated("x^2+5x+6=0"), "x² ＋ 5x ＋ 6 = 0");
    }

    #[test]
    fn generated_keeps_leading_sign_attached() {
        assert_eq!(normalize_generated("-3+x"), "−3 ＋ x");
        assert_eq!(normalize_generated("x = -3"), "x = −3");
        assert_eq!(normalize_generated("x=-3"), "x = −3");
    }

    #[test]
    fn generated_repairs_placeholders() {
        assert_eq!(
            normalize_generated("×××^2 - 5××× + 6 = 0"),
            "x² − 5x ＋ 6 = 0"
        );
        assert_eq!(normalize_generated("XXX+xxx"), "x ＋ x");
        assert_eq!(normalize_generated("???/2"), "x ÷ 2");
        assert_eq!(normalize_generated("***-1"), "x − 1");
    }
}
