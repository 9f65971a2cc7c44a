//! Prompt text sent to the providers. Students and models work in Japanese.

pub const MATH_SUBJECT: &str = "数学";

pub const CHAT_FALLBACK: &str = "すみません、回答を生成できませんでした。";

const MATH_SYMBOL_RULES: &str = "\n\n数学記号について：\n\
- 加算は「＋」を使用\n\
- 減算は「−」を使用\n\
- 乗算は「×」を使用\n\
- 除算は「÷」を使用\n\
- 累乗は上付き文字を使用（例：x²、a³）\n\
- 平方根は「√」を使用\n\
- 分数は「/」または分数表記を使用\n\
- LaTeX記法（\\(、\\)、\\frac{}{}など）は使用しないでください\n\
- 括弧や特殊記号は最小限に抑えてください\n\n\
文字化けを避けるため、これらの記号を正確に使用してください。";

/// What kind of help the student asked for in chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
    /// Worked answer with explanation.
    Explanation,
    /// Step-by-step method.
    Method,
    /// Hint only.
    Hint,
    Unspecified,
}

impl ResponseType {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "解答解説" => Self::Explanation,
            "解法" => Self::Method,
            "ヒント" => Self::Hint,
            _ => Self::Unspecified,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::Explanation => {
                "問題の解答を示し、なぜその答えになるのかを詳しく解説してください。計算過程も含めて説明してください。"
            }
            Self::Method => {
                "問題を解くための手順や方法を段階的に説明してください。具体的な解き方のコツやポイントも含めてください。"
            }
            Self::Hint => {
                "問題を解くためのヒントを提供してください。答えを直接教えるのではなく、考え方の方向性を示してください。"
            }
            Self::Unspecified => "",
        }
    }
}

pub fn chat_system_prompt(subject: &str, response_type: ResponseType) -> String {
    let mut prompt = format!(
        "あなたは{subject}の学習支援AIです。日本語で回答してください。\n\n{}",
        response_type.instruction()
    );
    if subject == MATH_SUBJECT {
        prompt.push_str(MATH_SYMBOL_RULES);
    }
    prompt
}

/// User turn when the student only sent an image.
pub fn image_only_user_prompt(subject: &str, response_type_raw: &str) -> String {
    format!("この{subject}の問題について{response_type_raw}をお願いします。")
}

const MATERIAL_FORMAT: &str = "
以下の形式で出力してください：

**重要な注意事項**：
- 変数は必ずx, y, a, b等の具体的な文字を使用してください
- 「×××」「xxx」「XXX」などのプレースホルダーは絶対に使用しないでください
- 数式は明確で読みやすく記述してください
- 変数名は一貫して使用してください（例：xを使ったらxで統一）

**演算記号の使用方法**：
- 足し算：+ （例：x + 5）
- 引き算：- （例：x - 3）
- 掛け算：* （例：2*x または 2x）
- 割り算：/ （例：x/2）
- 平方根：√ （例：√16）

**累乗（指数）の記述**：
- x^2, y^3, a^4 のように記述してください
- 例：x^2 + 5x + 6 = 0

**出力形式**：
問題1:
[問題文]

解答1:
[解答]

解説1:
[詳しい解説]

問題2:
[問題文]

解答2:
[解答]

解説2:
[詳しい解説]

問題3:
[問題文]

解答3:
[解答]

解説3:
[詳しい解説]
";

pub fn material_system_prompt(subject: &str, grade: &str, unit: &str, difficulty: &str) -> String {
    format!(
        "あなたは{subject}の教材作成AIです。{grade}の{unit}について、{difficulty}レベルの学習教材を作成してください。\n{MATERIAL_FORMAT}"
    )
}

pub fn material_user_prompt(subject: &str, unit: &str, difficulty: &str) -> String {
    format!("{subject}の{unit}について、{difficulty}レベルの問題を3問作成してください。")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn math_prompt_carries_symbol_rules() {
        let p = chat_system_prompt("数学", ResponseType::Hint);
        assert!(p.starts_with("あなたは数学の学習支援AIです。"));
        assert!(p.contains("ヒントを提供してください"));
        assert!(p.contains("LaTeX記法（\\(、\\)、\\frac{}{}など）"));
    }

    #[test]
    fn other_subjects_skip_symbol_rules() {
        let p = chat_system_prompt("英語", ResponseType::parse("解法"));
        assert!(p.contains("段階的に説明"));
        assert!(!p.contains("数学記号"));
    }

    #[test]
    fn material_prompt_names_the_unit() {
        let p = material_system_prompt("数学", "中学1年", "方程式", "基礎");
        assert!(p.contains("中学1年の方程式について、基礎レベル"));
        assert!(p.contains("解説3:"));
    }
}
