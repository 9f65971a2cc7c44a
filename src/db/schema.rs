//! SQL DDL for initializing the study database.
//! SQLite-first design; timestamps are stored as RFC3339 text.

/// SQLite schema with:
/// - `users`: one row per LINE account, `line_user_id` UNIQUE
/// - `usage_logs`: daily counters, UNIQUE(`user_id`, `date`) for upserts
/// - `learning_history`: answer checks and quiz attempts, `weak_areas` as JSON text
/// - `goals`: one exam target per user with its generated study plan
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    line_user_id TEXT NOT NULL UNIQUE,
    display_name TEXT NULL,
    plan TEXT NOT NULL DEFAULT 'free',
    paid_until TEXT NULL, -- RFC3339
    created_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS usage_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    date TEXT NOT NULL, -- YYYY-MM-DD, Asia/Tokyo
    gen_count INTEGER NOT NULL DEFAULT 0,
    navi_count INTEGER NOT NULL DEFAULT 0,
    UNIQUE(user_id, date)
);

CREATE TABLE IF NOT EXISTS learning_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    subject TEXT NOT NULL,
    topic TEXT NULL,
    score INTEGER NULL,
    max_score INTEGER NULL,
    weak_areas TEXT NULL, -- JSON object
    quiz_type TEXT NOT NULL,
    difficulty TEXT NULL,
    completed_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_learning_history_user_type
    ON learning_history(user_id, quiz_type, completed_at);

CREATE TABLE IF NOT EXISTS goals (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL UNIQUE REFERENCES users(id),
    target_school TEXT NOT NULL,
    exam_date TEXT NOT NULL, -- YYYY-MM-DD
    current_level TEXT NOT NULL,
    target_subjects TEXT NOT NULL, -- JSON array
    study_plan TEXT NOT NULL, -- JSON object
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);
"#;
