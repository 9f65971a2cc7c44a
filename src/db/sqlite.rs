use crate::db::models::{DbGoal, DbHistoryEntry, DbUser, NewHistoryEntry};
use crate::db::schema::SQLITE_INIT;
use crate::error::NexusError;
use crate::service::goals::{GoalRequest, StudyPlan};
use crate::service::usage::{Plan, QuotaOutcome, UsageCounts, UsageKind, day_key};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;
use tracing::debug;

pub type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct StudyStorage {
    pool: SqlitePool,
}

impl StudyStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database at `database_url` and apply the schema.
    pub async fn connect(database_url: &str) -> Result<Self, NexusError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        let storage = Self::new(pool);
        storage.init_schema().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), NexusError> {
        // sqlx::query runs a single statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert or refresh a LINE account by its unique `line_user_id`.
    pub async fn upsert_line_user(
        &self,
        line_user_id: &str,
        display_name: &str,
    ) -> Result<DbUser, NexusError> {
        sqlx::query(
            r#"
            INSERT INTO users (line_user_id, display_name, plan, created_at)
            VALUES (?, ?, 'free', ?)
            ON CONFLICT(line_user_id) DO UPDATE SET
                display_name = excluded.display_name
            "#,
        )
        .bind(line_user_id)
        .bind(display_name)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            r#"SELECT id, line_user_id, display_name, plan, paid_until, created_at
               FROM users WHERE line_user_id = ?"#,
        )
        .bind(line_user_id)
        .fetch_one(&self.pool)
        .await?;
        Self::row_to_user(row)
    }

    pub async fn get_user(&self, id: i64) -> Result<Option<DbUser>, NexusError> {
        let row = sqlx::query(
            r#"SELECT id, line_user_id, display_name, plan, paid_until, created_at
               FROM users WHERE id = ?"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_user).transpose()
    }

    pub async fn set_plan(
        &self,
        id: i64,
        plan: Plan,
        paid_until: Option<DateTime<Utc>>,
    ) -> Result<(), NexusError> {
        sqlx::query("UPDATE users SET plan = ?, paid_until = ? WHERE id = ?")
            .bind(plan.as_str())
            .bind(paid_until.map(|t| t.to_rfc3339()))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Counters for `day`; zero when no row exists yet.
    pub async fn usage_for(&self, user_id: i64, day: NaiveDate) -> Result<UsageCounts, NexusError> {
        let rec: Option<(i64, i64)> = sqlx::query_as(
            "SELECT gen_count, navi_count FROM usage_logs WHERE user_id = ? AND date = ?",
        )
        .bind(user_id)
        .bind(day_key(day))
        .fetch_optional(&self.pool)
        .await?;
        Ok(rec
            .map(|(gen_count, navi_count)| UsageCounts {
                gen_count,
                navi_count,
            })
            .unwrap_or_default())
    }

    /// Add one to the counter only while it is below `max`.
    ///
    /// The check and the increment are a single conditional upsert, so two
    /// concurrent requests cannot both take the last unit.
    pub async fn consume_quota(
        &self,
        user_id: i64,
        day: NaiveDate,
        kind: UsageKind,
        max: i64,
    ) -> Result<QuotaOutcome, NexusError> {
        if max <= 0 {
            let current = self.usage_for(user_id, day).await?.get(kind);
            return Ok(QuotaOutcome::Exceeded { current });
        }

        let col = kind.column();
        let sql = format!(
            "INSERT INTO usage_logs (user_id, date, {col}) VALUES (?, ?, 1)
             ON CONFLICT(user_id, date) DO UPDATE SET {col} = usage_logs.{col} + 1
             WHERE usage_logs.{col} < ?"
        );
        let mut tx = self.pool.begin().await?;
        let res = sqlx::query(&sql)
            .bind(user_id)
            .bind(day_key(day))
            .bind(max)
            .execute(&mut *tx)
            .await?;
        let count = Self::read_counter(&mut tx, user_id, day, kind).await?;
        tx.commit().await?;

        debug!(user_id, %kind, count, max, applied = res.rows_affected(), "quota check");
        if res.rows_affected() == 0 {
            Ok(QuotaOutcome::Exceeded { current: count })
        } else {
            Ok(QuotaOutcome::Consumed { new_count: count })
        }
    }

    /// Give back one unit taken by `consume_quota`. Never goes below zero.
    /// Returns the counter after the refund.
    pub async fn release_quota(
        &self,
        user_id: i64,
        day: NaiveDate,
        kind: UsageKind,
    ) -> Result<i64, NexusError> {
        let col = kind.column();
        let sql = format!(
            "UPDATE usage_logs SET {col} = {col} - 1
             WHERE user_id = ? AND date = ? AND {col} > 0"
        );
        let mut tx = self.pool.begin().await?;
        sqlx::query(&sql)
            .bind(user_id)
            .bind(day_key(day))
            .execute(&mut *tx)
            .await?;
        let count = Self::read_counter(&mut tx, user_id, day, kind).await?;
        tx.commit().await?;
        debug!(user_id, %kind, count, "quota released");
        Ok(count)
    }

    async fn read_counter(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        user_id: i64,
        day: NaiveDate,
        kind: UsageKind,
    ) -> Result<i64, NexusError> {
        let sql = format!(
            "SELECT {} FROM usage_logs WHERE user_id = ? AND date = ?",
            kind.column()
        );
        let rec: Option<(i64,)> = sqlx::query_as(&sql)
            .bind(user_id)
            .bind(day_key(day))
            .fetch_optional(&mut **tx)
            .await?;
        Ok(rec.map(|r| r.0).unwrap_or(0))
    }

    /// Append a learning history row. Returns its id.
    pub async fn insert_history(&self, entry: NewHistoryEntry) -> Result<i64, NexusError> {
        let weak_areas = entry.weak_areas.as_ref().map(to_json_text).transpose()?;
        let res = sqlx::query(
            r#"
            INSERT INTO learning_history (
                user_id, subject, topic, score, max_score,
                weak_areas, quiz_type, difficulty, completed_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.user_id)
        .bind(entry.subject)
        .bind(entry.topic)
        .bind(entry.score)
        .bind(entry.max_score)
        .bind(weak_areas)
        .bind(entry.quiz_type)
        .bind(entry.difficulty)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(res.last_insert_rowid())
    }

    /// Most recent entries of one `quiz_type` for a user, newest first.
    pub async fn list_history(
        &self,
        user_id: i64,
        quiz_type: &str,
        limit: i64,
    ) -> Result<Vec<DbHistoryEntry>, NexusError> {
        let rows = sqlx::query(
            r#"SELECT id, subject, topic, score, completed_at, weak_areas
               FROM learning_history
               WHERE user_id = ? AND quiz_type = ?
               ORDER BY completed_at DESC, id DESC
               LIMIT ?"#,
        )
        .bind(user_id)
        .bind(quiz_type)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_history).collect()
    }

    /// One history row of `quiz_type`, only if it belongs to `user_id`.
    pub async fn history_entry(
        &self,
        user_id: i64,
        id: i64,
        quiz_type: &str,
    ) -> Result<Option<DbHistoryEntry>, NexusError> {
        let row = sqlx::query(
            r#"SELECT id, subject, topic, score, completed_at, weak_areas
               FROM learning_history
               WHERE id = ? AND user_id = ? AND quiz_type = ?"#,
        )
        .bind(id)
        .bind(user_id)
        .bind(quiz_type)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_history).transpose()
    }

    /// Store the score of a finished attempt. Returns false when the row is
    /// missing or owned by someone else.
    pub async fn complete_attempt(
        &self,
        user_id: i64,
        id: i64,
        score: i64,
        weak_areas: &Value,
    ) -> Result<bool, NexusError> {
        let res = sqlx::query(
            r#"UPDATE learning_history
               SET score = ?, weak_areas = ?, completed_at = ?
               WHERE id = ? AND user_id = ?"#,
        )
        .bind(score)
        .bind(to_json_text(weak_areas)?)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Insert or replace the user's single goal.
    pub async fn upsert_goal(
        &self,
        user_id: i64,
        goal: &GoalRequest,
        plan: &StudyPlan,
    ) -> Result<DbGoal, NexusError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO goals (
                user_id, target_school, exam_date, current_level,
                target_subjects, study_plan, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                target_school = excluded.target_school,
                exam_date = excluded.exam_date,
                current_level = excluded.current_level,
                target_subjects = excluded.target_subjects,
                study_plan = excluded.study_plan,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(&goal.target_school)
        .bind(day_key(goal.exam_date))
        .bind(&goal.current_level)
        .bind(to_json_text(&goal.target_subjects)?)
        .bind(to_json_text(plan)?)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.goal_for(user_id)
            .await?
            .ok_or(NexusError::DatabaseError(sqlx::Error::RowNotFound))
    }

    pub async fn goal_for(&self, user_id: i64) -> Result<Option<DbGoal>, NexusError> {
        let row = sqlx::query(
            r#"SELECT id, user_id, target_school, exam_date, current_level,
                      target_subjects, study_plan, created_at, updated_at
               FROM goals WHERE user_id = ?"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_goal).transpose()
    }

    fn row_to_user(row: SqliteRow) -> Result<DbUser, NexusError> {
        let id: i64 = row.try_get("id")?;
        let line_user_id: String = row.try_get("line_user_id")?;
        let display_name: Option<String> = row.try_get("display_name")?;
        let plan: String = row.try_get("plan")?;
        let paid_until: Option<String> = row.try_get("paid_until")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(DbUser {
            id,
            line_user_id,
            display_name,
            plan: Plan::from_db(&plan),
            paid_until: paid_until.as_deref().map(parse_rfc3339).transpose()?,
            created_at: parse_rfc3339(&created_at)?,
        })
    }

    fn row_to_history(row: SqliteRow) -> Result<DbHistoryEntry, NexusError> {
        let weak_areas: Option<String> = row.try_get("weak_areas")?;
        let completed_at: String = row.try_get("completed_at")?;
        Ok(DbHistoryEntry {
            id: row.try_get("id")?,
            subject: row.try_get("subject")?,
            topic: row.try_get("topic")?,
            score: row.try_get("score")?,
            completed_at: parse_rfc3339(&completed_at)?,
            weak_areas: weak_areas.as_deref().map(from_json_text).transpose()?,
        })
    }

    fn row_to_goal(row: SqliteRow) -> Result<DbGoal, NexusError> {
        let exam_date: String = row.try_get("exam_date")?;
        let target_subjects: String = row.try_get("target_subjects")?;
        let study_plan: String = row.try_get("study_plan")?;
        let created_at: String = row.try_get("created_at")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(DbGoal {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            target_school: row.try_get("target_school")?,
            exam_date: NaiveDate::parse_from_str(&exam_date, "%Y-%m-%d")
                .map_err(|e| sqlx::Error::Decode(Box::new(e)))?,
            current_level: row.try_get("current_level")?,
            target_subjects: from_json_text(&target_subjects)?,
            study_plan: from_json_text(&study_plan)?,
            created_at: parse_rfc3339(&created_at)?,
            updated_at: parse_rfc3339(&updated_at)?,
        })
    }
}

fn to_json_text<T: Serialize + ?Sized>(value: &T) -> Result<String, NexusError> {
    serde_json::to_string(value)
        .map_err(|e| NexusError::DatabaseError(sqlx::Error::Encode(Box::new(e))))
}

fn from_json_text<T: DeserializeOwned>(raw: &str) -> Result<T, NexusError> {
    serde_json::from_str(raw).map_err(|e| NexusError::DatabaseError(sqlx::Error::Decode(Box::new(e))))
}

fn parse_rfc3339(raw: &str) -> Result<DateTime<Utc>, NexusError> {
    let dt = DateTime::parse_from_rfc3339(raw).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    async fn memory_storage() -> StudyStorage {
        // one connection so every query sees the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = StudyStorage::new(pool);
        storage.init_schema().await.unwrap();
        storage
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_updates_name() {
        let s = memory_storage().await;
        let first = s.upsert_line_user("U123", "Hanako").await.unwrap();
        let second = s.upsert_line_user("U123", "Hanako Y").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.display_name.as_deref(), Some("Hanako Y"));
        assert_eq!(second.plan, Plan::Free);

        s.set_plan(first.id, Plan::Plus, None).await.unwrap();
        let user = s.get_user(first.id).await.unwrap().unwrap();
        assert_eq!(user.plan, Plan::Plus);
        assert!(s.get_user(first.id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quota_stops_at_limit() {
        let s = memory_storage().await;
        let user = s.upsert_line_user("U1", "Taro").await.unwrap();

        for expected in 1..=3 {
            let outcome = s
                .consume_quota(user.id, day(), UsageKind::Navi, 3)
                .await
                .unwrap();
            assert_eq!(outcome, QuotaOutcome::Consumed { new_count: expected });
        }
        let outcome = s
            .consume_quota(user.id, day(), UsageKind::Navi, 3)
            .await
            .unwrap();
        assert_eq!(outcome, QuotaOutcome::Exceeded { current: 3 });

        let counts = s.usage_for(user.id, day()).await.unwrap();
        assert_eq!(counts, UsageCounts { gen_count: 0, navi_count: 3 });
    }

    #[tokio::test]
    async fn quota_is_per_day() {
        let s = memory_storage().await;
        let user = s.upsert_line_user("U2", "Jiro").await.unwrap();
        let next_day = day().succ_opt().unwrap();

        for _ in 0..2 {
            s.consume_quota(user.id, day(), UsageKind::Gen, 2).await.unwrap();
        }
        let outcome = s
            .consume_quota(user.id, next_day, UsageKind::Gen, 2)
            .await
            .unwrap();
        assert_eq!(outcome, QuotaOutcome::Consumed { new_count: 1 });
        assert_eq!(s.usage_for(user.id, day()).await.unwrap().gen_count, 2);
        assert_eq!(s.usage_for(user.id, next_day).await.unwrap().gen_count, 1);
    }

    #[tokio::test]
    async fn released_unit_can_be_taken_again() {
        let s = memory_storage().await;
        let user = s.upsert_line_user("U4", "Shiro").await.unwrap();

        for _ in 0..3 {
            s.consume_quota(user.id, day(), UsageKind::Navi, 3).await.unwrap();
        }
        assert_eq!(s.release_quota(user.id, day(), UsageKind::Navi).await.unwrap(), 2);
        let outcome = s
            .consume_quota(user.id, day(), UsageKind::Navi, 3)
            .await
            .unwrap();
        assert_eq!(outcome, QuotaOutcome::Consumed { new_count: 3 });
    }

    #[tokio::test]
    async fn release_never_goes_negative() {
        let s = memory_storage().await;
        let user = s.upsert_line_user("U5", "Goro").await.unwrap();

        assert_eq!(s.release_quota(user.id, day(), UsageKind::Gen).await.unwrap(), 0);
        s.consume_quota(user.id, day(), UsageKind::Gen, 10).await.unwrap();
        assert_eq!(s.release_quota(user.id, day(), UsageKind::Gen).await.unwrap(), 0);
        assert_eq!(s.release_quota(user.id, day(), UsageKind::Gen).await.unwrap(), 0);
        assert_eq!(s.usage_for(user.id, day()).await.unwrap().gen_count, 0);
    }

    #[tokio::test]
    async fn history_round_trips_weak_areas() {
        let s = memory_storage().await;
        let user = s.upsert_line_user("U3", "Saburo").await.unwrap();
        let id = s
            .insert_history(NewHistoryEntry {
                user_id: user.id,
                subject: "数学".to_string(),
                topic: Some("Answer Check".to_string()),
                score: Some(80),
                max_score: Some(100),
                weak_areas: Some(json!({ "incorrectParts": ["because"] })),
                quiz_type: "answer_check".to_string(),
                difficulty: None,
            })
            .await
            .unwrap();

        let rows = s.list_history(user.id, "answer_check", 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].score, Some(80));
        assert_eq!(
            rows[0].weak_areas.as_ref().unwrap()["incorrectParts"][0],
            "because"
        );
        assert!(s.list_history(user.id, "basic_quiz", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn attempts_only_complete_for_their_owner() {
        let s = memory_storage().await;
        let owner = s.upsert_line_user("U6", "Rokuro").await.unwrap();
        let other = s.upsert_line_user("U7", "Nanami").await.unwrap();
        let id = s
            .insert_history(NewHistoryEntry {
                user_id: owner.id,
                subject: "英語".to_string(),
                topic: None,
                score: None,
                max_score: Some(5),
                weak_areas: Some(json!({ "questions": [] })),
                quiz_type: "basic_quiz".to_string(),
                difficulty: Some("basic".to_string()),
            })
            .await
            .unwrap();

        assert!(s.history_entry(other.id, id, "basic_quiz").await.unwrap().is_none());
        assert!(s.history_entry(owner.id, id, "answer_check").await.unwrap().is_none());
        assert!(!s.complete_attempt(other.id, id, 100, &json!({})).await.unwrap());

        assert!(
            s.complete_attempt(owner.id, id, 60, &json!({ "missed": [2, 4] }))
                .await
                .unwrap()
        );
        let row = s.history_entry(owner.id, id, "basic_quiz").await.unwrap().unwrap();
        assert_eq!(row.score, Some(60));
        assert_eq!(row.weak_areas.unwrap()["missed"][1], 4);
    }

    #[tokio::test]
    async fn goal_upsert_keeps_one_row_per_user() {
        use crate::service::goals::{GoalRequest, build_study_plan};

        let s = memory_storage().await;
        let user = s.upsert_line_user("U8", "Hachi").await.unwrap();
        assert!(s.goal_for(user.id).await.unwrap().is_none());

        let mut goal = GoalRequest {
            target_school: "市立高校".to_string(),
            exam_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            current_level: "基礎".to_string(),
            target_subjects: vec!["数学".to_string()],
        };
        let first = s
            .upsert_goal(user.id, &goal, &build_study_plan(&goal, Utc::now()))
            .await
            .unwrap();
        assert_eq!(first.study_plan.weekly_schedule[0].hours_per_week, 8);

        goal.target_school = "県立高校".to_string();
        goal.target_subjects.push("理科".to_string());
        let second = s
            .upsert_goal(user.id, &goal, &build_study_plan(&goal, Utc::now()))
            .await
            .unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.target_school, "県立高校");
        assert_eq!(second.target_subjects, ["数学", "理科"]);
        assert_eq!(s.goal_for(user.id).await.unwrap(), Some(second));
    }
}
