//! Data Access Layer
//!
//! [`PgStore`] implements the engine's [`SessionStore`] on PostgreSQL. Each
//! trait method runs in at most one transaction. Queries are checked at
//! runtime so the service builds without a live database.

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parley_core::content::ExerciseContent;
use parley_core::model::{
    Exercise, ExerciseId, ExerciseStatus, Message, NewExercise, NewMessage, NewReflection,
    Session, SessionId,
};
use parley_core::store::SessionStore;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
struct ExerciseRow {
    id: i64,
    session_id: Uuid,
    title: String,
    objective: String,
    status: String,
    kind: String,
    difficulty: String,
    skill_focus: String,
    estimated_time: String,
    content: Option<serde_json::Value>,
    grade: Option<i16>,
    feedback: Option<String>,
    started: bool,
    position: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ExerciseRow> for Exercise {
    type Error = anyhow::Error;

    fn try_from(row: ExerciseRow) -> Result<Self> {
        let content = row
            .content
            .map(serde_json::from_value::<ExerciseContent>)
            .transpose()
            .with_context(|| format!("unreadable content on exercise {}", row.id))?;
        let grade = row
            .grade
            .map(u8::try_from)
            .transpose()
            .with_context(|| format!("negative grade on exercise {}", row.id))?;
        Ok(Exercise {
            id: row.id,
            session_id: row.session_id,
            title: row.title,
            objective: row.objective,
            status: row.status.parse()?,
            kind: row.kind.parse()?,
            difficulty: row.difficulty.parse()?,
            skill_focus: row.skill_focus,
            estimated_time: row.estimated_time,
            content,
            grade,
            feedback: row.feedback,
            started: row.started,
            position: row.position,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct MessageRow {
    id: i64,
    session_id: Uuid,
    exercise_title: String,
    sender: String,
    text: String,
    sent_at: DateTime<Utc>,
    metadata: Option<serde_json::Value>,
}

impl TryFrom<MessageRow> for Message {
    type Error = anyhow::Error;

    fn try_from(row: MessageRow) -> Result<Self> {
        Ok(Message {
            id: row.id,
            session_id: row.session_id,
            exercise_title: row.exercise_title,
            sender: row.sender.parse()?,
            text: row.text,
            timestamp: row.sent_at,
            metadata: row.metadata,
        })
    }
}

fn exercises_from(rows: Vec<ExerciseRow>) -> Result<Vec<Exercise>> {
    rows.into_iter().map(Exercise::try_from).collect()
}

/// A wrapper around the `PgPool` implementing the engine's storage.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn create_session(&self, seeds: Vec<NewExercise>) -> Result<(Session, Vec<Exercise>)> {
        let mut tx = self.pool.begin().await?;

        let session = sqlx::query_as::<_, SessionRow>(
            "INSERT INTO sessions (id) VALUES ($1) RETURNING id, created_at",
        )
        .bind(Uuid::new_v4())
        .fetch_one(&mut *tx)
        .await?;

        let mut rows = Vec::with_capacity(seeds.len());
        for seed in seeds {
            let row = sqlx::query_as::<_, ExerciseRow>(
                r#"
                INSERT INTO exercises
                    (session_id, title, objective, status, kind, difficulty,
                     skill_focus, estimated_time, position)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING id, session_id, title, objective, status, kind, difficulty,
                          skill_focus, estimated_time, content, grade, feedback, started,
                          position, created_at
                "#,
            )
            .bind(session.id)
            .bind(&seed.title)
            .bind(&seed.objective)
            .bind(seed.status.as_str())
            .bind(seed.kind.as_str())
            .bind(seed.difficulty.as_str())
            .bind(&seed.skill_focus)
            .bind(&seed.estimated_time)
            .bind(seed.position)
            .fetch_one(&mut *tx)
            .await?;
            rows.push(row);
        }

        tx.commit().await?;
        Ok((
            Session {
                id: session.id,
                created_at: session.created_at,
            },
            exercises_from(rows)?,
        ))
    }

    async fn session_exists(&self, session_id: SessionId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM sessions WHERE id = $1)")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn list_exercises(&self, session_id: SessionId) -> Result<Vec<Exercise>> {
        let rows = sqlx::query_as::<_, ExerciseRow>(
            r#"
            SELECT id, session_id, title, objective, status, kind, difficulty,
                   skill_focus, estimated_time, content, grade, feedback, started,
                   position, created_at
            FROM exercises
            WHERE session_id = $1
            ORDER BY position ASC, id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        exercises_from(rows)
    }

    async fn find_exercise(&self, session_id: SessionId, title: &str) -> Result<Option<Exercise>> {
        let row = sqlx::query_as::<_, ExerciseRow>(
            r#"
            SELECT id, session_id, title, objective, status, kind, difficulty,
                   skill_focus, estimated_time, content, grade, feedback, started,
                   position, created_at
            FROM exercises
            WHERE session_id = $1 AND title = $2
            "#,
        )
        .bind(session_id)
        .bind(title)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Exercise::try_from).transpose()
    }

    async fn save_exercises(
        &self,
        session_id: SessionId,
        exercises: &[Exercise],
        reflection: Option<NewReflection>,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // The one-in-progress index is checked row by row, so the exercise
        // being activated is written after the one giving way.
        let mut ordered: Vec<&Exercise> = exercises.iter().collect();
        ordered.sort_by_key(|e| e.status == ExerciseStatus::InProgress);

        // Content is owned by `save_content`; a snapshot never overwrites it.
        for exercise in ordered {
            let updated = sqlx::query(
                r#"
                UPDATE exercises
                SET status = $1, grade = $2, feedback = $3, started = $4
                WHERE id = $5 AND session_id = $6
                "#,
            )
            .bind(exercise.status.as_str())
            .bind(exercise.grade.map(i16::from))
            .bind(&exercise.feedback)
            .bind(exercise.started)
            .bind(exercise.id)
            .bind(session_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
            ensure!(
                updated == 1,
                "exercise {} does not exist in session {session_id}",
                exercise.id
            );
        }

        if let Some(reflection) = reflection {
            sqlx::query(
                r#"
                INSERT INTO reflections (session_id, exercise_title, difficulty, confidence, comment)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(session_id)
            .bind(&reflection.exercise_title)
            .bind(i16::from(reflection.difficulty))
            .bind(i16::from(reflection.confidence))
            .bind(&reflection.comment)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_content(&self, exercise_id: ExerciseId, content: &ExerciseContent) -> Result<()> {
        let updated = sqlx::query("UPDATE exercises SET content = $1 WHERE id = $2")
            .bind(serde_json::to_value(content)?)
            .bind(exercise_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        ensure!(updated == 1, "exercise {exercise_id} does not exist");
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: SessionId,
        exercise_title: &str,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, session_id, exercise_title, sender, text, sent_at, metadata
            FROM messages
            WHERE session_id = $1 AND exercise_title = $2
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(session_id)
        .bind(exercise_title)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Message::try_from).collect()
    }

    async fn append_messages(
        &self,
        session_id: SessionId,
        exercise_title: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>> {
        let mut tx = self.pool.begin().await?;

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            let row = sqlx::query_as::<_, MessageRow>(
                r#"
                INSERT INTO messages (session_id, exercise_title, sender, text, sent_at, metadata)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, session_id, exercise_title, sender, text, sent_at, metadata
                "#,
            )
            .bind(session_id)
            .bind(exercise_title)
            .bind(message.sender.as_str())
            .bind(&message.text)
            .bind(message.timestamp)
            .bind(&message.metadata)
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("storing a {} message", message.sender))?;
            stored.push(Message::try_from(row)?);
        }

        tx.commit().await?;
        Ok(stored)
    }
}
