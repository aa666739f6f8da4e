//! Storage Abstraction
//!
//! The engine persists through [`SessionStore`]. Every method is one atomic
//! unit: a batch either lands completely or not at all, so a failed turn or
//! timeline operation never leaves partial state behind.

mod memory;

pub use memory::MemoryStore;

use crate::content::ExerciseContent;
use crate::model::{
    Exercise, ExerciseId, Message, NewExercise, NewMessage, NewReflection, Session, SessionId,
};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Creates a session together with its seeded exercises.
    async fn create_session(&self, exercises: Vec<NewExercise>) -> Result<(Session, Vec<Exercise>)>;

    async fn session_exists(&self, session_id: SessionId) -> Result<bool>;

    /// All exercises of a session in creation order.
    async fn list_exercises(&self, session_id: SessionId) -> Result<Vec<Exercise>>;

    async fn find_exercise(&self, session_id: SessionId, title: &str) -> Result<Option<Exercise>>;

    /// Writes back the timeline state (status, grade, feedback, started) of
    /// changed exercises, and optionally a reflection, in one transaction.
    /// Cached content is left as stored; only [`Self::save_content`] writes it.
    async fn save_exercises(
        &self,
        session_id: SessionId,
        exercises: &[Exercise],
        reflection: Option<NewReflection>,
    ) -> Result<()>;

    /// Caches generated content on an exercise.
    async fn save_content(&self, exercise_id: ExerciseId, content: &ExerciseContent) -> Result<()>;

    /// The log of one exercise in timestamp order.
    async fn list_messages(&self, session_id: SessionId, exercise_title: &str)
    -> Result<Vec<Message>>;

    /// Appends a batch of messages in one transaction and returns them as
    /// stored. Fails for unknown sessions.
    async fn append_messages(
        &self,
        session_id: SessionId,
        exercise_title: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>>;
}
