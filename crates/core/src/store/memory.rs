use super::SessionStore;
use crate::content::ExerciseContent;
use crate::model::{
    Exercise, ExerciseId, ExerciseStatus, MAX_GRADE, Message, NewExercise, NewMessage,
    NewReflection, Reflection, Sender, Session, SessionId,
};
use anyhow::{Result, bail, ensure};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<SessionId, Session>,
    exercises: HashMap<ExerciseId, Exercise>,
    messages: Vec<Message>,
    reflections: Vec<Reflection>,
    next_exercise_id: ExerciseId,
    next_message_id: i64,
    next_reflection_id: i64,
}

impl State {
    fn require_session(&self, session_id: SessionId) -> Result<()> {
        ensure!(
            self.sessions.contains_key(&session_id),
            "session {session_id} does not exist"
        );
        Ok(())
    }
}

/// A process-local store behind one async mutex.
///
/// Enforces the same constraints as the database schema: one in-progress
/// exercise per session, grades within range, and a single opening message
/// per exercise log. Used in tests and when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reflections recorded for a session, oldest first.
    pub async fn reflections(&self, session_id: SessionId) -> Vec<Reflection> {
        let state = self.state.lock().await;
        state
            .reflections
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create_session(&self, seeds: Vec<NewExercise>) -> Result<(Session, Vec<Exercise>)> {
        let mut state = self.state.lock().await;
        let session = Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let mut exercises = Vec::with_capacity(seeds.len());
        for seed in seeds {
            state.next_exercise_id += 1;
            exercises.push(Exercise {
                id: state.next_exercise_id,
                session_id: session.id,
                title: seed.title,
                objective: seed.objective,
                status: seed.status,
                kind: seed.kind,
                difficulty: seed.difficulty,
                skill_focus: seed.skill_focus,
                estimated_time: seed.estimated_time,
                content: None,
                grade: None,
                feedback: None,
                started: false,
                position: seed.position,
                created_at: session.created_at,
            });
        }
        for exercise in &exercises {
            state.exercises.insert(exercise.id, exercise.clone());
        }
        state.sessions.insert(session.id, session.clone());
        Ok((session, exercises))
    }

    async fn session_exists(&self, session_id: SessionId) -> Result<bool> {
        Ok(self.state.lock().await.sessions.contains_key(&session_id))
    }

    async fn list_exercises(&self, session_id: SessionId) -> Result<Vec<Exercise>> {
        let state = self.state.lock().await;
        let mut exercises: Vec<Exercise> = state
            .exercises
            .values()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect();
        exercises.sort_by_key(|e| e.position);
        Ok(exercises)
    }

    async fn find_exercise(&self, session_id: SessionId, title: &str) -> Result<Option<Exercise>> {
        let state = self.state.lock().await;
        Ok(state
            .exercises
            .values()
            .find(|e| e.session_id == session_id && e.title == title)
            .cloned())
    }

    async fn save_exercises(
        &self,
        session_id: SessionId,
        exercises: &[Exercise],
        reflection: Option<NewReflection>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.require_session(session_id)?;

        // Check the batch against the state it would produce before touching
        // anything.
        let mut staged = state.exercises.clone();
        for exercise in exercises {
            ensure!(
                exercise.session_id == session_id,
                "exercise {} belongs to another session",
                exercise.id
            );
            ensure!(
                exercise.grade.is_none_or(|g| g <= MAX_GRADE),
                "grade out of range for exercise {}",
                exercise.id
            );
            match staged.get_mut(&exercise.id) {
                Some(slot) => {
                    slot.status = exercise.status;
                    slot.grade = exercise.grade;
                    slot.feedback = exercise.feedback.clone();
                    slot.started = exercise.started;
                }
                None => bail!("exercise {} does not exist", exercise.id),
            }
        }
        let active = staged
            .values()
            .filter(|e| e.session_id == session_id && e.status == ExerciseStatus::InProgress)
            .count();
        ensure!(active <= 1, "session {session_id} would have {active} exercises in progress");

        state.exercises = staged;
        if let Some(reflection) = reflection {
            state.next_reflection_id += 1;
            let id = state.next_reflection_id;
            state.reflections.push(Reflection {
                id,
                session_id,
                exercise_title: reflection.exercise_title,
                difficulty: reflection.difficulty,
                confidence: reflection.confidence,
                comment: reflection.comment,
            });
        }
        Ok(())
    }

    async fn save_content(&self, exercise_id: ExerciseId, content: &ExerciseContent) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.exercises.get_mut(&exercise_id) {
            Some(exercise) => {
                exercise.content = Some(content.clone());
                Ok(())
            }
            None => bail!("exercise {exercise_id} does not exist"),
        }
    }

    async fn list_messages(
        &self,
        session_id: SessionId,
        exercise_title: &str,
    ) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| m.session_id == session_id && m.exercise_title == exercise_title)
            .cloned()
            .collect();
        messages.sort_by_key(|m| (m.timestamp, m.id));
        Ok(messages)
    }

    async fn append_messages(
        &self,
        session_id: SessionId,
        exercise_title: &str,
        messages: Vec<NewMessage>,
    ) -> Result<Vec<Message>> {
        let mut state = self.state.lock().await;
        state.require_session(session_id)?;

        let mut openings = state
            .messages
            .iter()
            .filter(|m| {
                m.session_id == session_id
                    && m.exercise_title == exercise_title
                    && m.sender == Sender::System
            })
            .count();
        openings += messages.iter().filter(|m| m.sender == Sender::System).count();
        ensure!(
            openings <= 1,
            "exercise '{exercise_title}' already has an opening message"
        );

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            state.next_message_id += 1;
            stored.push(Message {
                id: state.next_message_id,
                session_id,
                exercise_title: exercise_title.to_string(),
                sender: message.sender,
                text: message.text,
                timestamp: message.timestamp,
                metadata: message.metadata,
            });
        }
        state.messages.extend(stored.iter().cloned());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DifficultyBand, ExerciseKind};

    fn seed(title: &str, position: i32, status: ExerciseStatus) -> NewExercise {
        NewExercise {
            title: title.to_string(),
            objective: format!("practise {title}"),
            status,
            kind: ExerciseKind::Simulation,
            difficulty: DifficultyBand::Beginner,
            skill_focus: String::new(),
            estimated_time: String::new(),
            position,
        }
    }

    fn message(sender: Sender, text: &str) -> NewMessage {
        NewMessage {
            sender,
            text: text.to_string(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    #[tokio::test]
    async fn test_saving_a_stale_snapshot_keeps_cached_content() {
        let store = MemoryStore::new();
        let (session, exercises) = store
            .create_session(vec![
                seed("A", 0, ExerciseStatus::InProgress),
                seed("B", 1, ExerciseStatus::Planned),
            ])
            .await
            .unwrap();

        // Content is cached after the snapshot below was taken.
        let mut snapshot = exercises.clone();
        store
            .save_content(exercises[0].id, &ExerciseContent::Simulation)
            .await
            .unwrap();

        snapshot[0].status = ExerciseStatus::Completed;
        snapshot[0].started = true;
        snapshot[0].grade = Some(4);
        snapshot[1].status = ExerciseStatus::InProgress;
        store.save_exercises(session.id, &snapshot, None).await.unwrap();

        let stored = store.list_exercises(session.id).await.unwrap();
        assert_eq!(stored[0].status, ExerciseStatus::Completed);
        assert_eq!(stored[0].grade, Some(4));
        assert_eq!(stored[0].content, Some(ExerciseContent::Simulation));
        assert_eq!(stored[1].status, ExerciseStatus::InProgress);
    }

    #[tokio::test]
    async fn test_create_and_list_in_position_order() {
        let store = MemoryStore::new();
        let (session, _) = store
            .create_session(vec![
                seed("B", 1, ExerciseStatus::Planned),
                seed("A", 0, ExerciseStatus::InProgress),
            ])
            .await
            .unwrap();

        let titles: Vec<_> = store
            .list_exercises(session.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["A", "B"]);
        assert!(store.session_exists(session.id).await.unwrap());
        assert!(!store.session_exists(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_rejects_second_active_exercise_atomically() {
        let store = MemoryStore::new();
        let (session, mut exercises) = store
            .create_session(vec![
                seed("A", 0, ExerciseStatus::InProgress),
                seed("B", 1, ExerciseStatus::Planned),
            ])
            .await
            .unwrap();
        exercises[1].status = ExerciseStatus::InProgress;

        let reflection = NewReflection {
            exercise_title: "A".to_string(),
            difficulty: 3,
            confidence: 3,
            comment: String::new(),
        };
        assert!(
            store
                .save_exercises(session.id, &exercises[1..], Some(reflection))
                .await
                .is_err()
        );
        let b = store.find_exercise(session.id, "B").await.unwrap().unwrap();
        assert_eq!(b.status, ExerciseStatus::Planned);
        assert!(store.reflections(session.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_append_rejects_second_opening() {
        let store = MemoryStore::new();
        let (session, _) = store
            .create_session(vec![seed("A", 0, ExerciseStatus::InProgress)])
            .await
            .unwrap();
        store
            .append_messages(session.id, "A", vec![message(Sender::System, "opening")])
            .await
            .unwrap();

        let err = store
            .append_messages(
                session.id,
                "A",
                vec![
                    message(Sender::Learner, "hi"),
                    message(Sender::System, "again"),
                ],
            )
            .await;
        assert!(err.is_err());
        assert_eq!(store.list_messages(session.id, "A").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_append_requires_session() {
        let store = MemoryStore::new();
        let result = store
            .append_messages(Uuid::new_v4(), "A", vec![message(Sender::Learner, "hi")])
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_content_is_cached() {
        let store = MemoryStore::new();
        let (session, exercises) = store
            .create_session(vec![seed("A", 0, ExerciseStatus::InProgress)])
            .await
            .unwrap();
        store
            .save_content(exercises[0].id, &ExerciseContent::Simulation)
            .await
            .unwrap();
        let a = store.find_exercise(session.id, "A").await.unwrap().unwrap();
        assert_eq!(a.content, Some(ExerciseContent::Simulation));
    }
}
