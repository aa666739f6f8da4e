//! Turn Orchestrator
//!
//! One learner message in, one counterpart reply and a set of coach tips
//! out. Every message a turn produces is staged in a [`ConversationLog`] and
//! committed with a single store call at the end, so a persistence failure
//! leaves the log exactly as it was. Generation failures never fail a turn.

use crate::agreement;
use crate::coach;
use crate::content::generate_opening;
use crate::conversation::{ConversationLog, View, project, render};
use crate::counterpart::{self, Persona, UNAVAILABLE_REPLY};
use crate::engine::{PracticeEngine, guidance_for, opening_metadata};
use crate::error::{EngineError, EngineResult};
use crate::llm_client::{OrFallback, settle};
use crate::model::{Message, Sender, SessionId};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, instrument, warn};

/// What a turn hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub counterpart_reply: String,
    /// At most three tips; empty when the coach could not be reached.
    pub coach_tips: Vec<String>,
    pub agreement_reached: bool,
    /// The full log of the exercise after the turn, in timestamp order.
    pub messages: Vec<Message>,
}

/// What the turn knows about the exercise. Falls back to the title alone
/// when the exercise is not part of the session's timeline.
struct TurnContext {
    title: String,
    objective: String,
}

impl PracticeEngine {
    /// Runs one conversation turn for `exercise_title`.
    ///
    /// Callers must not run two turns for the same exercise at once: both
    /// could see an empty log and each stage an opening.
    #[instrument(name = "turn", skip_all, fields(session_id = %session_id, exercise = %exercise_title))]
    pub async fn handle_turn(
        &self,
        session_id: SessionId,
        exercise_title: &str,
        learner_text: &str,
    ) -> EngineResult<TurnOutcome> {
        self.require_session(session_id).await?;

        let context = match self.store.find_exercise(session_id, exercise_title).await? {
            Some(exercise) => TurnContext {
                title: exercise.title,
                objective: exercise.objective,
            },
            None => {
                info!("Exercise is not on the timeline, continuing with its title only");
                TurnContext {
                    title: exercise_title.to_string(),
                    objective: String::new(),
                }
            }
        };

        let mut log = ConversationLog::new(self.store.list_messages(session_id, &context.title).await?);

        if log.is_empty() {
            let exercises = self.store.list_exercises(session_id).await?;
            let guidance = guidance_for(&exercises);
            match generate_opening(
                self.generator.as_ref(),
                &self.prompts,
                &context.title,
                &context.objective,
                &guidance,
            )
            .await
            {
                Ok(opening) => {
                    log.append(Sender::System, opening, Some(opening_metadata()));
                }
                Err(cause) => {
                    warn!(error = %format!("{cause:#}"), "Opening generation failed, continuing without one");
                }
            }
        }

        log.append(Sender::Learner, learner_text, None);

        let persona = Persona::for_objective(&context.objective);
        let (counterpart_prompt, coach_conversation) = {
            let entries = log.entries();
            let counterpart_view = project(&entries, View::Counterpart);
            let coach_view = project(&entries, View::Coach);
            (
                counterpart::user_prompt(learner_text, &context.objective, &counterpart_view),
                render(&coach_view),
            )
        };

        let signal = agreement::detect(learner_text);
        let counterpart_reply = match signal {
            Some(rule) => {
                info!(category = ?rule.category, "Agreement detected, closing the negotiation");
                persona.closing_line().to_string()
            }
            None => settle(
                self.generator
                    .generate(
                        persona.system_prompt(&self.prompts).to_string(),
                        counterpart_prompt,
                    )
                    .await
                    .or_fallback(|| UNAVAILABLE_REPLY.to_string()),
                "counterpart reply",
            ),
        };
        log.append(Sender::Counterpart, counterpart_reply.clone(), None);

        let coach_prompt = coach::user_prompt(
            &context.title,
            &context.objective,
            learner_text,
            &counterpart_reply,
            &coach_conversation,
        );
        let coach_tips = match self
            .generator
            .generate(self.prompts.coach.clone(), coach_prompt)
            .await
        {
            Ok(raw) => coach::parse_tips(&raw),
            Err(cause) => {
                warn!(error = %format!("{cause:#}"), "Coach generation failed, returning no tips");
                Vec::new()
            }
        };
        if !coach_tips.is_empty() {
            log.append(
                Sender::Coach,
                coach_tips.join("\n"),
                Some(json!({ "tips": coach_tips })),
            );
        }

        let (mut messages, pending) = log.into_parts();
        let staged = pending.len();
        let stored = self
            .store
            .append_messages(session_id, &context.title, pending)
            .await
            .map_err(|e| {
                error!(error = %format!("{e:#}"), "Turn could not be committed, nothing was saved");
                EngineError::Persistence(e)
            })?;
        messages.extend(stored);
        info!(
            staged,
            tips = coach_tips.len(),
            agreement = signal.is_some(),
            "Turn committed"
        );

        Ok(TurnOutcome {
            counterpart_reply,
            coach_tips,
            agreement_reached: signal.is_some(),
            messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::content::ExerciseContent;
    use crate::engine::tests::{CATALOG, engine_with};
    use crate::llm_client::MockTextGenerator;
    use crate::model::{
        Exercise, ExerciseId, NewExercise, NewMessage, NewReflection, Session,
    };
    use crate::prompts::Prompts;
    use crate::store::{MemoryStore, SessionStore};
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use mockall::Sequence;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    const SIMULATION: &str = "Light Negotiation Simulation";

    const OPENING: &str = "You are Sam, a friend.\nYour counterpart is Alex, your roommate.\n\
                           Alex: I really want to watch The Matrix tonight.";

    /// A generator answering opening, counterpart and coach in that order.
    fn scripted(coach_reply: &'static str) -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        let mut seq = Sequence::new();
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(OPENING.to_string()));
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, user| {
                assert!(user.contains("I really want to watch the other movie"));
                assert!(!user.contains("Your counterpart is Alex"));
                Ok("The Matrix is a classic, though.".to_string())
            });
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_, user| {
                assert!(user.contains("The other party (Alex) replied"));
                Ok(coach_reply.to_string())
            });
        generator
    }

    #[tokio::test]
    async fn test_first_turn_persists_four_messages_in_order() {
        let (engine, store) = engine_with(scripted(
            "- Ask Alex what they love about it.\n- Offer to pick snacks.\n- Suggest a compromise.\n- One too many.",
        ));
        let (session, _) = engine.create_session().await.unwrap();

        let outcome = engine
            .handle_turn(session.id, SIMULATION, "I really want to watch the other movie")
            .await
            .unwrap();

        assert!(!outcome.agreement_reached);
        assert_eq!(outcome.counterpart_reply, "The Matrix is a classic, though.");
        assert_eq!(outcome.coach_tips.len(), 3);

        let log = store.list_messages(session.id, SIMULATION).await.unwrap();
        let senders: Vec<Sender> = log.iter().map(|m| m.sender).collect();
        assert_eq!(
            senders,
            vec![Sender::System, Sender::Learner, Sender::Counterpart, Sender::Coach]
        );
        assert!(log.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(log[3].metadata, Some(json!({ "tips": outcome.coach_tips })));
        assert_eq!(outcome.messages, log);
    }

    #[tokio::test]
    async fn test_opening_is_not_regenerated_on_later_turns() {
        let (engine, store) = engine_with(scripted("- Stay curious."));
        let (session, _) = engine.create_session().await.unwrap();
        engine
            .handle_turn(session.id, SIMULATION, "I really want to watch the other movie")
            .await
            .unwrap();

        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .times(2)
            .returning(|_, _| Ok("- Keep going.".to_string()));
        let engine = PracticeEngine::new(
            store.clone(),
            Arc::new(generator),
            Arc::new(Prompts::builtin()),
            Arc::new(Catalog::from_json_str(CATALOG).unwrap()),
        );
        engine
            .handle_turn(session.id, SIMULATION, "What about a comedy instead?")
            .await
            .unwrap();

        let openings = store
            .list_messages(session.id, SIMULATION)
            .await
            .unwrap()
            .into_iter()
            .filter(|m| m.sender == Sender::System)
            .count();
        assert_eq!(openings, 1);
    }

    #[tokio::test]
    async fn test_agreement_skips_counterpart_generation() {
        let mut generator = MockTextGenerator::new();
        let mut seq = Sequence::new();
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(OPENING.to_string()));
        // Only the coach is asked after the opening.
        generator
            .expect_generate()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|system, _| {
                assert!(system.to_lowercase().contains("coach"));
                Ok("- Confirm the time.".to_string())
            });
        let (engine, _) = engine_with(generator);
        let (session, _) = engine.create_session().await.unwrap();

        let outcome = engine
            .handle_turn(session.id, SIMULATION, "Yeah, that's fine")
            .await
            .unwrap();
        assert!(outcome.agreement_reached);
        assert!(
            Persona::MovieNight
                .closing_lines()
                .contains(&outcome.counterpart_reply.as_str())
        );
    }

    #[tokio::test]
    async fn test_generation_failures_degrade_the_turn() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Err(anyhow::anyhow!("rate limited")));
        let (engine, store) = engine_with(generator);
        let (session, _) = engine.create_session().await.unwrap();

        let outcome = engine
            .handle_turn(session.id, SIMULATION, "I'm still not convinced")
            .await
            .unwrap();
        assert_eq!(outcome.counterpart_reply, UNAVAILABLE_REPLY);
        assert!(outcome.coach_tips.is_empty());

        let senders: Vec<Sender> = store
            .list_messages(session.id, SIMULATION)
            .await
            .unwrap()
            .iter()
            .map(|m| m.sender)
            .collect();
        assert_eq!(senders, vec![Sender::Learner, Sender::Counterpart]);
    }

    #[tokio::test]
    async fn test_unknown_exercise_runs_with_degraded_context() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Ok("- Ask an open question.".to_string()));
        let (engine, store) = engine_with(generator);
        let (session, _) = engine.create_session().await.unwrap();

        let outcome = engine
            .handle_turn(session.id, "Improvised Practice", "Hello there")
            .await
            .unwrap();
        assert_eq!(outcome.messages.len(), 4);
        assert_eq!(
            store
                .list_messages(session.id, "Improvised Practice")
                .await
                .unwrap()
                .len(),
            4
        );
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let (engine, _) = engine_with(MockTextGenerator::new());
        let err = engine
            .handle_turn(Uuid::new_v4(), SIMULATION, "Hi")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotFound { entity: "session", .. }));
    }

    /// Delegates to a [`MemoryStore`] but can be told to reject message
    /// commits.
    struct FlakyStore {
        inner: MemoryStore,
        reject_appends: AtomicBool,
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn create_session(&self, seeds: Vec<NewExercise>) -> Result<(Session, Vec<Exercise>)> {
            self.inner.create_session(seeds).await
        }

        async fn session_exists(&self, session_id: SessionId) -> Result<bool> {
            self.inner.session_exists(session_id).await
        }

        async fn list_exercises(&self, session_id: SessionId) -> Result<Vec<Exercise>> {
            self.inner.list_exercises(session_id).await
        }

        async fn find_exercise(&self, session_id: SessionId, title: &str) -> Result<Option<Exercise>> {
            self.inner.find_exercise(session_id, title).await
        }

        async fn save_exercises(
            &self,
            session_id: SessionId,
            exercises: &[Exercise],
            reflection: Option<NewReflection>,
        ) -> Result<()> {
            self.inner.save_exercises(session_id, exercises, reflection).await
        }

        async fn save_content(&self, exercise_id: ExerciseId, content: &ExerciseContent) -> Result<()> {
            self.inner.save_content(exercise_id, content).await
        }

        async fn list_messages(&self, session_id: SessionId, exercise_title: &str) -> Result<Vec<Message>> {
            self.inner.list_messages(session_id, exercise_title).await
        }

        async fn append_messages(
            &self,
            session_id: SessionId,
            exercise_title: &str,
            messages: Vec<NewMessage>,
        ) -> Result<Vec<Message>> {
            if self.reject_appends.load(Ordering::SeqCst) {
                bail!("connection reset");
            }
            self.inner.append_messages(session_id, exercise_title, messages).await
        }
    }

    #[tokio::test]
    async fn test_persistence_failure_rolls_back_the_whole_turn() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            reject_appends: AtomicBool::new(true),
        });
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _| Ok("- Hold your ground.".to_string()));
        let engine = PracticeEngine::new(
            store.clone(),
            Arc::new(generator),
            Arc::new(Prompts::builtin()),
            Arc::new(Catalog::from_json_str(CATALOG).unwrap()),
        );
        let (session, _) = engine.create_session().await.unwrap();

        let err = engine
            .handle_turn(session.id, SIMULATION, "Let's finalize this")
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Persistence(_)));
        assert!(
            store
                .list_messages(session.id, SIMULATION)
                .await
                .unwrap()
                .is_empty()
        );

        // Once the store recovers the next turn starts from a clean log.
        store.reject_appends.store(false, Ordering::SeqCst);
        let outcome = engine
            .handle_turn(session.id, SIMULATION, "Let's finalize this")
            .await
            .unwrap();
        assert_eq!(outcome.messages[0].sender, Sender::System);
    }
}
