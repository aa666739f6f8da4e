//! Practice Engine
//!
//! [`PracticeEngine`] is the entry point for everything that happens inside
//! a learner session apart from a conversation turn (see
//! [`crate::orchestrator`]). Each operation loads what it needs from the
//! [`SessionStore`], works on it in memory and writes the result back in one
//! store call, so a failed operation leaves nothing half-done.

use crate::briefing::{self, Briefing, ProgramLength, current_day, estimate_program_length};
use crate::catalog::Catalog;
use crate::content::{ContentRequest, ExerciseContent, generate_content, generate_opening};
use crate::conversation::ConversationLog;
use crate::error::{EngineError, EngineResult};
use crate::evaluation::{Evaluation, evaluate_response, grade_transcript};
use crate::llm_client::{Fallback, TextGenerator, settle};
use crate::model::{
    DifficultyBand, Exercise, ExerciseId, ExerciseKind, ExerciseStatus, Message, NewReflection,
    Sender, Session, SessionId, clamp_rating,
};
use crate::performance::{self, DifficultyDecision, PerformanceHistory};
use crate::prompts::Prompts;
use crate::store::SessionStore;
use crate::timeline::{Completion, Timeline, Transition};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

/// The opening scenario of a simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Opening {
    pub exercise_title: String,
    /// Empty when the exercise is not a simulation or no scenario is available.
    pub text: String,
}

/// The generated payload of an exercise, as shown to the learner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExerciseMaterial {
    pub exercise_title: String,
    pub kind: ExerciseKind,
    pub content: ExerciseContent,
}

/// The result of grading and closing the active simulation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    /// The grade stored on the exercise. Absent when grading failed or the
    /// exercise was never started.
    pub grade: Option<u8>,
    pub feedback: String,
    pub transition: Transition,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceReport {
    pub history: PerformanceHistory,
    pub decision: DifficultyDecision,
    pub guidance: String,
    pub next_exercise: Option<String>,
    /// The band of the next planned exercise after applying the decision.
    pub suggested_difficulty: Option<DifficultyBand>,
}

/// Drives a practice session. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct PracticeEngine {
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) generator: Arc<dyn TextGenerator>,
    pub(crate) prompts: Arc<Prompts>,
    pub(crate) catalog: Arc<Catalog>,
}

pub(crate) fn opening_metadata() -> serde_json::Value {
    json!({ "kind": "opening" })
}

/// Difficulty guidance for newly generated content, from the graded
/// exercises of the session.
pub(crate) fn guidance_for(exercises: &[Exercise]) -> String {
    let history = PerformanceHistory::from_exercises(exercises);
    let decision = performance::decide(&history);
    performance::guidance(&history, &decision)
}

impl PracticeEngine {
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: Arc<dyn TextGenerator>,
        prompts: Arc<Prompts>,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            store,
            generator,
            prompts,
            catalog,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Creates a session seeded with every catalog exercise. The first one
    /// starts in progress.
    pub async fn create_session(&self) -> EngineResult<(Session, Vec<Exercise>)> {
        let (session, exercises) = self.store.create_session(self.catalog.seed()).await?;
        info!(session_id = %session.id, exercises = exercises.len(), "Session created");
        Ok((session, exercises))
    }

    pub(crate) async fn require_session(&self, session_id: SessionId) -> EngineResult<()> {
        if self.store.session_exists(session_id).await? {
            Ok(())
        } else {
            Err(EngineError::not_found("session", session_id))
        }
    }

    async fn load_timeline(&self, session_id: SessionId) -> EngineResult<Timeline> {
        self.require_session(session_id).await?;
        Ok(Timeline::new(self.store.list_exercises(session_id).await?))
    }

    async fn commit(
        &self,
        session_id: SessionId,
        timeline: &Timeline,
        reflection: Option<NewReflection>,
    ) -> EngineResult<()> {
        let changes = timeline.changes();
        if changes.is_empty() && reflection.is_none() {
            return Ok(());
        }
        self.store
            .save_exercises(session_id, &changes, reflection)
            .await
            .map_err(EngineError::Persistence)
    }

    /// The session's exercises in creation order. Read-only.
    pub async fn timeline(&self, session_id: SessionId) -> EngineResult<Vec<Exercise>> {
        self.require_session(session_id).await?;
        Ok(self.store.list_exercises(session_id).await?)
    }

    /// Completes the active exercise and promotes the next planned one.
    pub async fn advance(
        &self,
        session_id: SessionId,
        completion: Option<Completion>,
    ) -> EngineResult<Transition> {
        let mut timeline = self.load_timeline(session_id).await?;
        let transition = timeline.advance(completion);
        self.commit(session_id, &timeline, None).await?;
        info!(%session_id, previous = ?transition.previous, next = ?transition.next, "Timeline advanced");
        Ok(transition)
    }

    pub async fn select(
        &self,
        session_id: SessionId,
        exercise_id: ExerciseId,
    ) -> EngineResult<Transition> {
        let mut timeline = self.load_timeline(session_id).await?;
        let transition = timeline.select(exercise_id)?;
        self.commit(session_id, &timeline, None).await?;
        info!(%session_id, previous = ?transition.previous, next = ?transition.next, "Exercise selected");
        Ok(transition)
    }

    /// Swaps the active exercise for a random one in `band`, which defaults to
    /// the band of the active exercise. `None` without an active exercise.
    pub async fn swap_similar(
        &self,
        session_id: SessionId,
        band: Option<DifficultyBand>,
    ) -> EngineResult<Option<Transition>> {
        let mut timeline = self.load_timeline(session_id).await?;
        let Some(band) = band.or_else(|| timeline.active().map(|e| e.difficulty)) else {
            return Ok(None);
        };
        let Some(transition) = timeline.swap_similar(band, &mut rand::rng()) else {
            return Ok(None);
        };
        self.commit(session_id, &timeline, None).await?;
        info!(%session_id, %band, previous = ?transition.previous, next = ?transition.next, "Exercise swapped");
        Ok(Some(transition))
    }

    pub async fn mark_started(
        &self,
        session_id: SessionId,
        exercise_id: ExerciseId,
    ) -> EngineResult<Exercise> {
        let mut timeline = self.load_timeline(session_id).await?;
        if timeline.mark_started(exercise_id)? {
            self.commit(session_id, &timeline, None).await?;
        }
        timeline
            .find(exercise_id)
            .cloned()
            .ok_or_else(|| EngineError::not_found("exercise", exercise_id))
    }

    /// Re-grades a completed exercise. Returns the clamped grade, or `None`
    /// when the exercise is not completed or was never started.
    pub async fn record_grade(
        &self,
        session_id: SessionId,
        exercise_id: ExerciseId,
        grade: i64,
        feedback: Option<String>,
    ) -> EngineResult<Option<u8>> {
        let mut timeline = self.load_timeline(session_id).await?;
        let stored = timeline.record_grade(exercise_id, grade, feedback)?;
        self.commit(session_id, &timeline, None).await?;
        Ok(stored)
    }

    /// Exercises the learner can switch to: everything but the active one,
    /// in creation order.
    pub async fn available_exercises(&self, session_id: SessionId) -> EngineResult<Vec<Exercise>> {
        let exercises = self.timeline(session_id).await?;
        Ok(exercises
            .into_iter()
            .filter(|e| e.status != ExerciseStatus::InProgress)
            .collect())
    }

    /// A generated description of the exercise and why it matters. Always
    /// answers; generation failures fall back to fixed text.
    pub async fn briefing(
        &self,
        session_id: SessionId,
        exercise_id: ExerciseId,
    ) -> EngineResult<Briefing> {
        let timeline = self.load_timeline(session_id).await?;
        let exercise = timeline
            .find(exercise_id)
            .ok_or_else(|| EngineError::not_found("exercise", exercise_id))?;

        let description = settle(
            briefing::describe(
                self.generator.as_ref(),
                &self.prompts,
                &exercise.title,
                &exercise.difficulty.marker(),
            )
            .await,
            "exercise description",
        );
        let insights = settle(
            briefing::insights(
                self.generator.as_ref(),
                &self.prompts,
                &exercise.title,
                &description,
                &exercise.objective,
            )
            .await,
            "exercise insights",
        );
        Ok(Briefing {
            exercise_title: exercise.title.clone(),
            description,
            insights,
        })
    }

    /// Estimated days for the whole timeline and the learner's current day.
    pub async fn program_length(&self, session_id: SessionId) -> EngineResult<ProgramLength> {
        let timeline = self.load_timeline(session_id).await?;
        let exercises = timeline.exercises();
        let titles: Vec<&str> = exercises.iter().map(|e| e.title.as_str()).collect();
        let estimate = settle(
            estimate_program_length(self.generator.as_ref(), &self.prompts, &titles).await,
            "program length",
        );
        let completed = exercises
            .iter()
            .filter(|e| e.status == ExerciseStatus::Completed)
            .count();
        Ok(ProgramLength {
            current_day: current_day(completed, exercises.len(), estimate.days),
            days: estimate.days,
            rationale: estimate.rationale,
        })
    }

    /// The message log of one exercise in timestamp order.
    pub async fn messages(
        &self,
        session_id: SessionId,
        exercise_title: &str,
    ) -> EngineResult<Vec<Message>> {
        self.require_session(session_id).await?;
        Ok(self.store.list_messages(session_id, exercise_title).await?)
    }

    /// Returns the opening scenario of the named exercise, generating and
    /// storing it on first use.
    ///
    /// Once the log holds learner messages no opening is generated any more;
    /// an opening only ever comes first. Callers hold the exercise's turn
    /// lock for the title they pass.
    pub async fn opening_content(
        &self,
        session_id: SessionId,
        exercise_title: &str,
    ) -> EngineResult<Opening> {
        let timeline = self.load_timeline(session_id).await?;
        let exercise = timeline
            .find_by_title(exercise_title)
            .ok_or_else(|| EngineError::not_found("exercise", exercise_title))?;
        let opening = |text: String| Opening {
            exercise_title: exercise.title.clone(),
            text,
        };
        if exercise.kind != ExerciseKind::Simulation {
            return Ok(opening(String::new()));
        }

        let log = self.store.list_messages(session_id, &exercise.title).await?;
        if let Some(existing) = log.iter().find(|m| m.sender == Sender::System) {
            return Ok(opening(existing.text.clone()));
        }
        if !log.is_empty() {
            return Ok(opening(String::new()));
        }

        let guidance = guidance_for(timeline.exercises());
        let text = match generate_opening(
            self.generator.as_ref(),
            &self.prompts,
            &exercise.title,
            &exercise.objective,
            &guidance,
        )
        .await
        {
            Ok(text) => text,
            Err(cause) => {
                warn!(error = %format!("{cause:#}"), exercise = %exercise.title, "Opening generation failed");
                match self.catalog.fallback_scenario(&exercise.title) {
                    Some(fallback) => fallback.to_string(),
                    None => return Ok(opening(String::new())),
                }
            }
        };

        let mut log = ConversationLog::new(log);
        log.append(Sender::System, text.clone(), Some(opening_metadata()));
        let (_, pending) = log.into_parts();
        self.store
            .append_messages(session_id, &exercise.title, pending)
            .await?;
        info!(%session_id, exercise = %exercise.title, "Opening scenario stored");
        Ok(opening(text))
    }

    /// Returns the payload of the named exercise, or of the active one when
    /// no title is given, generating and caching it on first use.
    pub async fn exercise_content(
        &self,
        session_id: SessionId,
        exercise_title: Option<&str>,
    ) -> EngineResult<Option<ExerciseMaterial>> {
        let timeline = self.load_timeline(session_id).await?;
        let exercise = match exercise_title {
            Some(title) => Some(
                timeline
                    .find_by_title(title)
                    .ok_or_else(|| EngineError::not_found("exercise", title))?,
            ),
            None => timeline.active(),
        };
        let Some(exercise) = exercise else {
            return Ok(None);
        };

        let content = self.content_for(exercise, timeline.exercises()).await?;
        Ok(Some(ExerciseMaterial {
            exercise_title: exercise.title.clone(),
            kind: exercise.kind,
            content,
        }))
    }

    async fn content_for(
        &self,
        exercise: &Exercise,
        history: &[Exercise],
    ) -> EngineResult<ExerciseContent> {
        if let Some(content) = &exercise.content {
            return Ok(content.clone());
        }
        let guidance = guidance_for(history);
        let outcome = generate_content(
            self.generator.as_ref(),
            &self.prompts,
            ContentRequest {
                kind: exercise.kind,
                title: &exercise.title,
                objective: &exercise.objective,
                guidance: &guidance,
            },
        )
        .await;
        let content = settle(outcome, "exercise content");
        self.store.save_content(exercise.id, &content).await?;
        info!(exercise = %exercise.title, kind = %exercise.kind, "Exercise content cached");
        Ok(content)
    }

    /// Judges a learner's answer to a written exercise. The timeline is not
    /// changed; the caller stores the grade when it completes the exercise
    /// through [`Self::advance`].
    pub async fn evaluate(
        &self,
        session_id: SessionId,
        exercise_title: &str,
        response: &str,
    ) -> EngineResult<Evaluation> {
        let timeline = self.load_timeline(session_id).await?;
        let exercise = timeline
            .find_by_title(exercise_title)
            .ok_or_else(|| EngineError::not_found("exercise", exercise_title))?;
        if exercise.kind == ExerciseKind::Simulation {
            return Err(EngineError::Validation(format!(
                "'{exercise_title}' is a simulation and is graded from its conversation"
            )));
        }

        let content = self.content_for(exercise, timeline.exercises()).await?;
        let outcome = evaluate_response(
            self.generator.as_ref(),
            &self.prompts,
            &exercise.title,
            &content,
            response,
        )
        .await
        .ok_or_else(|| {
            EngineError::Validation(format!("'{exercise_title}' has no written answer to evaluate"))
        })?;
        Ok(settle(outcome, "evaluation"))
    }

    /// Grades the active simulation from its transcript and advances the
    /// timeline. A failed grading still advances, without a grade.
    pub async fn complete_simulation(
        &self,
        session_id: SessionId,
    ) -> EngineResult<Option<SimulationOutcome>> {
        let mut timeline = self.load_timeline(session_id).await?;
        let Some(exercise) = timeline.active() else {
            return Ok(None);
        };
        if exercise.kind != ExerciseKind::Simulation {
            return Err(EngineError::Validation(format!(
                "'{}' is not a simulation",
                exercise.title
            )));
        }
        let (exercise_id, title) = (exercise.id, exercise.title.clone());

        let log = ConversationLog::new(self.store.list_messages(session_id, &title).await?);
        let graded = grade_transcript(
            self.generator.as_ref(),
            &self.prompts,
            &title,
            &log.entries(),
        )
        .await;
        let (completion, feedback) = match graded {
            Ok(grade) => (
                Some(Completion {
                    grade: grade.grade.map(i64::from),
                    feedback: Some(grade.feedback.clone()),
                }),
                grade.feedback,
            ),
            Err(Fallback { value, cause }) => {
                warn!(error = %format!("{cause:#}"), exercise = %title, "Transcript grading failed, completing without a grade");
                (None, value.feedback)
            }
        };

        let transition = timeline.advance(completion);
        self.commit(session_id, &timeline, None).await?;
        let grade = timeline.find(exercise_id).and_then(|e| e.grade);
        info!(%session_id, exercise = %title, ?grade, next = ?transition.next, "Simulation completed");
        Ok(Some(SimulationOutcome {
            grade,
            feedback,
            transition,
        }))
    }

    /// Records the learner's reflection on the active exercise and advances,
    /// in one write. `None` without an active exercise.
    pub async fn reflect(
        &self,
        session_id: SessionId,
        difficulty: i64,
        confidence: i64,
        comment: String,
    ) -> EngineResult<Option<Transition>> {
        let mut timeline = self.load_timeline(session_id).await?;
        let Some(exercise) = timeline.active() else {
            return Ok(None);
        };
        let reflection = NewReflection {
            exercise_title: exercise.title.clone(),
            difficulty: clamp_rating(difficulty),
            confidence: clamp_rating(confidence),
            comment,
        };
        let transition = timeline.advance(None);
        self.commit(session_id, &timeline, Some(reflection)).await?;
        info!(%session_id, previous = ?transition.previous, next = ?transition.next, "Reflection recorded");
        Ok(Some(transition))
    }

    pub async fn performance(&self, session_id: SessionId) -> EngineResult<PerformanceReport> {
        let timeline = self.load_timeline(session_id).await?;
        let history = PerformanceHistory::from_exercises(timeline.exercises());
        let decision = performance::decide(&history);
        let guidance = performance::guidance(&history, &decision);
        let next = timeline
            .exercises()
            .iter()
            .find(|e| e.status == ExerciseStatus::Planned);
        Ok(PerformanceReport {
            next_exercise: next.map(|e| e.title.clone()),
            suggested_difficulty: next.map(|e| e.difficulty.adjusted(decision.adjustment)),
            history,
            decision,
            guidance,
        })
    }
}
