//! API Models
//!
//! Request payloads and response bodies of the HTTP surface, documented
//! with `utoipa`. Engine types are converted into these at the edge so the
//! core crate stays free of HTTP and schema concerns.

use chrono::{DateTime, Utc};
use parley_core::briefing::{Briefing, ProgramLength};
use parley_core::content::ExerciseContent;
use parley_core::engine::{ExerciseMaterial, Opening, PerformanceReport, SimulationOutcome};
use parley_core::evaluation::{AssessmentLevel, Evaluation};
use parley_core::model::{
    DifficultyBand, Exercise, ExerciseKind, ExerciseStatus, Message, Sender, Session,
};
use parley_core::performance::{Consistency, DifficultyAdjustment};
use parley_core::timeline::Transition;
use parley_core::TurnOutcome;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ExerciseView {
    pub id: i64,
    pub title: String,
    pub objective: String,
    #[schema(value_type = String, example = "in_progress")]
    pub status: ExerciseStatus,
    #[schema(value_type = String, example = "simulation")]
    pub kind: ExerciseKind,
    #[schema(value_type = String, example = "beginner")]
    pub difficulty: DifficultyBand,
    /// Dot marker for display, e.g. `●●`.
    pub difficulty_marker: String,
    pub skill_focus: String,
    pub estimated_time: String,
    pub grade: Option<u8>,
    pub feedback: Option<String>,
    pub started: bool,
    pub position: i32,
}

impl From<Exercise> for ExerciseView {
    fn from(exercise: Exercise) -> Self {
        Self {
            id: exercise.id,
            title: exercise.title,
            objective: exercise.objective,
            status: exercise.status,
            kind: exercise.kind,
            difficulty_marker: exercise.difficulty.marker(),
            difficulty: exercise.difficulty,
            skill_focus: exercise.skill_focus,
            estimated_time: exercise.estimated_time,
            grade: exercise.grade,
            feedback: exercise.feedback,
            started: exercise.started,
            position: exercise.position,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct SessionCreated {
    #[schema(value_type = String, format = Uuid)]
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub exercises: Vec<ExerciseView>,
}

impl SessionCreated {
    pub fn new(session: Session, exercises: Vec<Exercise>) -> Self {
        Self {
            session_id: session.id,
            created_at: session.created_at,
            exercises: exercises.into_iter().map(ExerciseView::from).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TransitionView {
    #[schema(example = "Light Negotiation Simulation")]
    pub previous: Option<String>,
    pub next: Option<String>,
}

impl From<Transition> for TransitionView {
    fn from(transition: Transition) -> Self {
        Self {
            previous: transition.previous,
            next: transition.next,
        }
    }
}

#[derive(Deserialize, ToSchema, Default, Debug)]
pub struct AdvancePayload {
    /// Grade for the finished exercise; clamped to 0..=5.
    #[schema(example = 4)]
    pub grade: Option<i64>,
    pub feedback: Option<String>,
}

#[derive(Deserialize, ToSchema, Default, Debug)]
pub struct SwapPayload {
    /// A band name, `Level N` or a dot marker. Defaults to the active
    /// exercise's band.
    #[schema(example = "intermediate")]
    pub difficulty: Option<String>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct GradePayload {
    #[schema(example = 4)]
    pub grade: i64,
    pub feedback: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct GradeRecorded {
    /// The stored grade, absent when the exercise was never started.
    pub grade: Option<u8>,
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct TurnPayload {
    #[schema(example = "Light Negotiation Simulation")]
    pub exercise_title: String,
    #[schema(example = "I really want to watch the other movie")]
    pub text: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct MessageView {
    pub id: i64,
    #[schema(value_type = String, example = "learner")]
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<serde_json::Value>,
}

impl From<Message> for MessageView {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            sender: message.sender,
            text: message.text,
            timestamp: message.timestamp,
            metadata: message.metadata,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct TurnResponse {
    pub counterpart_reply: String,
    pub coach_tips: Vec<String>,
    pub agreement_reached: bool,
    pub messages: Vec<MessageView>,
}

impl From<TurnOutcome> for TurnResponse {
    fn from(outcome: TurnOutcome) -> Self {
        Self {
            counterpart_reply: outcome.counterpart_reply,
            coach_tips: outcome.coach_tips,
            agreement_reached: outcome.agreement_reached,
            messages: outcome.messages.into_iter().map(MessageView::from).collect(),
        }
    }
}

#[derive(Deserialize, IntoParams, Debug)]
#[into_params(parameter_in = Query)]
pub struct MessagesQuery {
    pub exercise_title: String,
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct ContentQuery {
    /// Defaults to the active exercise.
    pub exercise_title: Option<String>,
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct OpeningView {
    pub exercise_title: String,
    pub text: String,
}

impl From<Opening> for OpeningView {
    fn from(opening: Opening) -> Self {
        Self {
            exercise_title: opening.exercise_title,
            text: opening.text,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ContentView {
    pub exercise_title: String,
    #[schema(value_type = String, example = "planning")]
    pub kind: ExerciseKind,
    #[schema(value_type = Object)]
    pub content: ExerciseContent,
}

impl From<ExerciseMaterial> for ContentView {
    fn from(material: ExerciseMaterial) -> Self {
        Self {
            exercise_title: material.exercise_title,
            kind: material.kind,
            content: material.content,
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct EvaluatePayload {
    #[schema(example = "Building Your BATNA")]
    pub exercise_title: String,
    pub response: String,
}

#[derive(Serialize, Deserialize, ToSchema, Debug, Clone)]
pub struct EvaluationDetailView {
    pub label: String,
    pub text: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct EvaluationView {
    #[schema(value_type = Option<String>, example = "good")]
    pub level: Option<AssessmentLevel>,
    pub grade: Option<u8>,
    pub feedback: String,
    pub details: Vec<EvaluationDetailView>,
}

impl From<Evaluation> for EvaluationView {
    fn from(evaluation: Evaluation) -> Self {
        Self {
            level: evaluation.level,
            grade: evaluation.grade,
            feedback: evaluation.feedback,
            details: evaluation
                .details
                .into_iter()
                .map(|d| EvaluationDetailView {
                    label: d.label,
                    text: d.text,
                })
                .collect(),
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct CompletionView {
    pub grade: Option<u8>,
    pub feedback: String,
    pub transition: TransitionView,
}

impl From<SimulationOutcome> for CompletionView {
    fn from(outcome: SimulationOutcome) -> Self {
        Self {
            grade: outcome.grade,
            feedback: outcome.feedback,
            transition: outcome.transition.into(),
        }
    }
}

#[derive(Deserialize, ToSchema, Debug)]
pub struct ReflectionPayload {
    /// 1..=5, clamped.
    #[schema(example = 3)]
    pub difficulty: i64,
    /// 1..=5, clamped.
    #[schema(example = 4)]
    pub confidence: i64,
    #[serde(default)]
    pub comment: String,
}

#[derive(Serialize, ToSchema, Debug)]
pub struct PerformanceView {
    pub mean_grade: Option<f64>,
    pub recent_grades: Vec<u8>,
    pub recent_feedback: Option<String>,
    #[schema(value_type = Option<String>, example = "high")]
    pub consistency: Option<Consistency>,
    pub completed_count: usize,
    #[schema(value_type = String, example = "same")]
    pub adjustment: DifficultyAdjustment,
    pub reason: String,
    pub guidance: String,
    pub next_exercise: Option<String>,
    #[schema(value_type = Option<String>, example = "advanced")]
    pub suggested_difficulty: Option<DifficultyBand>,
}

impl From<PerformanceReport> for PerformanceView {
    fn from(report: PerformanceReport) -> Self {
        Self {
            mean_grade: report.history.mean_grade,
            recent_grades: report.history.recent_grades,
            recent_feedback: report.history.recent_feedback,
            consistency: report.history.consistency,
            completed_count: report.history.completed_count,
            adjustment: report.decision.adjustment,
            reason: report.decision.reason,
            guidance: report.guidance,
            next_exercise: report.next_exercise,
            suggested_difficulty: report.suggested_difficulty,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct BriefingView {
    pub exercise_title: String,
    #[schema(example = "Define what you will do if the negotiation fails.")]
    pub description: String,
    pub insights: String,
}

impl From<Briefing> for BriefingView {
    fn from(briefing: Briefing) -> Self {
        Self {
            exercise_title: briefing.exercise_title,
            description: briefing.description,
            insights: briefing.insights,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ProgramLengthView {
    #[schema(example = 14)]
    pub days: u32,
    pub rationale: String,
    /// 1-based position of the learner within `days`.
    #[schema(example = 3)]
    pub current_day: u32,
}

impl From<ProgramLength> for ProgramLengthView {
    fn from(length: ProgramLength) -> Self {
        Self {
            days: length.days,
            rationale: length.rationale,
            current_day: length.current_day,
        }
    }
}

#[derive(Serialize, Deserialize, ToSchema, Debug)]
pub struct ErrorResponse {
    pub message: String,
}
