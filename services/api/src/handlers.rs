//! Axum Handlers for the REST API
//!
//! Thin adapters from HTTP to the practice engine. Each handler documents
//! itself for the OpenAPI spec with `utoipa`.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use parley_core::EngineError;
use parley_core::model::{DifficultyBand, ExerciseId, ExerciseStatus};
use parley_core::timeline::Completion;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    models::{
        AdvancePayload, BriefingView, CompletionView, ContentQuery, ContentView, ErrorResponse,
        EvaluatePayload, EvaluationView, ExerciseView, GradePayload, GradeRecorded, MessageView,
        MessagesQuery, OpeningView, PerformanceView, ProgramLengthView, ReflectionPayload,
        SessionCreated, SwapPayload, TransitionView, TurnPayload, TurnResponse,
    },
    state::AppState,
};

pub const NO_ACTIVE_EXERCISE: &str = "No active exercise";

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    InternalServerError(anyhow::Error),
}

impl ApiError {
    fn no_active_exercise() -> Self {
        ApiError::Conflict(NO_ACTIVE_EXERCISE.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { message })).into_response()
            }
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::Conflict(message) => {
                (StatusCode::CONFLICT, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            EngineError::Validation(message) => ApiError::BadRequest(message),
            EngineError::Persistence(cause) => ApiError::InternalServerError(cause),
        }
    }
}

/// Create a practice session seeded with the exercise catalog.
#[utoipa::path(
    post,
    path = "/sessions",
    responses(
        (status = 201, description = "Session created successfully", body = SessionCreated),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn create_session(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, exercises) = state.engine.create_session().await?;
    Ok((
        StatusCode::CREATED,
        Json(SessionCreated::new(session, exercises)),
    ))
}

/// List the session's exercises in order.
#[utoipa::path(
    get,
    path = "/sessions/{id}/timeline",
    responses(
        (status = 200, description = "Exercises in creation order", body = [ExerciseView]),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_timeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ExerciseView>>, ApiError> {
    let exercises = state.engine.timeline(id).await?;
    Ok(Json(exercises.into_iter().map(ExerciseView::from).collect()))
}

/// Complete the active exercise and move on to the next planned one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    request_body = AdvancePayload,
    responses(
        (status = 200, description = "Timeline advanced", body = TransitionView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn advance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdvancePayload>,
) -> Result<Json<TransitionView>, ApiError> {
    let completion = (payload.grade.is_some() || payload.feedback.is_some()).then(|| Completion {
        grade: payload.grade,
        feedback: payload.feedback,
    });
    let transition = state.engine.advance(id, completion).await?;
    Ok(Json(transition.into()))
}

/// Make an exercise the active one.
#[utoipa::path(
    post,
    path = "/sessions/{id}/exercises/{exercise_id}/select",
    responses(
        (status = 200, description = "Exercise selected", body = TransitionView),
        (status = 404, description = "Session or exercise not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("exercise_id" = i64, Path, description = "Exercise ID")
    )
)]
pub async fn select_exercise(
    State(state): State<Arc<AppState>>,
    Path((id, exercise_id)): Path<(Uuid, ExerciseId)>,
) -> Result<Json<TransitionView>, ApiError> {
    let transition = state.engine.select(id, exercise_id).await?;
    Ok(Json(transition.into()))
}

/// Swap the active exercise for another of similar difficulty.
#[utoipa::path(
    post,
    path = "/sessions/{id}/swap",
    request_body = SwapPayload,
    responses(
        (status = 200, description = "Exercise swapped", body = TransitionView),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "No active exercise", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn swap_exercise(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SwapPayload>,
) -> Result<Json<TransitionView>, ApiError> {
    let band = payload.difficulty.as_deref().map(DifficultyBand::parse_label);
    let transition = state
        .engine
        .swap_similar(id, band)
        .await?
        .ok_or_else(ApiError::no_active_exercise)?;
    Ok(Json(transition.into()))
}

/// Flag an exercise as actively engaged with.
#[utoipa::path(
    post,
    path = "/sessions/{id}/exercises/{exercise_id}/start",
    responses(
        (status = 200, description = "Exercise marked as started", body = ExerciseView),
        (status = 404, description = "Session or exercise not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("exercise_id" = i64, Path, description = "Exercise ID")
    )
)]
pub async fn start_exercise(
    State(state): State<Arc<AppState>>,
    Path((id, exercise_id)): Path<(Uuid, ExerciseId)>,
) -> Result<Json<ExerciseView>, ApiError> {
    let exercise = state.engine.mark_started(id, exercise_id).await?;
    Ok(Json(exercise.into()))
}

/// Re-grade a completed exercise.
#[utoipa::path(
    post,
    path = "/sessions/{id}/exercises/{exercise_id}/grade",
    request_body = GradePayload,
    responses(
        (status = 200, description = "Grade stored, or ignored unless the exercise was started and completed", body = GradeRecorded),
        (status = 404, description = "Session or exercise not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("exercise_id" = i64, Path, description = "Exercise ID")
    )
)]
pub async fn grade_exercise(
    State(state): State<Arc<AppState>>,
    Path((id, exercise_id)): Path<(Uuid, ExerciseId)>,
    Json(payload): Json<GradePayload>,
) -> Result<Json<GradeRecorded>, ApiError> {
    let grade = state
        .engine
        .record_grade(id, exercise_id, payload.grade, payload.feedback)
        .await?;
    Ok(Json(GradeRecorded { grade }))
}

/// Send a learner message and get the counterpart's reply and coach tips.
#[utoipa::path(
    post,
    path = "/sessions/{id}/turns",
    request_body = TurnPayload,
    responses(
        (status = 200, description = "Turn completed", body = TurnResponse),
        (status = 400, description = "Bad request", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Turn could not be saved", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn take_turn(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TurnPayload>,
) -> Result<Json<TurnResponse>, ApiError> {
    if payload.text.trim().is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    let _guard = state.turn_locks.acquire(id, &payload.exercise_title).await;
    let outcome = state
        .engine
        .handle_turn(id, &payload.exercise_title, &payload.text)
        .await?;
    info!(session_id = %id, tips = outcome.coach_tips.len(), "Turn served");
    Ok(Json(outcome.into()))
}

/// The message log of one exercise.
#[utoipa::path(
    get,
    path = "/sessions/{id}/messages",
    responses(
        (status = 200, description = "Messages in timestamp order", body = [MessageView]),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"), MessagesQuery)
)]
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<MessageView>>, ApiError> {
    let messages = state.engine.messages(id, &query.exercise_title).await?;
    Ok(Json(messages.into_iter().map(MessageView::from).collect()))
}

/// The opening scenario of the active simulation, generated on first use.
#[utoipa::path(
    get,
    path = "/sessions/{id}/opening",
    responses(
        (status = 200, description = "Opening scenario, empty for other exercise kinds", body = OpeningView),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "No active exercise", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn get_opening(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<OpeningView>, ApiError> {
    // The opening shares the turn lock so it is never generated twice.
    let active = state
        .engine
        .timeline(id)
        .await?
        .into_iter()
        .find(|e| e.status == ExerciseStatus::InProgress)
        .ok_or_else(ApiError::no_active_exercise)?;
    let _guard = state.turn_locks.acquire(id, &active.title).await;
    let opening = state.engine.opening_content(id, &active.title).await?;
    Ok(Json(opening.into()))
}

/// The generated payload of an exercise, cached after the first request.
#[utoipa::path(
    get,
    path = "/sessions/{id}/content",
    responses(
        (status = 200, description = "Exercise content", body = ContentView),
        (status = 404, description = "Session or exercise not found", body = ErrorResponse),
        (status = 409, description = "No active exercise", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"), ContentQuery)
)]
pub async fn get_content(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ContentView>, ApiError> {
    let material = state
        .engine
        .exercise_content(id, query.exercise_title.as_deref())
        .await?
        .ok_or_else(ApiError::no_active_exercise)?;
    Ok(Json(material.into()))
}

/// Evaluate a written answer to an analysis, interpretation, planning or
/// technique exercise.
#[utoipa::path(
    post,
    path = "/sessions/{id}/evaluations",
    request_body = EvaluatePayload,
    responses(
        (status = 200, description = "Evaluation of the answer", body = EvaluationView),
        (status = 400, description = "The exercise is a simulation", body = ErrorResponse),
        (status = 404, description = "Session or exercise not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn evaluate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EvaluatePayload>,
) -> Result<Json<EvaluationView>, ApiError> {
    let evaluation = state
        .engine
        .evaluate(id, &payload.exercise_title, &payload.response)
        .await?;
    Ok(Json(evaluation.into()))
}

/// Grade the active simulation from its conversation and advance.
#[utoipa::path(
    post,
    path = "/sessions/{id}/complete",
    responses(
        (status = 200, description = "Simulation graded and timeline advanced", body = CompletionView),
        (status = 400, description = "The active exercise is not a simulation", body = ErrorResponse),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "No active exercise", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn complete_simulation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionView>, ApiError> {
    let outcome = state
        .engine
        .complete_simulation(id)
        .await?
        .ok_or_else(ApiError::no_active_exercise)?;
    Ok(Json(outcome.into()))
}

/// Record a reflection on the active exercise and advance.
#[utoipa::path(
    post,
    path = "/sessions/{id}/reflections",
    request_body = ReflectionPayload,
    responses(
        (status = 201, description = "Reflection recorded", body = TransitionView),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 409, description = "No active exercise", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn reflect(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReflectionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    let transition = state
        .engine
        .reflect(id, payload.difficulty, payload.confidence, payload.comment)
        .await?
        .ok_or_else(ApiError::no_active_exercise)?;
    Ok((StatusCode::CREATED, Json(TransitionView::from(transition))))
}

/// Performance history, difficulty decision and guidance for the session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/performance",
    responses(
        (status = 200, description = "Performance report", body = PerformanceView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn performance(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PerformanceView>, ApiError> {
    let report = state.engine.performance(id).await?;
    Ok(Json(report.into()))
}

/// Exercises the learner can switch to, i.e. all but the active one.
#[utoipa::path(
    get,
    path = "/sessions/{id}/available",
    responses(
        (status = 200, description = "Exercises not in progress, in creation order", body = [ExerciseView]),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn available_exercises(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ExerciseView>>, ApiError> {
    let exercises = state.engine.available_exercises(id).await?;
    Ok(Json(exercises.into_iter().map(ExerciseView::from).collect()))
}

/// A short description of an exercise and why it matters.
#[utoipa::path(
    get,
    path = "/sessions/{id}/exercises/{exercise_id}/briefing",
    responses(
        (status = 200, description = "Exercise briefing, fixed text when generation fails", body = BriefingView),
        (status = 404, description = "Session or exercise not found", body = ErrorResponse)
    ),
    params(
        ("id" = Uuid, Path, description = "Session ID"),
        ("exercise_id" = i64, Path, description = "Exercise ID")
    )
)]
pub async fn get_briefing(
    State(state): State<Arc<AppState>>,
    Path((id, exercise_id)): Path<(Uuid, ExerciseId)>,
) -> Result<Json<BriefingView>, ApiError> {
    let briefing = state.engine.briefing(id, exercise_id).await?;
    Ok(Json(briefing.into()))
}

/// Estimated length of the program in days and the learner's current day.
#[utoipa::path(
    get,
    path = "/sessions/{id}/program-length",
    responses(
        (status = 200, description = "Program length estimate", body = ProgramLengthView),
        (status = 404, description = "Session not found", body = ErrorResponse)
    ),
    params(("id" = Uuid, Path, description = "Session ID"))
)]
pub async fn program_length(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProgramLengthView>, ApiError> {
    let length = state.engine.program_length(id).await?;
    Ok(Json(length.into()))
}
