//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API and its OpenAPI documentation.

use crate::{
    handlers,
    models::{
        AdvancePayload, BriefingView, CompletionView, ContentView, ErrorResponse,
        EvaluatePayload, EvaluationDetailView, EvaluationView, ExerciseView, GradePayload,
        GradeRecorded, MessageView, OpeningView, PerformanceView, ProgramLengthView,
        ReflectionPayload, SessionCreated, SwapPayload, TransitionView, TurnPayload, TurnResponse,
    },
    state::AppState,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::create_session,
        handlers::get_timeline,
        handlers::advance,
        handlers::select_exercise,
        handlers::swap_exercise,
        handlers::start_exercise,
        handlers::grade_exercise,
        handlers::take_turn,
        handlers::list_messages,
        handlers::get_opening,
        handlers::get_content,
        handlers::evaluate,
        handlers::complete_simulation,
        handlers::reflect,
        handlers::performance,
        handlers::available_exercises,
        handlers::get_briefing,
        handlers::program_length,
    ),
    components(
        schemas(
            SessionCreated, ExerciseView, TransitionView, AdvancePayload, SwapPayload,
            GradePayload, GradeRecorded, TurnPayload, TurnResponse, MessageView, OpeningView,
            ContentView, EvaluatePayload, EvaluationView, EvaluationDetailView, CompletionView,
            ReflectionPayload, PerformanceView, BriefingView, ProgramLengthView, ErrorResponse
        )
    ),
    tags(
        (name = "Parley API", description = "Negotiation practice sessions, turns and exercise timeline")
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/sessions", post(handlers::create_session))
        .route("/sessions/{id}/timeline", get(handlers::get_timeline))
        .route("/sessions/{id}/advance", post(handlers::advance))
        .route(
            "/sessions/{id}/exercises/{exercise_id}/select",
            post(handlers::select_exercise),
        )
        .route("/sessions/{id}/swap", post(handlers::swap_exercise))
        .route(
            "/sessions/{id}/exercises/{exercise_id}/start",
            post(handlers::start_exercise),
        )
        .route(
            "/sessions/{id}/exercises/{exercise_id}/grade",
            post(handlers::grade_exercise),
        )
        .route("/sessions/{id}/turns", post(handlers::take_turn))
        .route("/sessions/{id}/messages", get(handlers::list_messages))
        .route("/sessions/{id}/opening", get(handlers::get_opening))
        .route("/sessions/{id}/content", get(handlers::get_content))
        .route("/sessions/{id}/evaluations", post(handlers::evaluate))
        .route("/sessions/{id}/complete", post(handlers::complete_simulation))
        .route("/sessions/{id}/reflections", post(handlers::reflect))
        .route("/sessions/{id}/performance", get(handlers::performance))
        .route("/sessions/{id}/available", get(handlers::available_exercises))
        .route(
            "/sessions/{id}/exercises/{exercise_id}/briefing",
            get(handlers::get_briefing),
        )
        .route("/sessions/{id}/program-length", get(handlers::program_length))
        // Apply the state ONLY to this group of routes.
        .with_state(app_state);

    // Create the final router that merges the stateful routes
    // with the stateless routes (like Swagger UI).
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
