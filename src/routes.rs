// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, dashboard, quiz},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware},
};

/// Assembles the main application router.
///
/// * Student routes (executions, quizzes, dashboards) require a bearer token.
/// * Admin routes additionally require the `admin` role.
/// * Applies global middleware (Trace, CORS).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let execution_routes = Router::new()
        .route("/{id}/quizzes/available", get(quiz::available_quizzes))
        .route("/{id}/quizzes/solved", get(quiz::solved_quizzes))
        .route("/{id}/quizzes/generate", post(quiz::generate_quiz))
        .route("/{id}/quizzes/tournament", post(quiz::generate_tournament_quiz));

    let quiz_routes = Router::new()
        .route("/conclude", post(quiz::conclude_quiz))
        .route("/{id}/start", post(quiz::start_quiz))
        .route("/{id}/qrcode", get(quiz::quiz_by_qr_code))
        .route("/{id}/submit", post(quiz::submit_answer))
        .route("/{id}/questions/{question_id}", get(quiz::quiz_question));

    let dashboard_routes = Router::new()
        .route("/{id}/failed-answers", get(dashboard::failed_answers))
        .route("/{id}/failed-answers/update", post(dashboard::update_failed_answers))
        .route("/{id}/failed-answers/re-add", post(dashboard::re_add_failed_answers))
        .route("/{id}/failed-answers/filter", get(dashboard::filtered_failed_answers))
        .route("/{id}/failed-answers/{failed_answer_id}", delete(dashboard::remove_failed_answer));

    let student_routes = Router::new()
        .nest("/api/executions", execution_routes)
        .nest("/api/quizzes", quiz_routes)
        .nest("/api/dashboards", dashboard_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route("/quizzes/{id}/quiz-answers", post(admin::create_quiz_answer))
        .route("/quizzes/{id}/write-answers", post(admin::write_quiz_answers))
        .route("/quiz-answers/{id}", delete(admin::delete_quiz_answer))
        .route("/quiz-questions/{id}", delete(admin::remove_quiz_question))
        .route("/maintenance", post(admin::run_maintenance))
        .route("/demo/reset", post(admin::reset_demo))
        .route("/answers/export", get(admin::export_answers))
        .route("/answers/import", post(admin::import_answers))
        // Double middleware protection: Auth first, then Admin check
        .route_layer(middleware::from_fn(admin_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(student_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
