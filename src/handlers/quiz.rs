// src/handlers/quiz.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::AppError,
    models::statement::{ConcludeQuizRequest, StatementAnswer, StatementCreation, TournamentQuizRequest},
    services::Services,
    utils::jwt::Claims,
};

/// Quizzes the caller can open in a course execution.
pub async fn available_quizzes(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(execution_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let quizzes = services
        .answers
        .get_available_quizzes(claims.student_id()?, execution_id)
        .await?;
    Ok(Json(quizzes))
}

/// The caller's graded attempts in a course execution.
pub async fn solved_quizzes(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(execution_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let solved = services
        .answers
        .get_solved_quizzes(claims.student_id()?, execution_id)
        .await?;
    Ok(Json(solved))
}

pub async fn generate_quiz(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(execution_id): Path<i64>,
    Json(payload): Json<StatementCreation>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let statement = services
        .generator
        .generate_student_quiz(claims.student_id()?, execution_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(statement)))
}

pub async fn generate_tournament_quiz(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(execution_id): Path<i64>,
    Json(payload): Json<TournamentQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let statement = services
        .generator
        .generate_tournament_quiz(claims.student_id()?, execution_id, &payload)
        .await?;
    Ok((StatusCode::CREATED, Json(statement)))
}

pub async fn start_quiz(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let statement = services.answers.start_quiz(claims.student_id()?, quiz_id).await?;
    Ok(Json(statement))
}

/// Opens a QR-code-only quiz, or reports how long until it opens.
pub async fn quiz_by_qr_code(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let statement = services
        .answers
        .get_quiz_by_qr_code(claims.student_id()?, quiz_id)
        .await?;
    Ok(Json(statement))
}

/// Buffers one answer while the quiz is in progress.
pub async fn submit_answer(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<StatementAnswer>,
) -> Result<impl IntoResponse, AppError> {
    let id = services
        .answers
        .submit_answer(&claims.username, quiz_id, &payload)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "id": id }))))
}

pub async fn quiz_question(
    State(services): State<Services>,
    Path((quiz_id, question_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let question = services
        .answers
        .get_question_for_quiz_answer(quiz_id, question_id)
        .await?;
    Ok(Json(question))
}

/// Concludes an attempt. In-class quizzes answer with an empty list until reconciled.
pub async fn conclude_quiz(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<ConcludeQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    let results = services
        .answers
        .conclude_quiz(claims.student_id()?, &payload)
        .await?;
    Ok(Json(results))
}
