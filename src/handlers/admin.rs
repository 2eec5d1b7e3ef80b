// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    services::{Services, exchange::AnswerCorpus},
};

/// DTO for creating an attempt on behalf of a student.
#[derive(Debug, Deserialize)]
pub struct CreateQuizAnswerRequest {
    pub student_id: i64,
}

/// Creates a quiz answer for a student.
/// Admin only.
pub async fn create_quiz_answer(
    State(services): State<Services>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuizAnswerRequest>,
) -> Result<impl IntoResponse, AppError> {
    let view = services
        .answers
        .create_quiz_answer(payload.student_id, quiz_id)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Writes the staged in-class submissions of one quiz.
/// Admin only.
pub async fn write_quiz_answers(
    State(services): State<Services>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(services.answers.write_quiz_answers(quiz_id).await?))
}

pub async fn delete_quiz_answer(
    State(services): State<Services>,
    Path(quiz_answer_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    services.answers.delete_quiz_answer(quiz_answer_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn remove_quiz_question(
    State(services): State<Services>,
    Path(quiz_question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    services.generator.remove_quiz_question(quiz_question_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Runs the maintenance sweep now instead of waiting for the scheduler.
pub async fn run_maintenance(State(services): State<Services>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(
        services
            .answers
            .write_quiz_answers_and_calculate_statistics()
            .await?,
    ))
}

pub async fn reset_demo(State(services): State<Services>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(services.answers.reset_demo_answers().await?))
}

pub async fn export_answers(State(services): State<Services>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(services.answers.export_answers().await?))
}

pub async fn import_answers(
    State(services): State<Services>,
    Json(corpus): Json<AnswerCorpus>,
) -> Result<impl IntoResponse, AppError> {
    let summary = services.answers.import_answers(&corpus).await?;
    tracing::info!(imported = summary.imported, "Admin imported answers");
    Ok(Json(summary))
}
