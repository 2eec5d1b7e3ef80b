// src/handlers/dashboard.rs

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    error::AppError,
    models::dashboard::DateRangeParams,
    services::Services,
    utils::jwt::Claims,
};

pub async fn failed_answers(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(dashboard_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(services.failed_answers.get_failed_answers(claims.student_id()?, dashboard_id).await?))
}

/// Collects new failed answers. Returns only the ones added.
pub async fn update_failed_answers(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(dashboard_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(services.failed_answers.update_failed_answers(claims.student_id()?, dashboard_id).await?))
}

pub async fn remove_failed_answer(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path((dashboard_id, failed_answer_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    services
        .failed_answers
        .remove_failed_answer(claims.student_id()?, dashboard_id, failed_answer_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn re_add_failed_answers(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(dashboard_id): Path<i64>,
    Query(range): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    check_range(&range)?;
    let restored = services
        .failed_answers
        .re_add_failed_answers(claims.student_id()?, dashboard_id, range.start, range.end)
        .await?;
    Ok(Json(restored))
}

pub async fn filtered_failed_answers(
    State(services): State<Services>,
    Extension(claims): Extension<Claims>,
    Path(dashboard_id): Path<i64>,
    Query(range): Query<DateRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    check_range(&range)?;
    let filtered = services
        .failed_answers
        .get_filtered_failed_answers(claims.student_id()?, dashboard_id, range.start, range.end)
        .await?;
    Ok(Json(filtered))
}

fn check_range(range: &DateRangeParams) -> Result<(), AppError> {
    if range.start > range.end {
        return Err(AppError::BadRequest("start must not be after end".to_string()));
    }
    Ok(())
}
