// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use std::fmt;

/// Entities that can be looked up by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Student,
    Quiz,
    QuizAnswer,
    QuizQuestion,
    Question,
    QuestionAnswer,
    Assessment,
    CourseExecution,
    Dashboard,
    FailedAnswer,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Student => "Student",
            Entity::Quiz => "Quiz",
            Entity::QuizAnswer => "Quiz answer",
            Entity::QuizQuestion => "Quiz question",
            Entity::Question => "Question",
            Entity::QuestionAnswer => "Question answer",
            Entity::Assessment => "Assessment",
            Entity::CourseExecution => "Course execution",
            Entity::Dashboard => "Dashboard",
            Entity::FailedAnswer => "Failed answer",
        };
        f.write_str(name)
    }
}

/// Broad category of an [`AppError`]. Only `Transient` is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Enrollment,
    Ownership,
    Temporal,
    State,
    Capacity,
    Transient,
    BadRequest,
    Auth,
    Internal,
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // 404 Not Found
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: String },

    // 403 Forbidden
    #[error("User {0} is not enrolled in the quiz course execution")]
    UserNotEnrolled(String),
    #[error("{entity} {id} belongs to another student")]
    NotOwner { entity: Entity, id: i64 },

    // 409 Conflict: availability window
    #[error("Quiz is not yet available")]
    QuizNotYetAvailable,
    #[error("Quiz is no longer available")]
    QuizNoLongerAvailable,

    // 409 Conflict: lifecycle state
    #[error("Quiz has already been completed")]
    QuizAlreadyCompleted,
    #[error("Student {student_id} already has an answer for quiz {quiz_id}")]
    QuizAnswerAlreadyExists { student_id: i64, quiz_id: i64 },
    #[error("Quiz question {0} already has answers")]
    QuizQuestionHasAnswers(i32),
    #[error("Quiz can only be started through its QR code")]
    CannotStartQrCodeQuiz,
    #[error("Quiz is not a QR code quiz")]
    NotQrCodeQuiz,

    // 422 Unprocessable Entity
    #[error("Not enough questions: requested {requested}, available {available}")]
    NotEnoughQuestions { requested: usize, available: usize },
    #[error("Not enough questions for the tournament: requested {requested}, available {available}")]
    NotEnoughQuestionsTournament { requested: usize, available: usize },

    // 503 Service Unavailable, retried before it reaches a caller
    #[error("Transient storage conflict: {0}")]
    Transient(String),

    // 400 Bad Request
    #[error("{0}")]
    BadRequest(String),

    // 401 Unauthorized
    #[error("{0}")]
    AuthError(String),

    // 500 Internal Server Error
    #[error("Internal error: {0}")]
    InternalServerError(String),
}

impl AppError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        AppError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::NotFound { .. } => ErrorKind::NotFound,
            AppError::UserNotEnrolled(_) => ErrorKind::Enrollment,
            AppError::NotOwner { .. } => ErrorKind::Ownership,
            AppError::QuizNotYetAvailable | AppError::QuizNoLongerAvailable => {
                ErrorKind::Temporal
            }
            AppError::QuizAlreadyCompleted
            | AppError::QuizAnswerAlreadyExists { .. }
            | AppError::QuizQuestionHasAnswers(_)
            | AppError::CannotStartQrCodeQuiz
            | AppError::NotQrCodeQuiz => ErrorKind::State,
            AppError::NotEnoughQuestions { .. } | AppError::NotEnoughQuestionsTournament { .. } => {
                ErrorKind::Capacity
            }
            AppError::Transient(_) => ErrorKind::Transient,
            AppError::BadRequest(_) => ErrorKind::BadRequest,
            AppError::AuthError(_) => ErrorKind::Auth,
            AppError::InternalServerError(_) => ErrorKind::Internal,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::Transient
    }

    fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Enrollment | ErrorKind::Ownership => StatusCode::FORBIDDEN,
            ErrorKind::Temporal | ErrorKind::State => StatusCode::CONFLICT,
            ErrorKind::Capacity => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Transient => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
            ErrorKind::Auth => StatusCode::UNAUTHORIZED,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Implements `IntoResponse` for `AppError`.
/// Converts the error into a JSON response with appropriate HTTP status code.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let error_message = match &self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                "Internal Server Error".to_string()
            }
            AppError::Transient(msg) => {
                tracing::warn!("Transient storage failure surfaced: {}", msg);
                self.to_string()
            }
            _ => self.to_string(),
        };
        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError`.
/// Serialization failures, deadlocks and pool timeouts are transient; everything else is internal.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::PoolTimedOut => true,
            sqlx::Error::Database(db) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        };
        if transient {
            AppError::Transient(err.to_string())
        } else {
            AppError::InternalServerError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_map_to_status() {
        assert_eq!(
            AppError::not_found(Entity::Quiz, 3).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::UserNotEnrolled("ana".into()).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotOwner { entity: Entity::Dashboard, id: 4 }.status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(AppError::QuizNoLongerAvailable.kind(), ErrorKind::Temporal);
        assert_eq!(AppError::NotQrCodeQuiz.kind(), ErrorKind::State);
        assert_eq!(
            AppError::NotEnoughQuestions {
                requested: 5,
                available: 4
            }
            .status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert!(AppError::Transient("deadlock".into()).is_transient());
        assert!(!AppError::QuizAlreadyCompleted.is_transient());
    }

    #[test]
    fn test_not_found_message_names_entity_and_id() {
        let err = AppError::not_found(Entity::QuestionAnswer, 42);
        assert_eq!(err.to_string(), "Question answer 42 not found");
    }
}
