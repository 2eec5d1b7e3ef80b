// src/models/dashboard.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'dashboards' table: one per student and course execution.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Dashboard {
    pub id: i64,
    pub student_id: i64,
    pub course_execution_id: i64,
    pub last_check_failed_answers: DateTime<Utc>,
}

/// Represents the 'failed_answers' table: a wrong answer tracked on a dashboard.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct FailedAnswer {
    pub id: i64,
    pub dashboard_id: i64,
    pub question_answer_id: i64,
    pub quiz_answer_id: i64,
    pub question_id: i64,
    /// When the failed answer was given.
    pub collected: DateTime<Utc>,
    pub removed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFailedAnswer {
    pub dashboard_id: i64,
    pub question_answer_id: i64,
    pub quiz_answer_id: i64,
    pub question_id: i64,
    pub collected: DateTime<Utc>,
}

/// Query parameters for date-filtered failed answer operations.
#[derive(Debug, Clone, Deserialize)]
pub struct DateRangeParams {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}
