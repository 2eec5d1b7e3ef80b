// src/models/staged.rs
//
// Mailbox of submissions that have been received but not yet written into
// question answers. Rows are deleted once consumed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{quiz_answer::AnswerDetails, statement::StatementAnswer};

/// A whole in-class submission waiting for the reconciliation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswerItem {
    pub id: i64,
    pub quiz_id: i64,
    pub quiz_answer_id: i64,
    pub answer_date: DateTime<Utc>,
    pub answers: Vec<StatementAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizAnswerItem {
    pub quiz_id: i64,
    pub quiz_answer_id: i64,
    pub answer_date: DateTime<Utc>,
    pub answers: Vec<StatementAnswer>,
}

/// One buffered answer sent while a student is still taking a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswerItem {
    pub id: i64,
    pub username: String,
    pub quiz_id: i64,
    pub quiz_question_id: i64,
    pub answer_date: DateTime<Utc>,
    pub time_taken: Option<i32>,
    pub time_to_submission: i32,
    pub answer_details: Option<AnswerDetails>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuestionAnswerItem {
    pub username: String,
    pub quiz_id: i64,
    pub quiz_question_id: i64,
    pub answer_date: DateTime<Utc>,
    pub time_taken: Option<i32>,
    pub time_to_submission: i32,
    pub answer_details: Option<AnswerDetails>,
}

impl NewQuestionAnswerItem {
    pub fn from_statement(
        username: &str,
        quiz_id: i64,
        answer: &StatementAnswer,
        answer_date: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.to_string(),
            quiz_id,
            quiz_question_id: answer.quiz_question_id,
            answer_date,
            time_taken: answer.time_taken,
            time_to_submission: answer.time_to_submission.unwrap_or(0),
            answer_details: answer.answer_details.clone(),
        }
    }
}
