// src/models/statement.rs
//
// DTOs exchanged with students while they take a quiz.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{
    question::{Question, StatementQuestion},
    quiz::{Quiz, QuizType},
    quiz_answer::{AnswerDetails, QuestionAnswer, QuizAnswer},
};

/// One answer as submitted by a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementAnswer {
    pub question_answer_id: i64,
    pub quiz_question_id: i64,
    #[serde(default)]
    pub sequence: i32,
    #[serde(default)]
    pub time_taken: Option<i32>,
    /// Milliseconds from quiz start to submission; buffered answers default it to 0.
    #[serde(default)]
    pub time_to_submission: Option<i32>,
    #[serde(default)]
    pub answer_details: Option<AnswerDetails>,
}

impl StatementAnswer {
    /// Blank slot for a question answer, to be filled in by the client.
    pub fn blank(question_answer: &QuestionAnswer) -> Self {
        Self {
            question_answer_id: question_answer.id,
            quiz_question_id: question_answer.quiz_question_id,
            sequence: question_answer.sequence,
            time_taken: None,
            time_to_submission: None,
            answer_details: None,
        }
    }
}

impl From<&QuestionAnswer> for StatementAnswer {
    fn from(question_answer: &QuestionAnswer) -> Self {
        Self {
            time_taken: question_answer.time_taken,
            answer_details: question_answer.answer_details.clone(),
            ..Self::blank(question_answer)
        }
    }
}

/// The quiz as handed to a student: questions plus one answer slot per question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementQuiz {
    pub id: i64,
    pub quiz_answer_id: i64,
    pub title: String,
    pub quiz_type: QuizType,
    pub available_date: Option<DateTime<Utc>>,
    pub conclusion_date: Option<DateTime<Utc>>,
    pub questions: Vec<StatementQuestion>,
    pub answers: Vec<StatementAnswer>,
}

/// Result of opening a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QuizStatement {
    Ready(StatementQuiz),
    /// The quiz opens later; nothing about its questions is revealed.
    Pending { time_to_availability: i64 },
}

impl QuizStatement {
    pub fn ready(self) -> Option<StatementQuiz> {
        match self {
            QuizStatement::Ready(statement) => Some(statement),
            QuizStatement::Pending { .. } => None,
        }
    }
}

/// DTO for concluding a quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcludeQuizRequest {
    pub quiz_answer_id: i64,
    #[serde(default)]
    pub answers: Vec<StatementAnswer>,
}

/// Per-question grading returned when a quiz is concluded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectAnswer {
    pub sequence: i32,
    pub question_answer_id: i64,
    pub correct: bool,
    pub correct_answer: AnswerDetails,
}

impl CorrectAnswer {
    pub fn new(answer: &QuestionAnswer, question: &Question) -> Self {
        Self {
            sequence: answer.sequence,
            question_answer_id: answer.id,
            correct: question.is_correct(answer.answer_details.as_ref()),
            correct_answer: question.correct_answer(),
        }
    }
}

/// DTO for generating a personal quiz from an assessment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct StatementCreation {
    pub assessment: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub number_of_questions: usize,
}

/// The tournament a quiz is generated for, as provided by the tournament service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tournament {
    pub id: i64,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// DTO for generating a tournament quiz from a set of topics.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct TournamentQuizRequest {
    pub tournament: Tournament,
    #[validate(length(min = 1))]
    pub topics: Option<Vec<i64>>,
    #[validate(range(min = 1, max = 100))]
    pub number_of_questions: usize,
}

/// A quiz a student may open, as listed for a course execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSummary {
    pub id: i64,
    pub title: String,
    pub quiz_type: QuizType,
    pub available_date: Option<DateTime<Utc>>,
    pub conclusion_date: Option<DateTime<Utc>>,
    pub number_of_questions: usize,
}

impl From<&Quiz> for QuizSummary {
    fn from(quiz: &Quiz) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title.clone(),
            quiz_type: quiz.quiz_type,
            available_date: quiz.available_date,
            conclusion_date: quiz.conclusion_date,
            number_of_questions: quiz.questions.len(),
        }
    }
}

/// A graded attempt whose results may be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolvedQuiz {
    pub quiz_answer_id: i64,
    pub quiz: QuizSummary,
    pub answer_date: DateTime<Utc>,
    pub answers: Vec<StatementAnswer>,
    pub correct_answers: Vec<CorrectAnswer>,
}

/// Summary of a stored attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswerView {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub creation_date: Option<DateTime<Utc>>,
    pub answer_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub number_of_questions: usize,
}

impl From<&QuizAnswer> for QuizAnswerView {
    fn from(qa: &QuizAnswer) -> Self {
        Self {
            id: qa.id,
            student_id: qa.student_id,
            quiz_id: qa.quiz_id,
            creation_date: qa.creation_date,
            answer_date: qa.answer_date,
            completed: qa.completed,
            number_of_questions: qa.question_answers.len(),
        }
    }
}
