// src/models/student.rs

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::{question::Question, quiz_answer::QuizAnswer};

/// Represents the 'students' table together with the executions the student is enrolled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Student {
    pub id: i64,

    /// Unique username. Buffered answers are keyed by it.
    pub username: String,

    pub course_execution_ids: Vec<i64>,
}

impl Student {
    pub fn is_enrolled(&self, course_execution_id: i64) -> bool {
        self.course_execution_ids.contains(&course_execution_id)
    }
}

/// How a student has fared on one question so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub answered: u32,
    pub correct: u32,
}

impl QuestionRecord {
    pub fn ever_failed(&self) -> bool {
        self.correct < self.answered
    }
}

/// Per-question answer history, used to bias question selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentModel {
    records: HashMap<i64, QuestionRecord>,
}

impl StudentModel {
    /// Builds the model from finalized attempts, grading only questions in `questions`.
    pub fn from_answers<'a>(
        answers: impl IntoIterator<Item = &'a QuizAnswer>,
        questions: &HashMap<i64, Question>,
    ) -> Self {
        let mut model = Self::default();
        for quiz_answer in answers.into_iter().filter(|qa| qa.answer_date.is_some()) {
            for answer in &quiz_answer.question_answers {
                if let Some(question) = questions.get(&answer.question_id) {
                    model.record(question.id, question.is_correct(answer.answer_details.as_ref()));
                }
            }
        }
        model
    }

    pub fn record(&mut self, question_id: i64, correct: bool) {
        let entry = self.records.entry(question_id).or_default();
        entry.answered += 1;
        if correct {
            entry.correct += 1;
        }
    }

    pub fn get(&self, question_id: i64) -> Option<&QuestionRecord> {
        self.records.get(&question_id)
    }
}
