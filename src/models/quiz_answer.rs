// src/models/quiz_answer.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a student answered, shaped by the question type.
/// Stored as a JSON column; an empty answer is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerDetails {
    MultipleChoice { option_ids: Vec<i64> },
    OpenAnswer { text: String },
}

impl AnswerDetails {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerDetails::MultipleChoice { option_ids } => option_ids.is_empty(),
            AnswerDetails::OpenAnswer { text } => text.trim().is_empty(),
        }
    }
}

/// Lifecycle position of a quiz answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerState {
    /// Not completed; `started` once the student first opened the quiz.
    Open { started: bool },
    /// Completed in class; the submission is staged and not yet written.
    PendingReconciliation,
    /// Answers written; eligible for statistics.
    Finalized,
}

/// Represents the 'question_answers' table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub id: i64,
    pub quiz_answer_id: i64,
    pub quiz_question_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    /// Milliseconds spent on the question.
    pub time_taken: Option<i32>,
    pub answer_details: Option<AnswerDetails>,
}

impl QuestionAnswer {
    /// Stores the submitted details, replacing whatever was there.
    /// Returns the stored details, or `None` when the submission was empty.
    pub fn set_answer_details(&mut self, details: Option<&AnswerDetails>) -> Option<&AnswerDetails> {
        self.answer_details = details.filter(|d| !d.is_empty()).cloned();
        self.answer_details.as_ref()
    }

    pub fn is_answered(&self) -> bool {
        self.answer_details.is_some()
    }
}

/// Represents the 'quiz_answers' table: one student's attempt at one quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAnswer {
    pub id: i64,
    pub student_id: i64,
    pub quiz_id: i64,
    pub creation_date: Option<DateTime<Utc>>,
    pub answer_date: Option<DateTime<Utc>>,
    pub completed: bool,
    pub used_in_statistics: bool,
    /// One per quiz question, ordered by sequence.
    pub question_answers: Vec<QuestionAnswer>,
}

impl QuizAnswer {
    pub fn state(&self) -> AnswerState {
        match (self.completed, self.answer_date) {
            (_, Some(_)) => AnswerState::Finalized,
            (true, None) => AnswerState::PendingReconciliation,
            (false, None) => AnswerState::Open {
                started: self.creation_date.is_some(),
            },
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), AnswerState::Open { .. })
    }

    pub fn question_ids(&self) -> Vec<i64> {
        self.question_answers.iter().map(|qa| qa.question_id).collect()
    }

    pub fn question_answer_by_sequence(&mut self, sequence: i32) -> Option<&mut QuestionAnswer> {
        self.question_answers.iter_mut().find(|qa| qa.sequence == sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer() -> QuizAnswer {
        QuizAnswer {
            id: 1,
            student_id: 1,
            quiz_id: 1,
            creation_date: None,
            answer_date: None,
            completed: false,
            used_in_statistics: false,
            question_answers: vec![],
        }
    }

    #[test]
    fn test_state_progression() {
        let mut qa = answer();
        assert_eq!(qa.state(), AnswerState::Open { started: false });

        qa.creation_date = Some(Utc::now());
        assert_eq!(qa.state(), AnswerState::Open { started: true });
        assert!(qa.is_open());

        qa.completed = true;
        assert_eq!(qa.state(), AnswerState::PendingReconciliation);
        assert!(!qa.is_open());

        qa.answer_date = Some(Utc::now());
        assert_eq!(qa.state(), AnswerState::Finalized);
    }

    #[test]
    fn test_empty_details_are_not_stored() {
        let mut qa = QuestionAnswer {
            id: 1,
            quiz_answer_id: 1,
            quiz_question_id: 1,
            question_id: 1,
            sequence: 1,
            time_taken: None,
            answer_details: Some(AnswerDetails::OpenAnswer { text: "old".into() }),
        };

        let blank = AnswerDetails::OpenAnswer { text: "   ".into() };
        assert!(qa.set_answer_details(Some(&blank)).is_none());
        assert!(!qa.is_answered());

        let choice = AnswerDetails::MultipleChoice { option_ids: vec![3] };
        assert_eq!(qa.set_answer_details(Some(&choice)), Some(&choice));
    }
}
