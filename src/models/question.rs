// src/models/question.rs

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::quiz::QuizQuestion;
use crate::models::quiz_answer::AnswerDetails;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionStatus {
    Available,
    Disabled,
    Removed,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::Available => "AVAILABLE",
            QuestionStatus::Disabled => "DISABLED",
            QuestionStatus::Removed => "REMOVED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "AVAILABLE" => Some(QuestionStatus::Available),
            "DISABLED" => Some(QuestionStatus::Disabled),
            "REMOVED" => Some(QuestionStatus::Removed),
            _ => None,
        }
    }
}

/// One option of a multiple choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: i64,
    pub content: String,
    pub correct: bool,
}

/// Type-specific part of a question, including its answer key.
/// Stored as a JSON column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice { options: Vec<QuestionOption> },
    OpenAnswer { answer: String },
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,
    pub course_id: i64,
    pub title: String,
    pub content: String,
    pub status: QuestionStatus,
    pub topic_ids: Vec<i64>,
    pub kind: QuestionKind,
}

impl Question {
    pub fn topic_set(&self) -> BTreeSet<i64> {
        self.topic_ids.iter().copied().collect()
    }

    /// A question belongs to an assessment when its topics match one of the
    /// assessment's topic conjunctions exactly.
    pub fn belongs_to_assessment(&self, assessment: &Assessment) -> bool {
        let topics = self.topic_set();
        assessment
            .topic_conjunctions
            .iter()
            .any(|conjunction| conjunction.iter().copied().collect::<BTreeSet<_>>() == topics)
    }

    pub fn has_any_topic(&self, topics: &[i64]) -> bool {
        self.topic_ids.iter().any(|t| topics.contains(t))
    }

    /// Grades an answer. A missing answer is never correct.
    pub fn is_correct(&self, details: Option<&AnswerDetails>) -> bool {
        match (&self.kind, details) {
            (QuestionKind::MultipleChoice { options }, Some(AnswerDetails::MultipleChoice { option_ids })) => {
                let expected: BTreeSet<i64> =
                    options.iter().filter(|o| o.correct).map(|o| o.id).collect();
                let given: BTreeSet<i64> = option_ids.iter().copied().collect();
                !expected.is_empty() && expected == given
            }
            (QuestionKind::OpenAnswer { answer }, Some(AnswerDetails::OpenAnswer { text })) => {
                answer.trim().eq_ignore_ascii_case(text.trim())
            }
            _ => false,
        }
    }

    /// The answer key, in the same shape a student submits.
    pub fn correct_answer(&self) -> AnswerDetails {
        match &self.kind {
            QuestionKind::MultipleChoice { options } => AnswerDetails::MultipleChoice {
                option_ids: options.iter().filter(|o| o.correct).map(|o| o.id).collect(),
            },
            QuestionKind::OpenAnswer { answer } => AnswerDetails::OpenAnswer {
                text: answer.clone(),
            },
        }
    }
}

/// Represents the 'assessments' table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub id: i64,
    pub course_execution_id: i64,
    pub title: String,
    /// Each entry is a set of topic ids a question must carry exactly.
    pub topic_conjunctions: Vec<Vec<i64>>,
}

/// Represents the 'course_executions' table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct CourseExecution {
    pub id: i64,
    pub course_id: i64,
}

/// Option as shown to a student (no correctness flag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementOption {
    pub id: i64,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatementQuestionDetails {
    MultipleChoice { options: Vec<StatementOption> },
    OpenAnswer,
}

/// DTO for sending a quiz question to a student (excludes the answer key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementQuestion {
    pub quiz_question_id: i64,
    pub question_id: i64,
    pub sequence: i32,
    pub title: String,
    pub content: String,
    pub details: StatementQuestionDetails,
}

impl StatementQuestion {
    pub fn new(quiz_question: &QuizQuestion, question: &Question) -> Self {
        let details = match &question.kind {
            QuestionKind::MultipleChoice { options } => StatementQuestionDetails::MultipleChoice {
                options: options
                    .iter()
                    .map(|o| StatementOption {
                        id: o.id,
                        content: o.content.clone(),
                    })
                    .collect(),
            },
            QuestionKind::OpenAnswer { .. } => StatementQuestionDetails::OpenAnswer,
        };

        Self {
            quiz_question_id: quiz_question.id,
            question_id: question.id,
            sequence: quiz_question.sequence,
            title: question.title.clone(),
            content: question.content.clone(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn multiple_choice(topics: Vec<i64>) -> Question {
        Question {
            id: 1,
            course_id: 1,
            title: "Q".into(),
            content: "?".into(),
            status: QuestionStatus::Available,
            topic_ids: topics,
            kind: QuestionKind::MultipleChoice {
                options: vec![
                    QuestionOption { id: 10, content: "A".into(), correct: true },
                    QuestionOption { id: 11, content: "B".into(), correct: false },
                ],
            },
        }
    }

    #[test]
    fn test_multiple_choice_grading() {
        let q = multiple_choice(vec![]);
        let right = AnswerDetails::MultipleChoice { option_ids: vec![10] };
        let wrong = AnswerDetails::MultipleChoice { option_ids: vec![10, 11] };
        assert!(q.is_correct(Some(&right)));
        assert!(!q.is_correct(Some(&wrong)));
        assert!(!q.is_correct(None));
        assert_eq!(q.correct_answer(), right);
    }

    #[test]
    fn test_open_answer_grading_ignores_case_and_padding() {
        let q = Question {
            kind: QuestionKind::OpenAnswer { answer: "Lisbon".into() },
            ..multiple_choice(vec![])
        };
        assert!(q.is_correct(Some(&AnswerDetails::OpenAnswer { text: "  lisbon ".into() })));
        assert!(!q.is_correct(Some(&AnswerDetails::OpenAnswer { text: "Porto".into() })));
        assert!(!q.is_correct(Some(&AnswerDetails::MultipleChoice { option_ids: vec![10] })));
    }

    #[test]
    fn test_assessment_membership_requires_exact_topic_set() {
        let assessment = Assessment {
            id: 1,
            course_execution_id: 1,
            title: "Midterm".into(),
            topic_conjunctions: vec![vec![1, 2], vec![3]],
        };
        assert!(multiple_choice(vec![2, 1]).belongs_to_assessment(&assessment));
        assert!(multiple_choice(vec![3]).belongs_to_assessment(&assessment));
        assert!(!multiple_choice(vec![1]).belongs_to_assessment(&assessment));
        assert!(!multiple_choice(vec![1, 2, 3]).belongs_to_assessment(&assessment));
    }
}
