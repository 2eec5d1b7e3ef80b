// src/models/quiz.rs

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::question::Question;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuizType {
    Proposed,
    Generated,
    InClass,
    Tournament,
    ExternalQuiz,
}

impl QuizType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuizType::Proposed => "PROPOSED",
            QuizType::Generated => "GENERATED",
            QuizType::InClass => "IN_CLASS",
            QuizType::Tournament => "TOURNAMENT",
            QuizType::ExternalQuiz => "EXTERNAL_QUIZ",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PROPOSED" => Some(QuizType::Proposed),
            "GENERATED" => Some(QuizType::Generated),
            "IN_CLASS" => Some(QuizType::InClass),
            "TOURNAMENT" => Some(QuizType::Tournament),
            "EXTERNAL_QUIZ" => Some(QuizType::ExternalQuiz),
            _ => None,
        }
    }
}

/// Represents the 'quiz_questions' table: a question placed at a position in a quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub id: i64,
    pub quiz_id: i64,
    pub question_id: i64,
    /// Position within the quiz, unique per quiz, starting at 1.
    pub sequence: i32,
}

/// Represents the 'quizzes' table together with its ordered questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub course_execution_id: i64,
    pub title: String,
    pub quiz_type: QuizType,
    pub creation_date: Option<DateTime<Utc>>,
    pub available_date: Option<DateTime<Utc>>,
    pub conclusion_date: Option<DateTime<Utc>>,
    pub results_date: Option<DateTime<Utc>>,
    pub qr_code_only: bool,
    pub questions: Vec<QuizQuestion>,
}

impl Quiz {
    pub fn question_ids(&self) -> Vec<i64> {
        self.questions.iter().map(|qq| qq.question_id).collect()
    }

    pub fn not_yet_available(&self, now: DateTime<Utc>) -> bool {
        self.available_date.is_some_and(|d| d > now)
    }

    /// Strict check used when opening a quiz.
    pub fn no_longer_available(&self, now: DateTime<Utc>) -> bool {
        self.conclusion_date.is_some_and(|d| now > d)
    }

    /// Lenient check used when submitting: answers are accepted until `grace` after conclusion.
    pub fn closed_for_submission(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.conclusion_date.is_some_and(|d| d < now - grace)
    }

    /// Open for new attempts at `now`.
    pub fn is_available(&self, now: DateTime<Utc>) -> bool {
        !self.not_yet_available(now) && !self.no_longer_available(now)
    }

    pub fn results_public(&self, now: DateTime<Utc>) -> bool {
        self.results_date.is_none_or(|d| d <= now)
    }

    /// Statistics wait for the results date, else the conclusion date.
    pub fn statistics_due(&self, now: DateTime<Utc>) -> bool {
        self.results_date
            .or(self.conclusion_date)
            .is_none_or(|d| d <= now)
    }

    pub fn is_listed(&self) -> bool {
        !self.qr_code_only && !matches!(self.quiz_type, QuizType::Generated | QuizType::Tournament)
    }
}

/// Question slot of a quiz that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuizQuestion {
    pub question_id: i64,
    pub sequence: i32,
}

/// A quiz that has not been stored yet. The store assigns ids on insert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQuiz {
    pub course_execution_id: i64,
    pub title: String,
    pub quiz_type: QuizType,
    pub creation_date: Option<DateTime<Utc>>,
    pub available_date: Option<DateTime<Utc>>,
    pub conclusion_date: Option<DateTime<Utc>>,
    pub results_date: Option<DateTime<Utc>>,
    pub qr_code_only: bool,
    pub questions: Vec<NewQuizQuestion>,
}

impl NewQuiz {
    pub fn new(course_execution_id: i64, title: &str, quiz_type: QuizType) -> Self {
        Self {
            course_execution_id,
            title: title.to_string(),
            quiz_type,
            creation_date: None,
            available_date: None,
            conclusion_date: None,
            results_date: None,
            qr_code_only: false,
            questions: Vec::new(),
        }
    }

    /// Places the questions in the given order, numbering them from 1.
    pub fn generate(&mut self, questions: &[Question]) {
        self.questions = questions
            .iter()
            .zip(1..)
            .map(|(question, sequence)| NewQuizQuestion {
                question_id: question.id,
                sequence,
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn quiz_concluding_at(conclusion: DateTime<Utc>) -> Quiz {
        Quiz {
            id: 1,
            course_execution_id: 1,
            title: "Quiz".into(),
            quiz_type: QuizType::Proposed,
            creation_date: None,
            available_date: None,
            conclusion_date: Some(conclusion),
            results_date: None,
            qr_code_only: false,
            questions: vec![],
        }
    }

    #[test]
    fn test_submission_grace_is_lenient_but_opening_is_strict() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let quiz = quiz_concluding_at(t);
        let grace = Duration::minutes(10);

        assert!(!quiz.no_longer_available(t));
        assert!(quiz.no_longer_available(t + Duration::seconds(1)));

        assert!(!quiz.closed_for_submission(t + Duration::minutes(9), grace));
        assert!(!quiz.closed_for_submission(t + Duration::minutes(10), grace));
        assert!(quiz.closed_for_submission(t + Duration::minutes(11), grace));
    }

    #[test]
    fn test_statistics_wait_for_results_then_conclusion() {
        let t = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        let mut quiz = quiz_concluding_at(t);
        assert!(!quiz.statistics_due(t - Duration::minutes(1)));
        assert!(quiz.statistics_due(t));

        quiz.results_date = Some(t + Duration::days(1));
        assert!(!quiz.statistics_due(t + Duration::hours(1)));

        quiz.results_date = None;
        quiz.conclusion_date = None;
        assert!(quiz.statistics_due(t));
    }
}
