// src/services/statistics.rs

use async_trait::async_trait;

use crate::models::{quiz::Quiz, quiz_answer::QuizAnswer};

/// Receives every attempt once it is finalized and its results window has passed.
/// Called at most once per attempt from the maintenance sweep.
#[async_trait]
pub trait StatisticsSink: Send + Sync {
    async fn quiz_answer_finalized(&self, quiz_answer: &QuizAnswer, quiz: &Quiz);
}

/// Default sink: records the event in the log for the statistics pipeline to pick up.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingStatistics;

#[async_trait]
impl StatisticsSink for LoggingStatistics {
    async fn quiz_answer_finalized(&self, quiz_answer: &QuizAnswer, quiz: &Quiz) {
        let answered = quiz_answer
            .question_answers
            .iter()
            .filter(|a| a.is_answered())
            .count();
        tracing::info!(
            quiz_answer_id = quiz_answer.id,
            quiz_id = quiz.id,
            student_id = quiz_answer.student_id,
            answered,
            total = quiz_answer.question_answers.len(),
            "Quiz answer finalized for statistics"
        );
    }
}
