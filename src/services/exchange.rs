// src/services/exchange.rs

//! Export and import of every stored attempt as a single JSON document.
//!
//! Question answers are keyed by their quiz-question sequence, so a document can be
//! loaded into a store whose attempt and question-answer ids differ.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, Entity},
    models::quiz_answer::{AnswerDetails, QuizAnswer},
    services::answer::AnswerService,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerCorpus {
    pub quiz_answers: Vec<ExportedQuizAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedQuizAnswer {
    pub student_id: i64,
    pub quiz_id: i64,
    pub creation_date: Option<DateTime<Utc>>,
    pub answer_date: Option<DateTime<Utc>>,
    pub completed: bool,
    #[serde(default)]
    pub used_in_statistics: bool,
    pub answers: Vec<ExportedQuestionAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedQuestionAnswer {
    pub sequence: i32,
    #[serde(default)]
    pub time_taken: Option<i32>,
    #[serde(default)]
    pub answer_details: Option<AnswerDetails>,
}

impl From<&QuizAnswer> for ExportedQuizAnswer {
    fn from(qa: &QuizAnswer) -> Self {
        let mut answers: Vec<ExportedQuestionAnswer> = qa
            .question_answers
            .iter()
            .map(|a| ExportedQuestionAnswer {
                sequence: a.sequence,
                time_taken: a.time_taken,
                answer_details: a.answer_details.clone(),
            })
            .collect();
        answers.sort_by_key(|a| a.sequence);

        Self {
            student_id: qa.student_id,
            quiz_id: qa.quiz_id,
            creation_date: qa.creation_date,
            answer_date: qa.answer_date,
            completed: qa.completed,
            used_in_statistics: qa.used_in_statistics,
            answers,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub replaced: usize,
}

impl AnswerService {
    pub async fn export_answers(&self) -> Result<AnswerCorpus, AppError> {
        self.retry
            .run("export_answers", || async {
                let mut uow = self.store.begin().await?;
                let mut attempts = uow.all_quiz_answers().await?;
                uow.commit().await?;

                attempts.sort_by_key(|qa| qa.id);
                Ok(AnswerCorpus {
                    quiz_answers: attempts.iter().map(ExportedQuizAnswer::from).collect(),
                })
            })
            .await
    }

    /// Loads a corpus in one unit of work. An existing attempt for the same
    /// student and quiz is replaced.
    pub async fn import_answers(&self, corpus: &AnswerCorpus) -> Result<ImportSummary, AppError> {
        self.retry
            .run("import_answers", || self.try_import_answers(corpus))
            .await
    }

    async fn try_import_answers(&self, corpus: &AnswerCorpus) -> Result<ImportSummary, AppError> {
        let mut uow = self.store.begin().await?;
        let mut summary = ImportSummary::default();

        for exported in &corpus.quiz_answers {
            let student = uow.require_student(exported.student_id).await?;
            let quiz = uow.require_quiz(exported.quiz_id).await?;

            if let Some(existing) = uow.find_quiz_answer(student.id, quiz.id).await? {
                uow.delete_quiz_answer(existing.id).await?;
                summary.replaced += 1;
            }
            let mut quiz_answer = uow
                .insert_quiz_answer(student.id, &quiz)
                .await?
                .ok_or(AppError::QuizAnswerAlreadyExists {
                    student_id: student.id,
                    quiz_id: quiz.id,
                })?;

            quiz_answer.creation_date = exported.creation_date;
            quiz_answer.answer_date = exported.answer_date;
            quiz_answer.completed = exported.completed;
            quiz_answer.used_in_statistics = exported.used_in_statistics;
            for answer in &exported.answers {
                let slot = quiz_answer
                    .question_answer_by_sequence(answer.sequence)
                    .ok_or_else(|| {
                        AppError::not_found(Entity::QuizQuestion, format!("{}/{}", quiz.id, answer.sequence))
                    })?;
                slot.time_taken = answer.time_taken;
                slot.set_answer_details(answer.answer_details.as_ref());
            }

            uow.save_quiz_answer(&quiz_answer).await?;
            summary.imported += 1;
        }
        uow.commit().await?;

        tracing::info!(?summary, "Answer corpus imported");
        Ok(summary)
    }
}
