// src/services/reconcile.rs

//! Merging submitted answers into question answers.

use crate::{
    error::{AppError, Entity},
    models::{
        quiz_answer::{AnswerDetails, QuestionAnswer, QuizAnswer},
        staged::QuestionAnswerItem,
        statement::StatementAnswer,
    },
};

/// Writes the submission addressed to `question_answer`, overwriting what was there.
///
/// Every question answer of a concluded quiz must be present in `submitted`.
/// Returns the details that should be persisted, if any.
pub fn write_question_answer<'a>(
    question_answer: &'a mut QuestionAnswer,
    submitted: &[StatementAnswer],
) -> Result<Option<&'a AnswerDetails>, AppError> {
    let answer = submitted
        .iter()
        .find(|a| a.question_answer_id == question_answer.id)
        .ok_or_else(|| AppError::not_found(Entity::QuestionAnswer, question_answer.id))?;

    question_answer.time_taken = answer.time_taken;
    Ok(question_answer.set_answer_details(answer.answer_details.as_ref()))
}

/// Writes every question answer of the attempt. Returns how many carry details.
///
/// On error the attempt may be partially written; callers discard it.
pub fn write_quiz_answer(
    quiz_answer: &mut QuizAnswer,
    submitted: &[StatementAnswer],
) -> Result<usize, AppError> {
    let mut with_details = 0;
    for question_answer in quiz_answer.question_answers.iter_mut() {
        if write_question_answer(question_answer, submitted)?.is_some() {
            with_details += 1;
        }
    }
    Ok(with_details)
}

/// Fills statement answer slots from buffered answers.
///
/// Items are expected sorted by (quiz question, answer date); the latest one for a
/// quiz question wins. Items for other quizzes match no slot and are ignored.
pub fn prefill_from_items(slots: &mut [StatementAnswer], items: &[QuestionAnswerItem]) {
    for item in items {
        if let Some(slot) = slots
            .iter_mut()
            .find(|s| s.quiz_question_id == item.quiz_question_id)
        {
            slot.time_taken = item.time_taken;
            slot.time_to_submission = Some(item.time_to_submission);
            slot.answer_details = item.answer_details.clone();
        }
    }
}
