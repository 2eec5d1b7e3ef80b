// src/services/answer.rs

//! Quiz-answer lifecycle: opening, concluding and reconciling student attempts.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    config::{Config, DEFAULT_SUBMISSION_GRACE_MINUTES},
    error::{AppError, Entity},
    models::{
        question::{Question, StatementQuestion},
        quiz::{Quiz, QuizType},
        quiz_answer::{AnswerState, QuizAnswer},
        staged::{NewQuestionAnswerItem, NewQuizAnswerItem},
        statement::{
            ConcludeQuizRequest, CorrectAnswer, QuizAnswerView, QuizStatement, QuizSummary,
            SolvedQuiz, StatementAnswer, StatementQuiz,
        },
        student::Student,
    },
    services::{reconcile, statistics::StatisticsSink},
    store::{Store, UnitOfWork},
    utils::{clock::Clock, retry::RetryPolicy},
};

/// Outcome of reconciling the staged submissions of one quiz.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    /// Attempts whose answers were written.
    pub written: usize,
    /// Items for attempts already finalized or gone.
    pub stale: usize,
    /// Items that did not match their attempt and were dropped.
    pub rejected: usize,
}

/// Outcome of one maintenance sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub quizzes_written: usize,
    pub answers_written: usize,
    pub quizzes_failed: usize,
    pub statistics_calculated: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetSummary {
    pub question_answer_items: u64,
    pub quiz_answers: usize,
}

pub struct AnswerService {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) clock: Arc<dyn Clock>,
    statistics: Arc<dyn StatisticsSink>,
    pub(crate) retry: RetryPolicy,
    grace: Duration,
    demo_course_execution_id: Option<i64>,
}

impl AnswerService {
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        statistics: Arc<dyn StatisticsSink>,
    ) -> Self {
        Self {
            store,
            clock,
            statistics,
            retry: RetryPolicy::default(),
            grace: Duration::minutes(DEFAULT_SUBMISSION_GRACE_MINUTES),
            demo_course_execution_id: None,
        }
    }

    /// Applies the retry, grace and demo settings from `config`.
    pub fn configured(mut self, config: &Config) -> Self {
        self.retry = RetryPolicy::new(config.retry_attempts, config.retry_delay());
        self.grace = Duration::minutes(config.submission_grace_minutes);
        self.demo_course_execution_id = config.demo_course_execution_id;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_demo_course_execution(mut self, course_execution_id: Option<i64>) -> Self {
        self.demo_course_execution_id = course_execution_id;
        self
    }

    /// Creates an attempt for the student at the quiz.
    pub async fn create_quiz_answer(&self, student_id: i64, quiz_id: i64) -> Result<QuizAnswerView, AppError> {
        self.retry
            .run("create_quiz_answer", || self.try_create_quiz_answer(student_id, quiz_id))
            .await
    }

    async fn try_create_quiz_answer(&self, student_id: i64, quiz_id: i64) -> Result<QuizAnswerView, AppError> {
        let mut uow = self.store.begin().await?;
        let student = uow.require_student(student_id).await?;
        let quiz = uow.require_quiz(quiz_id).await?;

        let quiz_answer = uow
            .insert_quiz_answer(student.id, &quiz)
            .await?
            .ok_or(AppError::QuizAnswerAlreadyExists { student_id, quiz_id })?;
        uow.commit().await?;

        tracing::info!(quiz_answer_id = quiz_answer.id, student_id, quiz_id, "Quiz answer created");
        Ok(QuizAnswerView::from(&quiz_answer))
    }

    /// Opens (or resumes) a quiz that is not QR-code only.
    pub async fn start_quiz(&self, student_id: i64, quiz_id: i64) -> Result<StatementQuiz, AppError> {
        self.retry
            .run("start_quiz", || self.try_start_quiz(student_id, quiz_id))
            .await
    }

    async fn try_start_quiz(&self, student_id: i64, quiz_id: i64) -> Result<StatementQuiz, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let student = uow.require_student(student_id).await?;
        let quiz = uow.require_quiz(quiz_id).await?;

        common_checks(&student, &quiz, now)?;
        if quiz.qr_code_only {
            return Err(AppError::CannotStartQrCodeQuiz);
        }
        if quiz.not_yet_available(now) {
            return Err(AppError::QuizNotYetAvailable);
        }

        let mut quiz_answer = open_quiz_answer(&mut *uow, &student, &quiz).await?;
        let statement = prepare_statement(&mut *uow, &student, &quiz, &mut quiz_answer, now).await?;
        uow.commit().await?;

        tracing::debug!(quiz_answer_id = quiz_answer.id, student_id, quiz_id, "Quiz started");
        Ok(statement)
    }

    /// Opens a QR-code-only quiz. Before the quiz opens, only the waiting time is returned.
    pub async fn get_quiz_by_qr_code(&self, student_id: i64, quiz_id: i64) -> Result<QuizStatement, AppError> {
        self.retry
            .run("get_quiz_by_qr_code", || self.try_get_quiz_by_qr_code(student_id, quiz_id))
            .await
    }

    async fn try_get_quiz_by_qr_code(&self, student_id: i64, quiz_id: i64) -> Result<QuizStatement, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let student = uow.require_student(student_id).await?;
        let quiz = uow.require_quiz(quiz_id).await?;

        common_checks(&student, &quiz, now)?;
        if !quiz.qr_code_only {
            return Err(AppError::NotQrCodeQuiz);
        }

        let mut quiz_answer = open_quiz_answer(&mut *uow, &student, &quiz).await?;

        let result = match quiz.available_date {
            Some(available) if available > now => QuizStatement::Pending {
                time_to_availability: (available - now).num_milliseconds(),
            },
            _ => QuizStatement::Ready(
                prepare_statement(&mut *uow, &student, &quiz, &mut quiz_answer, now).await?,
            ),
        };
        uow.commit().await?;
        Ok(result)
    }

    /// Concludes an attempt.
    ///
    /// In-class submissions are staged for the maintenance sweep and yield no results;
    /// other quizzes are graded immediately. Concluding twice is a no-op.
    pub async fn conclude_quiz(
        &self,
        student_id: i64,
        submission: &ConcludeQuizRequest,
    ) -> Result<Vec<CorrectAnswer>, AppError> {
        self.retry
            .run("conclude_quiz", || self.try_conclude_quiz(student_id, submission))
            .await
    }

    async fn try_conclude_quiz(
        &self,
        student_id: i64,
        submission: &ConcludeQuizRequest,
    ) -> Result<Vec<CorrectAnswer>, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let mut quiz_answer = uow.require_quiz_answer(submission.quiz_answer_id).await?;
        if quiz_answer.student_id != student_id {
            return Err(AppError::NotOwner {
                entity: Entity::QuizAnswer,
                id: quiz_answer.id,
            });
        }
        let quiz = uow.require_quiz(quiz_answer.quiz_id).await?;

        if quiz.not_yet_available(now) {
            return Err(AppError::QuizNotYetAvailable);
        }
        if quiz.closed_for_submission(now, self.grace) {
            return Err(AppError::QuizNoLongerAvailable);
        }
        if quiz_answer.completed {
            tracing::debug!(quiz_answer_id = quiz_answer.id, "Quiz answer already completed");
            return Ok(Vec::new());
        }

        quiz_answer.completed = true;

        if quiz.quiz_type == QuizType::InClass {
            // Checked now; the sweep that writes the item cannot report a mismatch.
            reconcile::write_quiz_answer(&mut quiz_answer.clone(), &submission.answers)?;
            let item_id = uow
                .stage_quiz_answer_item(&NewQuizAnswerItem {
                    quiz_id: quiz.id,
                    quiz_answer_id: quiz_answer.id,
                    answer_date: now,
                    answers: submission.answers.clone(),
                })
                .await?;
            uow.save_quiz_answer(&quiz_answer).await?;
            uow.commit().await?;

            tracing::info!(quiz_answer_id = quiz_answer.id, item_id, "In-class submission staged");
            return Ok(Vec::new());
        }

        quiz_answer.answer_date = Some(now);
        reconcile::write_quiz_answer(&mut quiz_answer, &submission.answers)?;
        uow.save_quiz_answer(&quiz_answer).await?;

        let questions = questions_by_id(&mut *uow, &quiz_answer.question_ids()).await?;
        let results = correct_answers(&quiz_answer, &questions)?;
        uow.commit().await?;

        tracing::info!(quiz_answer_id = quiz_answer.id, quiz_id = quiz.id, "Quiz concluded");
        Ok(results)
    }

    /// Reconciles every staged in-class submission of a quiz.
    pub async fn write_quiz_answers(&self, quiz_id: i64) -> Result<WriteSummary, AppError> {
        self.retry
            .run("write_quiz_answers", || self.try_write_quiz_answers(quiz_id))
            .await
    }

    async fn try_write_quiz_answers(&self, quiz_id: i64) -> Result<WriteSummary, AppError> {
        let mut uow = self.store.begin().await?;
        uow.require_quiz(quiz_id).await?;

        let mut summary = WriteSummary::default();
        for item in uow.quiz_answer_items(quiz_id).await? {
            // Locked so a concurrent conclude or sweep sees this write, not a stale copy.
            match uow.lock_quiz_answer(item.quiz_answer_id).await? {
                Some(quiz_answer) if quiz_answer.answer_date.is_none() => {
                    let mut updated = quiz_answer;
                    updated.answer_date = Some(item.answer_date);
                    match reconcile::write_quiz_answer(&mut updated, &item.answers) {
                        Ok(_) => {
                            uow.save_quiz_answer(&updated).await?;
                            summary.written += 1;
                        }
                        Err(e) => {
                            tracing::error!(
                                item_id = item.id,
                                quiz_answer_id = item.quiz_answer_id,
                                "Dropping staged submission: {}",
                                e
                            );
                            summary.rejected += 1;
                        }
                    }
                }
                Some(_) => summary.stale += 1,
                None => {
                    tracing::warn!(item_id = item.id, quiz_answer_id = item.quiz_answer_id, "Staged submission for unknown quiz answer");
                    summary.stale += 1;
                }
            }
            uow.delete_quiz_answer_item(item.id).await?;
        }
        uow.commit().await?;

        if summary != WriteSummary::default() {
            tracing::info!(quiz_id, ?summary, "Staged submissions reconciled");
        }
        Ok(summary)
    }

    /// Periodic maintenance: reconcile staged submissions, then trigger statistics
    /// for attempts whose results window has passed. Safe to re-run.
    pub async fn write_quiz_answers_and_calculate_statistics(&self) -> Result<SweepSummary, AppError> {
        let mut summary = SweepSummary::default();

        let pending = self
            .retry
            .run("find_quizzes_to_write", || self.try_quizzes_to_write())
            .await?;
        for quiz_id in pending {
            match self.write_quiz_answers(quiz_id).await {
                Ok(written) => {
                    summary.quizzes_written += 1;
                    summary.answers_written += written.written;
                }
                Err(e) => {
                    tracing::error!(quiz_id, "Failed to write staged answers: {}", e);
                    summary.quizzes_failed += 1;
                }
            }
        }

        let finalized = self
            .retry
            .run("calculate_statistics", || self.try_mark_statistics())
            .await?;
        for (quiz_answer, quiz) in &finalized {
            self.statistics.quiz_answer_finalized(quiz_answer, quiz).await;
        }
        summary.statistics_calculated = finalized.len();

        tracing::info!(?summary, "Maintenance sweep finished");
        Ok(summary)
    }

    async fn try_quizzes_to_write(&self) -> Result<Vec<i64>, AppError> {
        let mut uow = self.store.begin().await?;
        let mut existing = Vec::new();
        for quiz_id in uow.quizzes_with_pending_items().await? {
            if uow.quiz(quiz_id).await?.is_some() {
                existing.push(quiz_id);
            }
        }
        uow.commit().await?;
        Ok(existing)
    }

    /// Marks due attempts as counted. The sink is notified after commit.
    async fn try_mark_statistics(&self) -> Result<Vec<(QuizAnswer, Quiz)>, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let mut quizzes: HashMap<i64, Quiz> = HashMap::new();
        let mut finalized = Vec::new();

        for mut quiz_answer in uow.quiz_answers_pending_statistics(now).await? {
            if !quizzes.contains_key(&quiz_answer.quiz_id) {
                let quiz = uow.require_quiz(quiz_answer.quiz_id).await?;
                quizzes.insert(quiz.id, quiz);
            }
            quiz_answer.used_in_statistics = true;
            uow.save_quiz_answer(&quiz_answer).await?;
            let quiz = quizzes[&quiz_answer.quiz_id].clone();
            finalized.push((quiz_answer, quiz));
        }
        uow.commit().await?;
        Ok(finalized)
    }

    pub async fn delete_quiz_answer(&self, quiz_answer_id: i64) -> Result<(), AppError> {
        self.retry
            .run("delete_quiz_answer", || async {
                let mut uow = self.store.begin().await?;
                if !uow.delete_quiz_answer(quiz_answer_id).await? {
                    return Err(AppError::not_found(Entity::QuizAnswer, quiz_answer_id));
                }
                uow.commit().await?;
                tracing::info!(quiz_answer_id, "Quiz answer deleted");
                Ok(())
            })
            .await
    }

    /// Clears every attempt and buffered answer of the demo course execution.
    pub async fn reset_demo_answers(&self) -> Result<ResetSummary, AppError> {
        let Some(demo_execution) = self.demo_course_execution_id else {
            tracing::info!("No demo course execution configured, nothing to reset");
            return Ok(ResetSummary::default());
        };

        self.retry
            .run("reset_demo_answers", || self.try_reset_demo_answers(demo_execution))
            .await
    }

    async fn try_reset_demo_answers(&self, demo_execution: i64) -> Result<ResetSummary, AppError> {
        let mut uow = self.store.begin().await?;
        let usernames: Vec<String> = uow
            .students_in_execution(demo_execution)
            .await?
            .into_iter()
            .map(|s| s.username)
            .collect();

        let mut summary = ResetSummary {
            question_answer_items: uow.delete_question_answer_items_for_usernames(&usernames).await?,
            quiz_answers: 0,
        };
        for quiz_answer in uow.quiz_answers_for_execution(demo_execution).await? {
            if uow.delete_quiz_answer(quiz_answer.id).await? {
                summary.quiz_answers += 1;
            }
        }
        uow.commit().await?;

        tracing::info!(demo_execution, ?summary, "Demo answers reset");
        Ok(summary)
    }

    /// Buffers a single answer sent while the student is still taking the quiz.
    pub async fn submit_answer(&self, username: &str, quiz_id: i64, answer: &StatementAnswer) -> Result<i64, AppError> {
        self.retry
            .run("submit_answer", || async {
                let item = NewQuestionAnswerItem::from_statement(username, quiz_id, answer, self.clock.now());
                let mut uow = self.store.begin().await?;
                let id = uow.stage_question_answer_item(&item).await?;
                uow.commit().await?;
                Ok(id)
            })
            .await
    }

    /// Quizzes the student can open now in the execution, plus ones already in progress.
    pub async fn get_available_quizzes(&self, student_id: i64, course_execution_id: i64) -> Result<Vec<QuizSummary>, AppError> {
        self.retry
            .run("get_available_quizzes", || self.try_get_available_quizzes(student_id, course_execution_id))
            .await
    }

    async fn try_get_available_quizzes(&self, student_id: i64, course_execution_id: i64) -> Result<Vec<QuizSummary>, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let quizzes = uow.quizzes_for_execution(course_execution_id).await?;
        let attempts = uow.quiz_answers_for_student(student_id).await?;
        uow.commit().await?;

        let mut open = HashSet::new();
        let mut closed = HashSet::new();
        for attempt in &attempts {
            if attempt.is_open() {
                open.insert(attempt.quiz_id);
            } else {
                closed.insert(attempt.quiz_id);
            }
        }

        let mut listed: Vec<&Quiz> = quizzes
            .iter()
            .filter(|quiz| !closed.contains(&quiz.id))
            .filter(|quiz| {
                (quiz.is_listed() && quiz.is_available(now))
                    || (open.contains(&quiz.id) && !quiz.qr_code_only && !quiz.no_longer_available(now))
            })
            .collect();
        listed.sort_by_key(|quiz| (quiz.available_date.is_none(), quiz.available_date, quiz.id));

        Ok(listed.into_iter().map(QuizSummary::from).collect())
    }

    /// Graded attempts of the student in the execution whose results are public.
    pub async fn get_solved_quizzes(&self, student_id: i64, course_execution_id: i64) -> Result<Vec<SolvedQuiz>, AppError> {
        self.retry
            .run("get_solved_quizzes", || self.try_get_solved_quizzes(student_id, course_execution_id))
            .await
    }

    async fn try_get_solved_quizzes(&self, student_id: i64, course_execution_id: i64) -> Result<Vec<SolvedQuiz>, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        uow.require_student(student_id).await?;

        let mut solved = Vec::new();
        for attempt in uow.quiz_answers_for_student(student_id).await? {
            let Some(answer_date) = attempt.answer_date else {
                continue;
            };
            let Some(quiz) = uow.quiz(attempt.quiz_id).await? else {
                continue;
            };
            if quiz.course_execution_id != course_execution_id || !quiz.results_public(now) {
                continue;
            }

            let questions = questions_by_id(&mut *uow, &attempt.question_ids()).await?;
            solved.push(SolvedQuiz {
                quiz_answer_id: attempt.id,
                quiz: QuizSummary::from(&quiz),
                answer_date,
                answers: attempt.question_answers.iter().map(StatementAnswer::from).collect(),
                correct_answers: correct_answers(&attempt, &questions)?,
            });
        }
        uow.commit().await?;

        solved.sort_by_key(|s| s.answer_date);
        Ok(solved)
    }

    /// A single question of a quiz, as shown to students.
    pub async fn get_question_for_quiz_answer(&self, quiz_id: i64, question_id: i64) -> Result<StatementQuestion, AppError> {
        self.retry
            .run("get_question_for_quiz_answer", || async {
                let mut uow = self.store.begin().await?;
                let question = uow.require_question(question_id).await?;
                let quiz = uow.require_quiz(quiz_id).await?;
                uow.commit().await?;

                let quiz_question = quiz
                    .questions
                    .iter()
                    .find(|qq| qq.question_id == question_id)
                    .ok_or_else(|| AppError::not_found(Entity::Question, question_id))?;
                Ok(StatementQuestion::new(quiz_question, &question))
            })
            .await
    }
}

fn common_checks(student: &Student, quiz: &Quiz, now: DateTime<Utc>) -> Result<(), AppError> {
    if !student.is_enrolled(quiz.course_execution_id) {
        return Err(AppError::UserNotEnrolled(student.username.clone()));
    }
    if quiz.no_longer_available(now) {
        return Err(AppError::QuizNoLongerAvailable);
    }
    Ok(())
}

/// Get-or-create the student's attempt, which must still be open.
async fn open_quiz_answer(uow: &mut dyn UnitOfWork, student: &Student, quiz: &Quiz) -> Result<QuizAnswer, AppError> {
    let quiz_answer = uow.get_or_create_quiz_answer(student.id, quiz).await?;
    match quiz_answer.state() {
        AnswerState::Open { .. } => Ok(quiz_answer),
        state => {
            tracing::debug!(quiz_answer_id = quiz_answer.id, ?state, "Quiz answer is not open");
            Err(AppError::QuizAlreadyCompleted)
        }
    }
}

/// Builds the statement for an open attempt.
///
/// An in-class attempt that was already opened is resumed from the student's
/// buffered answers; any other attempt is stamped as started.
async fn prepare_statement(
    uow: &mut dyn UnitOfWork,
    student: &Student,
    quiz: &Quiz,
    quiz_answer: &mut QuizAnswer,
    now: DateTime<Utc>,
) -> Result<StatementQuiz, AppError> {
    let mut answers: Vec<StatementAnswer> = quiz_answer
        .question_answers
        .iter()
        .map(StatementAnswer::blank)
        .collect();

    if quiz.quiz_type == QuizType::InClass && quiz_answer.creation_date.is_some() {
        let mut items = uow.question_answer_items_for_username(&student.username).await?;
        items.sort_by_key(|item| (item.quiz_question_id, item.answer_date));
        reconcile::prefill_from_items(&mut answers, &items);
    } else if quiz_answer.creation_date.is_none() {
        quiz_answer.creation_date = Some(now);
        uow.save_quiz_answer(quiz_answer).await?;
    }

    Ok(StatementQuiz {
        id: quiz.id,
        quiz_answer_id: quiz_answer.id,
        title: quiz.title.clone(),
        quiz_type: quiz.quiz_type,
        available_date: quiz.available_date,
        conclusion_date: quiz.conclusion_date,
        questions: statement_questions(uow, quiz).await?,
        answers,
    })
}

pub(crate) async fn statement_questions(uow: &mut dyn UnitOfWork, quiz: &Quiz) -> Result<Vec<StatementQuestion>, AppError> {
    let questions = questions_by_id(uow, &quiz.question_ids()).await?;
    let mut slots: Vec<_> = quiz.questions.iter().collect();
    slots.sort_by_key(|qq| qq.sequence);

    slots
        .into_iter()
        .map(|qq| {
            questions
                .get(&qq.question_id)
                .map(|question| StatementQuestion::new(qq, question))
                .ok_or_else(|| AppError::not_found(Entity::Question, qq.question_id))
        })
        .collect()
}

pub(crate) async fn questions_by_id(uow: &mut dyn UnitOfWork, ids: &[i64]) -> Result<HashMap<i64, Question>, AppError> {
    Ok(uow
        .questions(ids)
        .await?
        .into_iter()
        .map(|q| (q.id, q))
        .collect())
}

/// Grades every question answer, ordered by sequence.
pub(crate) fn correct_answers(quiz_answer: &QuizAnswer, questions: &HashMap<i64, Question>) -> Result<Vec<CorrectAnswer>, AppError> {
    let mut results = quiz_answer
        .question_answers
        .iter()
        .map(|answer| {
            questions
                .get(&answer.question_id)
                .map(|question| CorrectAnswer::new(answer, question))
                .ok_or_else(|| AppError::not_found(Entity::Question, answer.question_id))
        })
        .collect::<Result<Vec<_>, _>>()?;
    results.sort_by_key(|r| r.sequence);
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::QuizType;
    use crate::services::testing::{Fixture, answer_all, submission};

    #[tokio::test]
    async fn test_create_quiz_answer_and_duplicate() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();

        let view = service.create_quiz_answer(fx.student, quiz.id).await.unwrap();
        assert_eq!(view.number_of_questions, 3);
        assert!(!view.completed);

        let err = service.create_quiz_answer(fx.student, quiz.id).await.unwrap_err();
        assert!(matches!(err, AppError::QuizAnswerAlreadyExists { .. }));

        let err = service.create_quiz_answer(999, quiz.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::Student, .. }));
        let err = service.create_quiz_answer(fx.student, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::Quiz, .. }));
    }

    #[tokio::test]
    async fn test_start_quiz_stamps_creation_and_resumes_same_attempt() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();

        let first = service.start_quiz(fx.student, quiz.id).await.unwrap();
        assert_eq!(first.questions.len(), 3);
        assert_eq!(first.answers.len(), 3);
        assert!(first.answers.iter().all(|a| a.answer_details.is_none()));
        let sequences: Vec<i32> = first.questions.iter().map(|q| q.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);

        let second = service.start_quiz(fx.student, quiz.id).await.unwrap();
        assert_eq!(first.quiz_answer_id, second.quiz_answer_id);

        let state = fx.store.snapshot().await;
        assert_eq!(state.quiz_answers.len(), 1);
        assert_eq!(
            state.quiz_answers[&first.quiz_answer_id].creation_date,
            Some(fx.clock.now())
        );
    }

    #[tokio::test]
    async fn test_concurrent_starts_create_one_attempt() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = Arc::new(fx.answer_service());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&service);
                let (student, quiz_id) = (fx.student, quiz.id);
                tokio::spawn(async move { service.start_quiz(student, quiz_id).await })
            })
            .collect();
        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap().unwrap().quiz_answer_id);
        }

        assert_eq!(ids.len(), 1);
        assert_eq!(fx.store.snapshot().await.quiz_answers.len(), 1);
    }

    #[tokio::test]
    async fn test_not_enrolled_student_is_rejected() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |q| q.qr_code_only = true).await;
        let service = fx.answer_service();

        let err = service.start_quiz(fx.outsider, quiz.id).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotEnrolled(ref name) if name == "bob"));
        let err = service.get_quiz_by_qr_code(fx.outsider, quiz.id).await.unwrap_err();
        assert!(matches!(err, AppError::UserNotEnrolled(_)));
    }

    #[tokio::test]
    async fn test_start_quiz_window_and_mode_checks() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let service = fx.answer_service();

        let future = fx
            .add_quiz(QuizType::Proposed, |q| q.available_date = Some(now + Duration::hours(1)))
            .await;
        let err = service.start_quiz(fx.student, future.id).await.unwrap_err();
        assert!(matches!(err, AppError::QuizNotYetAvailable));

        let past = fx
            .add_quiz(QuizType::Proposed, |q| q.conclusion_date = Some(now - Duration::seconds(1)))
            .await;
        let err = service.start_quiz(fx.student, past.id).await.unwrap_err();
        assert!(matches!(err, AppError::QuizNoLongerAvailable));

        let qr = fx.add_quiz(QuizType::Proposed, |q| q.qr_code_only = true).await;
        let err = service.start_quiz(fx.student, qr.id).await.unwrap_err();
        assert!(matches!(err, AppError::CannotStartQrCodeQuiz));

        let plain = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let err = service.get_quiz_by_qr_code(fx.student, plain.id).await.unwrap_err();
        assert!(matches!(err, AppError::NotQrCodeQuiz));

        assert!(fx.store.snapshot().await.quiz_answers.is_empty());
    }

    #[tokio::test]
    async fn test_qr_code_quiz_returns_timer_before_availability() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let quiz = fx
            .add_quiz(QuizType::InClass, |q| {
                q.qr_code_only = true;
                q.available_date = Some(now + Duration::seconds(90));
            })
            .await;
        let service = fx.answer_service();

        let pending = service.get_quiz_by_qr_code(fx.student, quiz.id).await.unwrap();
        assert_eq!(pending, QuizStatement::Pending { time_to_availability: 90_000 });

        fx.clock.advance(Duration::seconds(91));
        let ready = service.get_quiz_by_qr_code(fx.student, quiz.id).await.unwrap();
        let statement = ready.ready().expect("quiz should be open");
        assert_eq!(statement.questions.len(), 3);
    }

    #[tokio::test]
    async fn test_completed_attempt_cannot_be_started_again() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&statement, 1)).await.unwrap();

        let err = service.start_quiz(fx.student, quiz.id).await.unwrap_err();
        assert!(matches!(err, AppError::QuizAlreadyCompleted));
    }

    #[tokio::test]
    async fn test_conclude_grades_in_sequence_order_and_is_idempotent() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        let mut request = submission(&statement, 1);
        request.answers.reverse();
        request.answers[0].answer_details = None;

        let results = service.conclude_quiz(fx.student, &request).await.unwrap();
        let sequences: Vec<i32> = results.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
        assert_eq!(results.iter().filter(|r| r.correct).count(), 2);

        let answer_date = fx.store.snapshot().await.quiz_answers[&statement.quiz_answer_id].answer_date;
        assert_eq!(answer_date, Some(fx.clock.now()));

        fx.clock.advance(Duration::minutes(1));
        let again = service.conclude_quiz(fx.student, &request).await.unwrap();
        assert!(again.is_empty());
        let state = fx.store.snapshot().await;
        assert_eq!(state.quiz_answers[&statement.quiz_answer_id].answer_date, answer_date);
    }

    #[tokio::test]
    async fn test_conclude_requires_every_question_answer() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        let mut request = submission(&statement, 1);
        let missing = request.answers.pop().unwrap();

        let err = service.conclude_quiz(fx.student, &request).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::NotFound { entity: Entity::QuestionAnswer, ref id } if *id == missing.question_answer_id.to_string()
        ));

        // Nothing was committed.
        let state = fx.store.snapshot().await;
        assert!(!state.quiz_answers[&statement.quiz_answer_id].completed);
    }

    #[tokio::test]
    async fn test_conclude_grace_period() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let conclusion = now + Duration::minutes(30);
        let service = fx.answer_service();

        let on_time = fx.add_quiz(QuizType::Proposed, |q| q.conclusion_date = Some(conclusion)).await;
        let late = fx.add_quiz(QuizType::Proposed, |q| q.conclusion_date = Some(conclusion)).await;
        let on_time_statement = service.start_quiz(fx.student, on_time.id).await.unwrap();
        let late_statement = service.start_quiz(fx.student, late.id).await.unwrap();

        fx.clock.set(conclusion + Duration::minutes(9));
        assert_eq!(service.conclude_quiz(fx.student, &submission(&on_time_statement, 1)).await.unwrap().len(), 3);

        fx.clock.set(conclusion + Duration::minutes(11));
        let err = service.conclude_quiz(fx.student, &submission(&late_statement, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::QuizNoLongerAvailable));
    }

    #[tokio::test]
    async fn test_in_class_conclude_is_staged_until_written() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        let results = service.conclude_quiz(fx.student, &submission(&statement, 1)).await.unwrap();
        assert!(results.is_empty());

        let state = fx.store.snapshot().await;
        let attempt = &state.quiz_answers[&statement.quiz_answer_id];
        assert_eq!(attempt.state(), AnswerState::PendingReconciliation);
        assert!(attempt.question_answers.iter().all(|a| a.answer_details.is_none() && a.time_taken.is_none()));
        assert_eq!(state.quiz_answer_items.len(), 1);

        let summary = service.write_quiz_answers(quiz.id).await.unwrap();
        assert_eq!(summary, WriteSummary { written: 1, stale: 0, rejected: 0 });

        let state = fx.store.snapshot().await;
        let attempt = &state.quiz_answers[&statement.quiz_answer_id];
        assert_eq!(attempt.state(), AnswerState::Finalized);
        assert!(attempt.question_answers.iter().all(|a| a.answer_details.is_some()));
        assert!(state.quiz_answer_items.is_empty());

        let again = service.write_quiz_answers(quiz.id).await.unwrap();
        assert_eq!(again, WriteSummary::default());
        assert_eq!(fx.store.snapshot().await.quiz_answers, state.quiz_answers);
    }

    #[tokio::test]
    async fn test_stale_and_malformed_items_are_consumed() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&statement, 1)).await.unwrap();
        // Duplicate of the same submission, as a retrying client would send.
        fx.store
            .update(|state| {
                let item = state.quiz_answer_items.values().next().unwrap().clone();
                state.quiz_answer_items.insert(item.id + 1000, crate::models::staged::QuizAnswerItem { id: item.id + 1000, ..item });
            })
            .await;
        // An item that no longer matches its attempt, such as one staged before the
        // quiz was edited.
        let other = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let broken = service.start_quiz(fx.student, other.id).await.unwrap();
        let answer_date = fx.clock.now();
        fx.store
            .update(|state| {
                state.quiz_answer_items.insert(
                    5000,
                    crate::models::staged::QuizAnswerItem {
                        id: 5000,
                        quiz_id: other.id,
                        quiz_answer_id: broken.quiz_answer_id,
                        answer_date,
                        answers: vec![],
                    },
                );
            })
            .await;

        let summary = service.write_quiz_answers(quiz.id).await.unwrap();
        assert_eq!(summary, WriteSummary { written: 1, stale: 1, rejected: 0 });

        let summary = service.write_quiz_answers(other.id).await.unwrap();
        assert_eq!(summary, WriteSummary { written: 0, stale: 0, rejected: 1 });

        let state = fx.store.snapshot().await;
        assert!(state.quiz_answer_items.is_empty());
        assert_eq!(state.quiz_answers[&broken.quiz_answer_id].answer_date, None);
    }

    #[tokio::test]
    async fn test_in_class_conclude_rejects_incomplete_submission() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let service = fx.answer_service();
        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();

        let mut incomplete = submission(&statement, 1);
        incomplete.answers.pop();
        let err = service.conclude_quiz(fx.student, &incomplete).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::QuestionAnswer, .. }));

        let state = fx.store.snapshot().await;
        assert!(state.quiz_answer_items.is_empty());
        assert!(matches!(
            state.quiz_answers[&statement.quiz_answer_id].state(),
            AnswerState::Open { .. }
        ));

        // The attempt can still be resumed and concluded.
        let resumed = service.start_quiz(fx.student, quiz.id).await.unwrap();
        assert_eq!(resumed.quiz_answer_id, statement.quiz_answer_id);
        service.conclude_quiz(fx.student, &submission(&resumed, 1)).await.unwrap();
        let summary = service.write_quiz_answers_and_calculate_statistics().await.unwrap();
        assert_eq!(summary.answers_written, 1);
        assert_eq!(summary.statistics_calculated, 1);
        let state = fx.store.snapshot().await;
        assert_eq!(state.quiz_answers[&statement.quiz_answer_id].state(), AnswerState::Finalized);
    }

    #[tokio::test]
    async fn test_conclude_rejects_another_students_attempt() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();
        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();

        let err = service
            .conclude_quiz(fx.outsider, &submission(&statement, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotOwner { entity: Entity::QuizAnswer, .. }));

        let state = fx.store.snapshot().await;
        assert!(!state.quiz_answers[&statement.quiz_answer_id].completed);
    }

    #[tokio::test]
    async fn test_in_class_resume_prefills_buffered_answers() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        let answers = answer_all(&statement, 2);
        service.submit_answer("ana", quiz.id, &answers[0]).await.unwrap();
        fx.clock.advance(Duration::seconds(5));
        let mut corrected = answers[0].clone();
        corrected.answer_details = answer_all(&statement, 1)[0].answer_details.clone();
        service.submit_answer("ana", quiz.id, &corrected).await.unwrap();

        let resumed = service.start_quiz(fx.student, quiz.id).await.unwrap();
        assert_eq!(resumed.answers[0].answer_details, corrected.answer_details);
        assert_eq!(resumed.answers[0].time_to_submission, Some(0));
        assert!(resumed.answers[1].answer_details.is_none());
    }

    #[tokio::test]
    async fn test_sweep_writes_and_triggers_statistics_once() {
        let fx = Fixture::new();
        let in_class = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let proposed = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let (service, recorder) = fx.answer_service_with_recorder();

        let a = service.start_quiz(fx.student, in_class.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&a, 1)).await.unwrap();
        let b = service.start_quiz(fx.student, proposed.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&b, 2)).await.unwrap();

        let summary = service.write_quiz_answers_and_calculate_statistics().await.unwrap();
        assert_eq!(summary.quizzes_written, 1);
        assert_eq!(summary.answers_written, 1);
        assert_eq!(summary.statistics_calculated, 2);
        let mut seen = recorder.seen();
        seen.sort();
        assert_eq!(seen, vec![a.quiz_answer_id, b.quiz_answer_id]);

        let again = service.write_quiz_answers_and_calculate_statistics().await.unwrap();
        assert_eq!(again, SweepSummary::default());
        assert_eq!(recorder.seen().len(), 2);
    }

    #[tokio::test]
    async fn test_statistics_wait_for_results_date() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let quiz = fx
            .add_quiz(QuizType::Proposed, |q| q.results_date = Some(now + Duration::days(1)))
            .await;
        let (service, recorder) = fx.answer_service_with_recorder();

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&statement, 1)).await.unwrap();

        service.write_quiz_answers_and_calculate_statistics().await.unwrap();
        assert!(recorder.seen().is_empty());

        fx.clock.advance(Duration::days(2));
        service.write_quiz_answers_and_calculate_statistics().await.unwrap();
        assert_eq!(recorder.seen(), vec![statement.quiz_answer_id]);
    }

    #[tokio::test]
    async fn test_delete_and_demo_reset() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let service = fx.answer_service().with_demo_course_execution(Some(fx.execution));

        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();
        service.submit_answer("ana", quiz.id, &answer_all(&statement, 1)[0]).await.unwrap();
        service.submit_answer("bob", quiz.id, &answer_all(&statement, 1)[1]).await.unwrap();

        let summary = service.reset_demo_answers().await.unwrap();
        assert_eq!(summary, ResetSummary { question_answer_items: 1, quiz_answers: 1 });
        let state = fx.store.snapshot().await;
        assert!(state.quiz_answers.is_empty());
        assert_eq!(state.question_answer_items.len(), 1);

        let err = service.delete_quiz_answer(statement.quiz_answer_id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::QuizAnswer, .. }));
    }

    #[tokio::test]
    async fn test_available_and_solved_quizzes() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let open = fx.add_quiz(QuizType::Proposed, |q| q.available_date = Some(now - Duration::hours(2))).await;
        let later = fx.add_quiz(QuizType::Proposed, |q| q.available_date = Some(now + Duration::hours(1))).await;
        let undated = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let _qr = fx.add_quiz(QuizType::Proposed, |q| q.qr_code_only = true).await;
        let _generated = fx.add_quiz(QuizType::Generated, |_| {}).await;
        let done = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let hidden = fx.add_quiz(QuizType::Proposed, |q| q.results_date = Some(now + Duration::days(1))).await;
        let service = fx.answer_service();

        let statement = service.start_quiz(fx.student, done.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&statement, 1)).await.unwrap();
        let hidden_statement = service.start_quiz(fx.student, hidden.id).await.unwrap();
        service.conclude_quiz(fx.student, &submission(&hidden_statement, 1)).await.unwrap();

        let available: Vec<i64> = service
            .get_available_quizzes(fx.student, fx.execution)
            .await
            .unwrap()
            .iter()
            .map(|q| q.id)
            .collect();
        assert_eq!(available, vec![open.id, undated.id]);
        assert!(!available.contains(&later.id));

        let solved = service.get_solved_quizzes(fx.student, fx.execution).await.unwrap();
        assert_eq!(solved.len(), 1);
        assert_eq!(solved[0].quiz.id, done.id);
        assert!(solved[0].correct_answers.iter().all(|c| c.correct));
    }

    #[tokio::test]
    async fn test_question_for_quiz_answer_hides_answer_key() {
        let fx = Fixture::new();
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();

        let question = service
            .get_question_for_quiz_answer(quiz.id, fx.questions[1])
            .await
            .unwrap();
        assert_eq!(question.sequence, 2);
        let json = serde_json::to_string(&question).unwrap();
        assert!(!json.contains("correct"));

        let err = service.get_question_for_quiz_answer(quiz.id, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::Question, .. }));
    }
}
