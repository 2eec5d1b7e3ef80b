// src/services/failed_answer.rs

//! Dashboard bookkeeping of the wrong answers a student may want to revisit.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    config::Config,
    error::{AppError, Entity},
    models::{
        dashboard::{FailedAnswer, NewFailedAnswer},
        quiz_answer::AnswerState,
    },
    services::answer::questions_by_id,
    store::Store,
    utils::{clock::Clock, retry::RetryPolicy},
};

pub struct FailedAnswerService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl FailedAnswerService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    pub fn configured(mut self, config: &Config) -> Self {
        self.retry = RetryPolicy::new(config.retry_attempts, config.retry_delay());
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Collects wrong answers given since the last check. Returns the ones added.
    pub async fn update_failed_answers(&self, student_id: i64, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError> {
        self.retry
            .run("update_failed_answers", || self.try_update_failed_answers(student_id, dashboard_id))
            .await
    }

    async fn try_update_failed_answers(&self, student_id: i64, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let mut dashboard = uow.require_own_dashboard(dashboard_id, student_id).await?;

        let tracked: HashSet<i64> = uow
            .failed_answers(dashboard.id)
            .await?
            .iter()
            .map(|fa| fa.question_answer_id)
            .collect();

        let mut added = Vec::new();
        let mut next_check = now;
        for attempt in uow.quiz_answers_for_student(dashboard.student_id).await? {
            let in_execution = uow
                .quiz(attempt.quiz_id)
                .await?
                .is_some_and(|quiz| quiz.course_execution_id == dashboard.course_execution_id);
            if !in_execution {
                continue;
            }
            if attempt.state() == AnswerState::PendingReconciliation {
                // Its answer date, stamped by the sweep, is no earlier than its start.
                let started = attempt.creation_date.unwrap_or(dashboard.last_check_failed_answers);
                next_check = next_check.min(started);
                continue;
            }
            let Some(answer_date) = attempt.answer_date else {
                continue;
            };
            // Inclusive, tracked answers are skipped below.
            if answer_date < dashboard.last_check_failed_answers {
                continue;
            }

            let questions = questions_by_id(&mut *uow, &attempt.question_ids()).await?;
            for answer in &attempt.question_answers {
                let Some(question) = questions.get(&answer.question_id) else {
                    continue;
                };
                if !answer.is_answered()
                    || question.is_correct(answer.answer_details.as_ref())
                    || tracked.contains(&answer.id)
                {
                    continue;
                }
                let failed = uow
                    .insert_failed_answer(&NewFailedAnswer {
                        dashboard_id: dashboard.id,
                        question_answer_id: answer.id,
                        quiz_answer_id: attempt.id,
                        question_id: question.id,
                        collected: answer_date,
                    })
                    .await?;
                added.push(failed);
            }
        }

        dashboard.last_check_failed_answers = next_check.max(dashboard.last_check_failed_answers);
        uow.save_dashboard(&dashboard).await?;
        uow.commit().await?;

        tracing::info!(dashboard_id, added = added.len(), "Failed answers updated");
        Ok(added)
    }

    /// Tracked failed answers that were not removed, most recent first.
    pub async fn get_failed_answers(&self, student_id: i64, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError> {
        self.retry
            .run("get_failed_answers", || async {
                let mut present = self.present_failed_answers(student_id, dashboard_id).await?;
                sort_recent_first(&mut present);
                Ok(present)
            })
            .await
    }

    pub async fn remove_failed_answer(
        &self,
        student_id: i64,
        dashboard_id: i64,
        failed_answer_id: i64,
    ) -> Result<(), AppError> {
        self.retry
            .run("remove_failed_answer", || async {
                let mut uow = self.store.begin().await?;
                uow.require_own_dashboard(dashboard_id, student_id).await?;
                let mut failed = uow
                    .failed_answers(dashboard_id)
                    .await?
                    .into_iter()
                    .find(|fa| fa.id == failed_answer_id)
                    .ok_or_else(|| AppError::not_found(Entity::FailedAnswer, failed_answer_id))?;

                failed.removed = true;
                uow.save_failed_answer(&failed).await?;
                uow.commit().await?;

                tracing::debug!(dashboard_id, failed_answer_id, "Failed answer removed");
                Ok(())
            })
            .await
    }

    /// Restores removed failed answers collected within `[start, end]`. Returns the restored ones.
    pub async fn re_add_failed_answers(
        &self,
        student_id: i64,
        dashboard_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FailedAnswer>, AppError> {
        self.retry
            .run("re_add_failed_answers", || async {
                let mut uow = self.store.begin().await?;
                uow.require_own_dashboard(dashboard_id, student_id).await?;

                let mut restored = Vec::new();
                for mut failed in uow.failed_answers(dashboard_id).await? {
                    if failed.removed && in_range(&failed, start, end) {
                        failed.removed = false;
                        uow.save_failed_answer(&failed).await?;
                        restored.push(failed);
                    }
                }
                uow.commit().await?;

                sort_recent_first(&mut restored);
                tracing::info!(dashboard_id, restored = restored.len(), "Failed answers re-added");
                Ok(restored)
            })
            .await
    }

    /// Present failed answers collected within `[start, end]`.
    pub async fn get_filtered_failed_answers(
        &self,
        student_id: i64,
        dashboard_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<FailedAnswer>, AppError> {
        self.retry
            .run("get_filtered_failed_answers", || async {
                let mut filtered: Vec<FailedAnswer> = self
                    .present_failed_answers(student_id, dashboard_id)
                    .await?
                    .into_iter()
                    .filter(|fa| in_range(fa, start, end))
                    .collect();
                sort_recent_first(&mut filtered);
                Ok(filtered)
            })
            .await
    }

    async fn present_failed_answers(&self, student_id: i64, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError> {
        let mut uow = self.store.begin().await?;
        uow.require_own_dashboard(dashboard_id, student_id).await?;
        let present = uow
            .failed_answers(dashboard_id)
            .await?
            .into_iter()
            .filter(|fa| !fa.removed)
            .collect();
        uow.commit().await?;
        Ok(present)
    }
}

fn in_range(failed: &FailedAnswer, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    failed.collected >= start && failed.collected <= end
}

fn sort_recent_first(failed: &mut [FailedAnswer]) {
    failed.sort_by(|a, b| b.collected.cmp(&a.collected).then(a.id.cmp(&b.id)));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    use crate::models::quiz::QuizType;
    use crate::services::testing::{Fixture, answer_all};
    use crate::models::statement::ConcludeQuizRequest;

    /// Concludes a quiz with the first answer right, the second wrong and the third blank.
    async fn answer_mixed(fx: &Fixture) -> i64 {
        let quiz = fx.add_quiz(QuizType::Proposed, |_| {}).await;
        let service = fx.answer_service();
        let statement = service.start_quiz(fx.student, quiz.id).await.unwrap();

        let mut answers = answer_all(&statement, 1);
        answers[1] = answer_all(&statement, 2)[1].clone();
        answers[2].answer_details = None;
        service
            .conclude_quiz(fx.student, &ConcludeQuizRequest { quiz_answer_id: statement.quiz_answer_id, answers })
            .await
            .unwrap();
        statement.quiz_answer_id
    }

    #[tokio::test]
    async fn test_update_collects_wrong_answers_once() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let dashboard = fx
            .store
            .update(|s| s.add_dashboard(fx.student, fx.execution, now - Duration::hours(1)))
            .await;
        let quiz_answer_id = answer_mixed(&fx).await;
        let service = fx.failed_answer_service();

        fx.clock.advance(Duration::minutes(1));
        let added = service.update_failed_answers(fx.student, dashboard).await.unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].quiz_answer_id, quiz_answer_id);
        assert_eq!(added[0].question_id, fx.questions[1]);
        assert_eq!(added[0].collected, now);

        let state = fx.store.snapshot().await;
        assert_eq!(state.dashboards[&dashboard].last_check_failed_answers, fx.clock.now());

        assert!(service.update_failed_answers(fx.student, dashboard).await.unwrap().is_empty());
        assert_eq!(service.get_failed_answers(fx.student, dashboard).await.unwrap(), added);
    }

    #[tokio::test]
    async fn test_answers_before_last_check_are_ignored() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        answer_mixed(&fx).await;
        let last_check = now + Duration::seconds(1);
        let dashboard = fx.store.update(|s| s.add_dashboard(fx.student, fx.execution, last_check)).await;

        let added = fx.failed_answer_service().update_failed_answers(fx.student, dashboard).await.unwrap();
        assert!(added.is_empty());
    }

    #[tokio::test]
    async fn test_in_class_answers_are_collected_after_reconciliation() {
        let fx = Fixture::new();
        let start = fx.clock.now();
        let dashboard = fx
            .store
            .update(|s| s.add_dashboard(fx.student, fx.execution, start - Duration::hours(1)))
            .await;
        let quiz = fx.add_quiz(QuizType::InClass, |_| {}).await;
        let answers = fx.answer_service();
        let service = fx.failed_answer_service();

        let statement = answers.start_quiz(fx.student, quiz.id).await.unwrap();
        fx.clock.advance(Duration::minutes(2));
        answers
            .conclude_quiz(fx.student, &ConcludeQuizRequest {
                quiz_answer_id: statement.quiz_answer_id,
                answers: answer_all(&statement, 2),
            })
            .await
            .unwrap();

        // Checked while the submission is still staged.
        fx.clock.advance(Duration::minutes(1));
        assert!(service.update_failed_answers(fx.student, dashboard).await.unwrap().is_empty());
        let state = fx.store.snapshot().await;
        assert_eq!(state.dashboards[&dashboard].last_check_failed_answers, start);

        fx.clock.advance(Duration::minutes(4));
        answers.write_quiz_answers_and_calculate_statistics().await.unwrap();

        fx.clock.advance(Duration::minutes(1));
        let added = service.update_failed_answers(fx.student, dashboard).await.unwrap();
        assert_eq!(added.len(), 3);
        assert!(added.iter().all(|fa| fa.collected == start + Duration::minutes(2)));
        let state = fx.store.snapshot().await;
        assert_eq!(state.dashboards[&dashboard].last_check_failed_answers, fx.clock.now());
    }

    #[tokio::test]
    async fn test_other_students_dashboard_is_refused() {
        let fx = Fixture::new();
        let dashboard = fx.store.update(|s| s.add_dashboard(fx.student, fx.execution, fx.clock.now())).await;
        let service = fx.failed_answer_service();

        let err = service.get_failed_answers(fx.outsider, dashboard).await.unwrap_err();
        assert!(matches!(err, AppError::NotOwner { entity: Entity::Dashboard, .. }));
        let err = service.update_failed_answers(fx.outsider, dashboard).await.unwrap_err();
        assert!(matches!(err, AppError::NotOwner { .. }));
    }

    #[tokio::test]
    async fn test_remove_filter_and_re_add() {
        let fx = Fixture::new();
        let now = fx.clock.now();
        let dashboard = fx
            .store
            .update(|s| s.add_dashboard(fx.student, fx.execution, now - Duration::hours(1)))
            .await;
        answer_mixed(&fx).await;
        let service = fx.failed_answer_service();
        let failed = service.update_failed_answers(fx.student, dashboard).await.unwrap().remove(0);

        let (start, end) = (now - Duration::minutes(1), now + Duration::minutes(1));
        service.remove_failed_answer(fx.student, dashboard, failed.id).await.unwrap();
        assert!(service.get_failed_answers(fx.student, dashboard).await.unwrap().is_empty());
        assert!(service.get_filtered_failed_answers(fx.student, dashboard, start, end).await.unwrap().is_empty());

        let outside = service
            .re_add_failed_answers(fx.student, dashboard, now + Duration::hours(1), now + Duration::hours(2))
            .await
            .unwrap();
        assert!(outside.is_empty());

        let restored = service.re_add_failed_answers(fx.student, dashboard, start, end).await.unwrap();
        assert_eq!(restored.len(), 1);
        assert!(!restored[0].removed);
        assert!(service.re_add_failed_answers(fx.student, dashboard, start, end).await.unwrap().is_empty());
        assert_eq!(service.get_filtered_failed_answers(fx.student, dashboard, start, end).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_dashboard_and_failed_answer() {
        let fx = Fixture::new();
        let dashboard = fx.store.update(|s| s.add_dashboard(fx.student, fx.execution, fx.clock.now())).await;
        let service = fx.failed_answer_service();

        let err = service.update_failed_answers(fx.student, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::Dashboard, .. }));
        let err = service.remove_failed_answer(fx.student, dashboard, 999).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: Entity::FailedAnswer, .. }));
    }
}
