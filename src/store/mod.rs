// src/store/mod.rs

//! Persistence seam for the answer services.
//!
//! Every service operation runs inside one [`UnitOfWork`]: it is opened with
//! [`Store::begin`], and its writes become visible only on [`UnitOfWork::commit`].
//! Dropping a unit of work without committing discards its writes.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::{AppError, Entity},
    models::{
        dashboard::{Dashboard, FailedAnswer, NewFailedAnswer},
        question::{Assessment, CourseExecution, Question},
        quiz::{NewQuiz, Quiz, QuizQuestion},
        quiz_answer::QuizAnswer,
        staged::{NewQuestionAnswerItem, NewQuizAnswerItem, QuestionAnswerItem, QuizAnswerItem},
        student::Student,
    },
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryState, MemoryStore};
pub use postgres::PgStore;

#[async_trait]
pub trait Store: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError>;
}

#[async_trait]
pub trait UnitOfWork: Send {
    // Reference data owned by other parts of the platform.
    async fn student(&mut self, id: i64) -> Result<Option<Student>, AppError>;
    async fn students_in_execution(&mut self, course_execution_id: i64) -> Result<Vec<Student>, AppError>;
    async fn course_execution(&mut self, id: i64) -> Result<Option<CourseExecution>, AppError>;
    async fn assessment(&mut self, id: i64) -> Result<Option<Assessment>, AppError>;
    async fn question(&mut self, id: i64) -> Result<Option<Question>, AppError>;
    async fn questions(&mut self, ids: &[i64]) -> Result<Vec<Question>, AppError>;
    /// Questions of a course that may be placed in new quizzes.
    async fn available_questions(&mut self, course_id: i64) -> Result<Vec<Question>, AppError>;

    // Quizzes.
    async fn quiz(&mut self, id: i64) -> Result<Option<Quiz>, AppError>;
    async fn quizzes_for_execution(&mut self, course_execution_id: i64) -> Result<Vec<Quiz>, AppError>;
    async fn insert_quiz(&mut self, quiz: &NewQuiz) -> Result<Quiz, AppError>;
    async fn quiz_question(&mut self, id: i64) -> Result<Option<QuizQuestion>, AppError>;
    async fn count_question_answers(&mut self, quiz_question_id: i64) -> Result<i64, AppError>;
    async fn delete_quiz_question(&mut self, id: i64) -> Result<(), AppError>;

    // Quiz answers.
    async fn quiz_answer(&mut self, id: i64) -> Result<Option<QuizAnswer>, AppError>;
    /// Like [`UnitOfWork::quiz_answer`], but other units of work that lock the same
    /// attempt wait until this one ends. Stores that serialize whole units of work
    /// need nothing more than a plain read.
    async fn lock_quiz_answer(&mut self, id: i64) -> Result<Option<QuizAnswer>, AppError> {
        self.quiz_answer(id).await
    }
    async fn find_quiz_answer(&mut self, student_id: i64, quiz_id: i64) -> Result<Option<QuizAnswer>, AppError>;
    /// Inserts a fresh attempt with one blank question answer per quiz question.
    /// Returns `None` when the student already has an attempt at the quiz.
    async fn insert_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> Result<Option<QuizAnswer>, AppError>;
    /// Atomic get-or-create on the (student, quiz) pair.
    async fn get_or_create_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> Result<QuizAnswer, AppError>;
    /// Writes the attempt's dates and flags and every question answer's time and details.
    async fn save_quiz_answer(&mut self, quiz_answer: &QuizAnswer) -> Result<(), AppError>;
    /// Deletes the attempt with its question answers. Returns whether it existed.
    async fn delete_quiz_answer(&mut self, id: i64) -> Result<bool, AppError>;
    async fn quiz_answers_for_quiz(&mut self, quiz_id: i64) -> Result<Vec<QuizAnswer>, AppError>;
    async fn quiz_answers_for_student(&mut self, student_id: i64) -> Result<Vec<QuizAnswer>, AppError>;
    async fn quiz_answers_for_execution(&mut self, course_execution_id: i64) -> Result<Vec<QuizAnswer>, AppError>;
    async fn all_quiz_answers(&mut self) -> Result<Vec<QuizAnswer>, AppError>;
    /// Finalized attempts not yet counted whose quiz's results window has passed.
    /// Attempts claimed by a concurrent unit of work are left out.
    async fn quiz_answers_pending_statistics(&mut self, now: DateTime<Utc>) -> Result<Vec<QuizAnswer>, AppError>;

    // Staged submissions.
    async fn stage_quiz_answer_item(&mut self, item: &NewQuizAnswerItem) -> Result<i64, AppError>;
    /// Staged submissions of a quiz, oldest first. Items claimed by a concurrent
    /// unit of work are left out.
    async fn quiz_answer_items(&mut self, quiz_id: i64) -> Result<Vec<QuizAnswerItem>, AppError>;
    async fn delete_quiz_answer_item(&mut self, id: i64) -> Result<(), AppError>;
    async fn quizzes_with_pending_items(&mut self) -> Result<BTreeSet<i64>, AppError>;
    async fn stage_question_answer_item(&mut self, item: &NewQuestionAnswerItem) -> Result<i64, AppError>;
    async fn question_answer_items_for_username(&mut self, username: &str) -> Result<Vec<QuestionAnswerItem>, AppError>;
    async fn delete_question_answer_items_for_usernames(&mut self, usernames: &[String]) -> Result<u64, AppError>;

    // Dashboards.
    async fn dashboard(&mut self, id: i64) -> Result<Option<Dashboard>, AppError>;
    async fn save_dashboard(&mut self, dashboard: &Dashboard) -> Result<(), AppError>;
    async fn failed_answers(&mut self, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError>;
    async fn insert_failed_answer(&mut self, failed_answer: &NewFailedAnswer) -> Result<FailedAnswer, AppError>;
    async fn save_failed_answer(&mut self, failed_answer: &FailedAnswer) -> Result<(), AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;

    async fn require_student(&mut self, id: i64) -> Result<Student, AppError> {
        self.student(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::Student, id))
    }

    async fn require_course_execution(&mut self, id: i64) -> Result<CourseExecution, AppError> {
        self.course_execution(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::CourseExecution, id))
    }

    async fn require_assessment(&mut self, id: i64) -> Result<Assessment, AppError> {
        self.assessment(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::Assessment, id))
    }

    async fn require_question(&mut self, id: i64) -> Result<Question, AppError> {
        self.question(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::Question, id))
    }

    async fn require_quiz(&mut self, id: i64) -> Result<Quiz, AppError> {
        self.quiz(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::Quiz, id))
    }

    /// Locked read; see [`UnitOfWork::lock_quiz_answer`].
    async fn require_quiz_answer(&mut self, id: i64) -> Result<QuizAnswer, AppError> {
        self.lock_quiz_answer(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::QuizAnswer, id))
    }

    async fn require_dashboard(&mut self, id: i64) -> Result<Dashboard, AppError> {
        self.dashboard(id)
            .await?
            .ok_or_else(|| AppError::not_found(Entity::Dashboard, id))
    }

    async fn require_own_dashboard(&mut self, id: i64, student_id: i64) -> Result<Dashboard, AppError> {
        let dashboard = self.require_dashboard(id).await?;
        if dashboard.student_id != student_id {
            return Err(AppError::NotOwner { entity: Entity::Dashboard, id });
        }
        Ok(dashboard)
    }
}
