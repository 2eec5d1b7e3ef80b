// src/store/memory.rs

//! In-process store. A unit of work holds the store lock for its whole life and edits a
//! private copy of the state, which replaces the shared state on commit.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::AppError,
    models::{
        dashboard::{Dashboard, FailedAnswer, NewFailedAnswer},
        question::{Assessment, CourseExecution, Question, QuestionKind, QuestionStatus},
        quiz::{NewQuiz, Quiz, QuizQuestion},
        quiz_answer::{QuestionAnswer, QuizAnswer},
        staged::{NewQuestionAnswerItem, NewQuizAnswerItem, QuestionAnswerItem, QuizAnswerItem},
        student::Student,
    },
    store::{Store, UnitOfWork},
};

#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub students: BTreeMap<i64, Student>,
    pub course_executions: BTreeMap<i64, CourseExecution>,
    pub assessments: BTreeMap<i64, Assessment>,
    pub questions: BTreeMap<i64, Question>,
    pub quizzes: BTreeMap<i64, Quiz>,
    pub quiz_answers: BTreeMap<i64, QuizAnswer>,
    pub quiz_answer_items: BTreeMap<i64, QuizAnswerItem>,
    pub question_answer_items: BTreeMap<i64, QuestionAnswerItem>,
    pub dashboards: BTreeMap<i64, Dashboard>,
    pub failed_answers: BTreeMap<i64, FailedAnswer>,
    last_id: i64,
}

impl MemoryState {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    pub fn add_course_execution(&mut self, course_id: i64) -> i64 {
        let id = self.next_id();
        self.course_executions.insert(id, CourseExecution { id, course_id });
        id
    }

    pub fn add_student(&mut self, username: &str, course_execution_ids: &[i64]) -> i64 {
        let id = self.next_id();
        self.students.insert(
            id,
            Student {
                id,
                username: username.to_string(),
                course_execution_ids: course_execution_ids.to_vec(),
            },
        );
        id
    }

    pub fn add_question(&mut self, course_id: i64, topic_ids: &[i64], kind: QuestionKind) -> i64 {
        let id = self.next_id();
        self.questions.insert(
            id,
            Question {
                id,
                course_id,
                title: format!("Question {}", id),
                content: format!("Content of question {}", id),
                status: QuestionStatus::Available,
                topic_ids: topic_ids.to_vec(),
                kind,
            },
        );
        id
    }

    pub fn add_assessment(&mut self, course_execution_id: i64, topic_conjunctions: Vec<Vec<i64>>) -> i64 {
        let id = self.next_id();
        self.assessments.insert(
            id,
            Assessment {
                id,
                course_execution_id,
                title: format!("Assessment {}", id),
                topic_conjunctions,
            },
        );
        id
    }

    pub fn add_quiz(&mut self, quiz: &NewQuiz) -> Quiz {
        let id = self.next_id();
        let questions = quiz
            .questions
            .iter()
            .map(|q| QuizQuestion {
                id: self.next_id(),
                quiz_id: id,
                question_id: q.question_id,
                sequence: q.sequence,
            })
            .collect();
        let stored = Quiz {
            id,
            course_execution_id: quiz.course_execution_id,
            title: quiz.title.clone(),
            quiz_type: quiz.quiz_type,
            creation_date: quiz.creation_date,
            available_date: quiz.available_date,
            conclusion_date: quiz.conclusion_date,
            results_date: quiz.results_date,
            qr_code_only: quiz.qr_code_only,
            questions,
        };
        self.quizzes.insert(id, stored.clone());
        stored
    }

    pub fn add_dashboard(&mut self, student_id: i64, course_execution_id: i64, last_check: DateTime<Utc>) -> i64 {
        let id = self.next_id();
        self.dashboards.insert(
            id,
            Dashboard {
                id,
                student_id,
                course_execution_id,
                last_check_failed_answers: last_check,
            },
        );
        id
    }

    fn new_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> QuizAnswer {
        let id = self.next_id();
        let mut slots: Vec<&QuizQuestion> = quiz.questions.iter().collect();
        slots.sort_by_key(|qq| qq.sequence);
        let question_answers = slots
            .into_iter()
            .map(|qq| QuestionAnswer {
                id: self.next_id(),
                quiz_answer_id: id,
                quiz_question_id: qq.id,
                question_id: qq.question_id,
                sequence: qq.sequence,
                time_taken: None,
                answer_details: None,
            })
            .collect();
        let quiz_answer = QuizAnswer {
            id,
            student_id,
            quiz_id: quiz.id,
            creation_date: None,
            answer_date: None,
            completed: false,
            used_in_statistics: false,
            question_answers,
        };
        self.quiz_answers.insert(id, quiz_answer.clone());
        quiz_answer
    }

    fn execution_of_quiz(&self, quiz_id: i64) -> Option<i64> {
        self.quizzes.get(&quiz_id).map(|q| q.course_execution_id)
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Copy of the committed state.
    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }

    /// Applies `f` to the committed state directly, outside any unit of work.
    pub async fn update<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        f(&mut *self.state.lock().await)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

pub struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn student(&mut self, id: i64) -> Result<Option<Student>, AppError> {
        Ok(self.working.students.get(&id).cloned())
    }

    async fn students_in_execution(&mut self, course_execution_id: i64) -> Result<Vec<Student>, AppError> {
        Ok(self
            .working
            .students
            .values()
            .filter(|s| s.is_enrolled(course_execution_id))
            .cloned()
            .collect())
    }

    async fn course_execution(&mut self, id: i64) -> Result<Option<CourseExecution>, AppError> {
        Ok(self.working.course_executions.get(&id).cloned())
    }

    async fn assessment(&mut self, id: i64) -> Result<Option<Assessment>, AppError> {
        Ok(self.working.assessments.get(&id).cloned())
    }

    async fn question(&mut self, id: i64) -> Result<Option<Question>, AppError> {
        Ok(self.working.questions.get(&id).cloned())
    }

    async fn questions(&mut self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        Ok(ids
            .iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .filter_map(|id| self.working.questions.get(id).cloned())
            .collect())
    }

    async fn available_questions(&mut self, course_id: i64) -> Result<Vec<Question>, AppError> {
        Ok(self
            .working
            .questions
            .values()
            .filter(|q| q.course_id == course_id && q.status == QuestionStatus::Available)
            .cloned()
            .collect())
    }

    async fn quiz(&mut self, id: i64) -> Result<Option<Quiz>, AppError> {
        Ok(self.working.quizzes.get(&id).cloned())
    }

    async fn quizzes_for_execution(&mut self, course_execution_id: i64) -> Result<Vec<Quiz>, AppError> {
        Ok(self
            .working
            .quizzes
            .values()
            .filter(|q| q.course_execution_id == course_execution_id)
            .cloned()
            .collect())
    }

    async fn insert_quiz(&mut self, quiz: &NewQuiz) -> Result<Quiz, AppError> {
        Ok(self.working.add_quiz(quiz))
    }

    async fn quiz_question(&mut self, id: i64) -> Result<Option<QuizQuestion>, AppError> {
        Ok(self
            .working
            .quizzes
            .values()
            .flat_map(|q| q.questions.iter())
            .find(|qq| qq.id == id)
            .cloned())
    }

    async fn count_question_answers(&mut self, quiz_question_id: i64) -> Result<i64, AppError> {
        Ok(self
            .working
            .quiz_answers
            .values()
            .flat_map(|qa| qa.question_answers.iter())
            .filter(|a| a.quiz_question_id == quiz_question_id)
            .count() as i64)
    }

    async fn delete_quiz_question(&mut self, id: i64) -> Result<(), AppError> {
        for quiz in self.working.quizzes.values_mut() {
            quiz.questions.retain(|qq| qq.id != id);
        }
        Ok(())
    }

    async fn quiz_answer(&mut self, id: i64) -> Result<Option<QuizAnswer>, AppError> {
        Ok(self.working.quiz_answers.get(&id).cloned())
    }

    async fn find_quiz_answer(&mut self, student_id: i64, quiz_id: i64) -> Result<Option<QuizAnswer>, AppError> {
        Ok(self
            .working
            .quiz_answers
            .values()
            .find(|qa| qa.student_id == student_id && qa.quiz_id == quiz_id)
            .cloned())
    }

    async fn insert_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> Result<Option<QuizAnswer>, AppError> {
        if self.find_quiz_answer(student_id, quiz.id).await?.is_some() {
            return Ok(None);
        }
        Ok(Some(self.working.new_quiz_answer(student_id, quiz)))
    }

    async fn get_or_create_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> Result<QuizAnswer, AppError> {
        match self.find_quiz_answer(student_id, quiz.id).await? {
            Some(existing) => Ok(existing),
            None => Ok(self.working.new_quiz_answer(student_id, quiz)),
        }
    }

    async fn save_quiz_answer(&mut self, quiz_answer: &QuizAnswer) -> Result<(), AppError> {
        self.working.quiz_answers.insert(quiz_answer.id, quiz_answer.clone());
        Ok(())
    }

    async fn delete_quiz_answer(&mut self, id: i64) -> Result<bool, AppError> {
        let Some(removed) = self.working.quiz_answers.remove(&id) else {
            return Ok(false);
        };
        let answer_ids: BTreeSet<i64> = removed.question_answers.iter().map(|a| a.id).collect();
        self.working
            .failed_answers
            .retain(|_, fa| !answer_ids.contains(&fa.question_answer_id));
        self.working.quiz_answer_items.retain(|_, item| item.quiz_answer_id != id);
        Ok(true)
    }

    async fn quiz_answers_for_quiz(&mut self, quiz_id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        Ok(self
            .working
            .quiz_answers
            .values()
            .filter(|qa| qa.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn quiz_answers_for_student(&mut self, student_id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        Ok(self
            .working
            .quiz_answers
            .values()
            .filter(|qa| qa.student_id == student_id)
            .cloned()
            .collect())
    }

    async fn quiz_answers_for_execution(&mut self, course_execution_id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        Ok(self
            .working
            .quiz_answers
            .values()
            .filter(|qa| self.working.execution_of_quiz(qa.quiz_id) == Some(course_execution_id))
            .cloned()
            .collect())
    }

    async fn all_quiz_answers(&mut self) -> Result<Vec<QuizAnswer>, AppError> {
        Ok(self.working.quiz_answers.values().cloned().collect())
    }

    async fn quiz_answers_pending_statistics(&mut self, now: DateTime<Utc>) -> Result<Vec<QuizAnswer>, AppError> {
        Ok(self
            .working
            .quiz_answers
            .values()
            .filter(|qa| qa.answer_date.is_some() && !qa.used_in_statistics)
            .filter(|qa| {
                self.working
                    .quizzes
                    .get(&qa.quiz_id)
                    .is_some_and(|quiz| quiz.statistics_due(now))
            })
            .cloned()
            .collect())
    }

    async fn stage_quiz_answer_item(&mut self, item: &NewQuizAnswerItem) -> Result<i64, AppError> {
        let id = self.working.next_id();
        self.working.quiz_answer_items.insert(
            id,
            QuizAnswerItem {
                id,
                quiz_id: item.quiz_id,
                quiz_answer_id: item.quiz_answer_id,
                answer_date: item.answer_date,
                answers: item.answers.clone(),
            },
        );
        Ok(id)
    }

    async fn quiz_answer_items(&mut self, quiz_id: i64) -> Result<Vec<QuizAnswerItem>, AppError> {
        Ok(self
            .working
            .quiz_answer_items
            .values()
            .filter(|item| item.quiz_id == quiz_id)
            .cloned()
            .collect())
    }

    async fn delete_quiz_answer_item(&mut self, id: i64) -> Result<(), AppError> {
        self.working.quiz_answer_items.remove(&id);
        Ok(())
    }

    async fn quizzes_with_pending_items(&mut self) -> Result<BTreeSet<i64>, AppError> {
        Ok(self
            .working
            .quiz_answer_items
            .values()
            .map(|item| item.quiz_id)
            .collect())
    }

    async fn stage_question_answer_item(&mut self, item: &NewQuestionAnswerItem) -> Result<i64, AppError> {
        let id = self.working.next_id();
        self.working.question_answer_items.insert(
            id,
            QuestionAnswerItem {
                id,
                username: item.username.clone(),
                quiz_id: item.quiz_id,
                quiz_question_id: item.quiz_question_id,
                answer_date: item.answer_date,
                time_taken: item.time_taken,
                time_to_submission: item.time_to_submission,
                answer_details: item.answer_details.clone(),
            },
        );
        Ok(id)
    }

    async fn question_answer_items_for_username(&mut self, username: &str) -> Result<Vec<QuestionAnswerItem>, AppError> {
        Ok(self
            .working
            .question_answer_items
            .values()
            .filter(|item| item.username == username)
            .cloned()
            .collect())
    }

    async fn delete_question_answer_items_for_usernames(&mut self, usernames: &[String]) -> Result<u64, AppError> {
        let before = self.working.question_answer_items.len();
        self.working
            .question_answer_items
            .retain(|_, item| !usernames.contains(&item.username));
        Ok((before - self.working.question_answer_items.len()) as u64)
    }

    async fn dashboard(&mut self, id: i64) -> Result<Option<Dashboard>, AppError> {
        Ok(self.working.dashboards.get(&id).cloned())
    }

    async fn save_dashboard(&mut self, dashboard: &Dashboard) -> Result<(), AppError> {
        self.working.dashboards.insert(dashboard.id, dashboard.clone());
        Ok(())
    }

    async fn failed_answers(&mut self, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError> {
        Ok(self
            .working
            .failed_answers
            .values()
            .filter(|fa| fa.dashboard_id == dashboard_id)
            .cloned()
            .collect())
    }

    async fn insert_failed_answer(&mut self, failed_answer: &NewFailedAnswer) -> Result<FailedAnswer, AppError> {
        let id = self.working.next_id();
        let stored = FailedAnswer {
            id,
            dashboard_id: failed_answer.dashboard_id,
            question_answer_id: failed_answer.question_answer_id,
            quiz_answer_id: failed_answer.quiz_answer_id,
            question_id: failed_answer.question_id,
            collected: failed_answer.collected,
            removed: false,
        };
        self.working.failed_answers.insert(id, stored.clone());
        Ok(stored)
    }

    async fn save_failed_answer(&mut self, failed_answer: &FailedAnswer) -> Result<(), AppError> {
        self.working.failed_answers.insert(failed_answer.id, failed_answer.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        let MemoryUnitOfWork { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::quiz::{NewQuizQuestion, QuizType};

    fn seeded() -> (MemoryStore, i64, Quiz) {
        let mut state = MemoryState::default();
        let execution = state.add_course_execution(1);
        let student = state.add_student("ana", &[execution]);
        let q1 = state.add_question(1, &[], QuestionKind::OpenAnswer { answer: "a".into() });
        let q2 = state.add_question(1, &[], QuestionKind::OpenAnswer { answer: "b".into() });
        let mut new_quiz = NewQuiz::new(execution, "Quiz", QuizType::Proposed);
        new_quiz.questions = vec![
            NewQuizQuestion { question_id: q2, sequence: 2 },
            NewQuizQuestion { question_id: q1, sequence: 1 },
        ];
        let quiz = state.add_quiz(&new_quiz);
        (MemoryStore::new(state), student, quiz)
    }

    #[tokio::test]
    async fn test_uncommitted_work_is_discarded() {
        let (store, student, quiz) = seeded();

        let mut uow = store.begin().await.unwrap();
        uow.insert_quiz_answer(student, &quiz).await.unwrap();
        drop(uow);

        assert!(store.snapshot().await.quiz_answers.is_empty());
    }

    #[tokio::test]
    async fn test_quiz_answer_slots_follow_sequence() {
        let (store, student, quiz) = seeded();

        let mut uow = store.begin().await.unwrap();
        let created = uow.get_or_create_quiz_answer(student, &quiz).await.unwrap();
        let again = uow.get_or_create_quiz_answer(student, &quiz).await.unwrap();
        assert!(uow.insert_quiz_answer(student, &quiz).await.unwrap().is_none());
        uow.commit().await.unwrap();

        assert_eq!(created.id, again.id);
        let sequences: Vec<i32> = created.question_answers.iter().map(|a| a.sequence).collect();
        assert_eq!(sequences, vec![1, 2]);
        assert_eq!(store.snapshot().await.quiz_answers.len(), 1);
    }
}
