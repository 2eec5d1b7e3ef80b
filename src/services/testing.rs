// src/services/testing.rs

//! Shared seed data for service tests.

use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use crate::{
    models::{
        question::{QuestionKind, QuestionOption},
        quiz::{NewQuiz, NewQuizQuestion, Quiz, QuizType},
        quiz_answer::{AnswerDetails, QuizAnswer},
        statement::{ConcludeQuizRequest, StatementAnswer, StatementQuiz},
    },
    services::{
        answer::AnswerService,
        failed_answer::FailedAnswerService,
        generator::QuizGenerator,
        selection::{QuestionSelector, StudentModelSelector},
        statistics::{LoggingStatistics, StatisticsSink},
    },
    store::{MemoryState, MemoryStore},
    utils::{clock::FixedClock, retry::RetryPolicy},
};

pub(crate) const CORRECT_OPTION: i64 = 1;
pub(crate) const WRONG_OPTION: i64 = 2;

pub(crate) fn multiple_choice() -> QuestionKind {
    QuestionKind::MultipleChoice {
        options: vec![
            QuestionOption { id: CORRECT_OPTION, content: "A".into(), correct: true },
            QuestionOption { id: WRONG_OPTION, content: "B".into(), correct: false },
        ],
    }
}

fn start_of_term() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

/// One course execution with an enrolled student ("ana"), a student of another
/// execution ("bob") and three multiple choice questions with topics
/// `[10]`, `[10, 11]` and `[11]`.
pub(crate) struct Fixture {
    pub store: MemoryStore,
    pub clock: Arc<FixedClock>,
    pub execution: i64,
    pub student: i64,
    pub outsider: i64,
    pub questions: Vec<i64>,
}

impl Fixture {
    pub fn new() -> Self {
        let mut state = MemoryState::default();
        let execution = state.add_course_execution(1);
        let other_execution = state.add_course_execution(2);
        let student = state.add_student("ana", &[execution]);
        let outsider = state.add_student("bob", &[other_execution]);
        let questions = vec![
            state.add_question(1, &[10], multiple_choice()),
            state.add_question(1, &[10, 11], multiple_choice()),
            state.add_question(1, &[11], multiple_choice()),
        ];

        Self {
            store: MemoryStore::new(state),
            clock: Arc::new(FixedClock::new(start_of_term())),
            execution,
            student,
            outsider,
            questions,
        }
    }

    /// Stores a quiz of the fixture execution holding every fixture question in order.
    pub async fn add_quiz(&self, quiz_type: QuizType, configure: impl FnOnce(&mut NewQuiz)) -> Quiz {
        let mut quiz = NewQuiz::new(self.execution, "Quiz", quiz_type);
        quiz.questions = self
            .questions
            .iter()
            .zip(1..)
            .map(|(&question_id, sequence)| NewQuizQuestion { question_id, sequence })
            .collect();
        configure(&mut quiz);
        self.store.update(|s| s.add_quiz(&quiz)).await
    }

    fn retry() -> RetryPolicy {
        RetryPolicy::new(3, StdDuration::ZERO)
    }

    pub fn answer_service(&self) -> AnswerService {
        self.answer_service_with(Arc::new(LoggingStatistics))
    }

    pub fn answer_service_with_recorder(&self) -> (AnswerService, Arc<RecordingStatistics>) {
        let recorder = Arc::new(RecordingStatistics::default());
        (self.answer_service_with(recorder.clone()), recorder)
    }

    fn answer_service_with(&self, statistics: Arc<dyn StatisticsSink>) -> AnswerService {
        AnswerService::new(Arc::new(self.store.clone()), self.clock.clone(), statistics)
            .with_retry(Self::retry())
    }

    pub fn generator(&self, selector: Arc<dyn QuestionSelector>) -> QuizGenerator {
        QuizGenerator::new(Arc::new(self.store.clone()), self.clock.clone(), selector)
            .with_retry(Self::retry())
    }

    pub fn default_generator(&self) -> QuizGenerator {
        self.generator(Arc::new(StudentModelSelector))
    }

    pub fn failed_answer_service(&self) -> FailedAnswerService {
        FailedAnswerService::new(Arc::new(self.store.clone()), self.clock.clone())
            .with_retry(Self::retry())
    }
}

/// Fills every slot of the statement with the given option.
pub(crate) fn answer_all(statement: &StatementQuiz, option: i64) -> Vec<StatementAnswer> {
    statement
        .answers
        .iter()
        .map(|slot| StatementAnswer {
            time_taken: Some(1000),
            answer_details: Some(AnswerDetails::MultipleChoice { option_ids: vec![option] }),
            ..slot.clone()
        })
        .collect()
}

pub(crate) fn submission(statement: &StatementQuiz, option: i64) -> ConcludeQuizRequest {
    ConcludeQuizRequest {
        quiz_answer_id: statement.quiz_answer_id,
        answers: answer_all(statement, option),
    }
}

#[derive(Default)]
pub(crate) struct RecordingStatistics {
    seen: Mutex<Vec<i64>>,
}

impl RecordingStatistics {
    pub fn seen(&self) -> Vec<i64> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatisticsSink for RecordingStatistics {
    async fn quiz_answer_finalized(&self, quiz_answer: &QuizAnswer, _quiz: &Quiz) {
        self.seen.lock().unwrap().push(quiz_answer.id);
    }
}
