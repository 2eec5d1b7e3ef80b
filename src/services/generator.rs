// src/services/generator.rs

use std::collections::HashSet;
use std::sync::Arc;

use crate::{
    config::Config,
    error::{AppError, Entity},
    models::{
        question::{Assessment, Question},
        quiz::{NewQuiz, Quiz, QuizType},
        quiz_answer::QuizAnswer,
        statement::{StatementAnswer, StatementCreation, StatementQuiz, TournamentQuizRequest},
        student::{Student, StudentModel},
    },
    services::{
        answer::{questions_by_id, statement_questions},
        selection::QuestionSelector,
    },
    store::{Store, UnitOfWork},
    utils::{clock::Clock, retry::RetryPolicy},
};

/// Questions whose topics match one of the assessment's topic conjunctions.
pub fn filter_by_assessment(questions: Vec<Question>, assessment: &Assessment) -> Vec<Question> {
    questions
        .into_iter()
        .filter(|q| q.belongs_to_assessment(assessment))
        .collect()
}

/// Questions sharing at least one topic with `topics`.
pub fn filter_by_topics(questions: Vec<Question>, topics: &[i64]) -> Vec<Question> {
    questions
        .into_iter()
        .filter(|q| q.has_any_topic(topics))
        .collect()
}

pub struct QuizGenerator {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    selector: Arc<dyn QuestionSelector>,
    retry: RetryPolicy,
}

impl QuizGenerator {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, selector: Arc<dyn QuestionSelector>) -> Self {
        Self {
            store,
            clock,
            selector,
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

    /// Builds a personal practice quiz from the questions of an assessment.
    pub async fn generate_student_quiz(
        &self,
        student_id: i64,
        course_execution_id: i64,
        request: &StatementCreation,
    ) -> Result<StatementQuiz, AppError> {
        self.retry
            .run("generate_student_quiz", || {
                self.try_generate_student_quiz(student_id, course_execution_id, request)
            })
            .await
    }

    async fn try_generate_student_quiz(
        &self,
        student_id: i64,
        course_execution_id: i64,
        request: &StatementCreation,
    ) -> Result<StatementQuiz, AppError> {
        let now = self.clock.now();
        let mut uow = self.store.begin().await?;
        let student = uow.require_student(student_id).await?;
        let execution = uow.require_course_execution(course_execution_id).await?;

        let available = uow.available_questions(execution.course_id).await?;
        let pool = match request.assessment {
            Some(assessment_id) => {
                let assessment = uow.require_assessment(assessment_id).await?;
                filter_by_assessment(available, &assessment)
            }
            None => Vec::new(),
        };
        if pool.len() < request.number_of_questions {
            return Err(AppError::NotEnoughQuestions {
                requested: request.number_of_questions,
                available: pool.len(),
            });
        }

        let chosen = self
            .choose(&mut *uow, &student, request.number_of_questions, pool)
            .await?;

        let mut quiz = NewQuiz::new(execution.id, "Generated Quiz", QuizType::Generated);
        quiz.creation_date = Some(now);
        quiz.available_date = Some(now);
        quiz.generate(&chosen);

        let statement = persist(&mut *uow, &student, &quiz).await?;
        uow.commit().await?;

        tracing::info!(quiz_id = statement.id, student_id, course_execution_id, "Student quiz generated");
        Ok(statement)
    }

    /// Builds the quiz a student plays in a tournament.
    pub async fn generate_tournament_quiz(
        &self,
        student_id: i64,
        course_execution_id: i64,
        request: &TournamentQuizRequest,
    ) -> Result<StatementQuiz, AppError> {
        self.retry
            .run("generate_tournament_quiz", || {
                self.try_generate_tournament_quiz(student_id, course_execution_id, request)
            })
            .await
    }

    async fn try_generate_tournament_quiz(
        &self,
        student_id: i64,
        course_execution_id: i64,
        request: &TournamentQuizRequest,
    ) -> Result<StatementQuiz, AppError> {
        let now = self.clock.now();
        let tournament = &request.tournament;
        let mut uow = self.store.begin().await?;
        let student = uow.require_student(student_id).await?;
        let execution = uow.require_course_execution(course_execution_id).await?;

        let available = uow.available_questions(execution.course_id).await?;
        let pool = match &request.topics {
            Some(topics) => filter_by_topics(available, topics),
            None => Vec::new(),
        };
        if pool.len() < request.number_of_questions {
            return Err(AppError::NotEnoughQuestionsTournament {
                requested: request.number_of_questions,
                available: pool.len(),
            });
        }

        let chosen = self
            .choose(&mut *uow, &student, request.number_of_questions, pool)
            .await?;

        let title = format!("Tournament {} Quiz", tournament.id);
        let mut quiz = NewQuiz::new(execution.id, &title, QuizType::Tournament);
        quiz.creation_date = Some(now);
        if tournament.start_time > now {
            quiz.available_date = Some(tournament.start_time);
        }
        quiz.conclusion_date = Some(tournament.end_time);
        quiz.results_date = Some(tournament.end_time);
        quiz.generate(&chosen);

        let statement = persist(&mut *uow, &student, &quiz).await?;
        uow.commit().await?;

        tracing::info!(
            quiz_id = statement.id,
            tournament_id = tournament.id,
            student_id,
            "Tournament quiz generated"
        );
        Ok(statement)
    }

    /// Removes a question slot from a quiz nobody has answered yet.
    pub async fn remove_quiz_question(&self, quiz_question_id: i64) -> Result<(), AppError> {
        self.retry
            .run("remove_quiz_question", || async {
                let mut uow = self.store.begin().await?;
                let quiz_question = uow
                    .quiz_question(quiz_question_id)
                    .await?
                    .ok_or_else(|| AppError::not_found(Entity::QuizQuestion, quiz_question_id))?;

                if uow.count_question_answers(quiz_question_id).await? > 0 {
                    return Err(AppError::QuizQuestionHasAnswers(quiz_question.sequence));
                }
                uow.delete_quiz_question(quiz_question_id).await?;
                uow.commit().await?;

                tracing::info!(quiz_question_id, quiz_id = quiz_question.quiz_id, "Quiz question removed");
                Ok(())
            })
            .await
    }

    /// Runs the selector over the pool and checks it kept its side of the contract.
    async fn choose(
        &self,
        uow: &mut dyn UnitOfWork,
        student: &Student,
        count: usize,
        pool: Vec<Question>,
    ) -> Result<Vec<Question>, AppError> {
        let history: Vec<QuizAnswer> = uow.quiz_answers_for_student(student.id).await?;
        let answered: Vec<i64> = history.iter().flat_map(|qa| qa.question_ids()).collect();
        let questions = questions_by_id(uow, &answered).await?;
        let model = StudentModel::from_answers(&history, &questions);

        let pool_ids: HashSet<i64> = pool.iter().map(|q| q.id).collect();
        let chosen = self.selector.select(&model, count, pool);
        let chosen_ids: HashSet<i64> = chosen.iter().map(|q| q.id).collect();

        if chosen.len() != count || chosen_ids.len() != count || !chosen_ids.is_subset(&pool_ids) {
            tracing::error!(
                student_id = student.id,
                requested = count,
                returned = chosen.len(),
                "Question selector returned an invalid selection"
            );
            return Err(AppError::InternalServerError(
                "Question selection failed".to_string(),
            ));
        }
        Ok(chosen)
    }
}

/// Stores the quiz with the student's attempt and returns the statement.
async fn persist(uow: &mut dyn UnitOfWork, student: &Student, quiz: &NewQuiz) -> Result<StatementQuiz, AppError> {
    let quiz: Quiz = uow.insert_quiz(quiz).await?;
    let quiz_answer = uow
        .insert_quiz_answer(student.id, &quiz)
        .await?
        .ok_or(AppError::QuizAnswerAlreadyExists {
            student_id: student.id,
            quiz_id: quiz.id,
        })?;

    Ok(StatementQuiz {
        id: quiz.id,
        quiz_answer_id: quiz_answer.id,
        title: quiz.title.clone(),
        quiz_type: quiz.quiz_type,
        available_date: quiz.available_date,
        conclusion_date: quiz.conclusion_date,
        questions: statement_questions(uow, &quiz).await?,
        answers: quiz_answer.question_answers.iter().map(StatementAnswer::blank).collect(),
    })
}
