// src/store/postgres.rs

//! Postgres store. Each unit of work is one READ COMMITTED transaction.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction, types::Json};

use crate::{
    error::AppError,
    models::{
        dashboard::{Dashboard, FailedAnswer, NewFailedAnswer},
        question::{Assessment, CourseExecution, Question, QuestionKind, QuestionStatus},
        quiz::{NewQuiz, Quiz, QuizQuestion, QuizType},
        quiz_answer::{AnswerDetails, QuestionAnswer, QuizAnswer},
        staged::{NewQuestionAnswerItem, NewQuizAnswerItem, QuestionAnswerItem, QuizAnswerItem},
        statement::StatementAnswer,
        student::Student,
    },
    store::{Store, UnitOfWork},
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, AppError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }
}

pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

// Row shapes. Enum-like columns are TEXT and structured columns are JSONB.

const STUDENT_SELECT: &str = r#"
    SELECT s.id, s.username,
           COALESCE(array_agg(e.course_execution_id) FILTER (WHERE e.course_execution_id IS NOT NULL), '{}') AS course_execution_ids
    FROM students s
    LEFT JOIN enrollments e ON e.student_id = s.id
"#;

#[derive(FromRow)]
struct StudentRow {
    id: i64,
    username: String,
    course_execution_ids: Vec<i64>,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Student {
            id: row.id,
            username: row.username,
            course_execution_ids: row.course_execution_ids,
        }
    }
}

#[derive(FromRow)]
struct QuestionRow {
    id: i64,
    course_id: i64,
    title: String,
    content: String,
    status: String,
    topic_ids: Vec<i64>,
    kind: Json<QuestionKind>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = AppError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let status = QuestionStatus::parse(&row.status).ok_or_else(|| {
            AppError::InternalServerError(format!("Unknown question status {}", row.status))
        })?;
        Ok(Question {
            id: row.id,
            course_id: row.course_id,
            title: row.title,
            content: row.content,
            status,
            topic_ids: row.topic_ids,
            kind: row.kind.0,
        })
    }
}

#[derive(FromRow)]
struct AssessmentRow {
    id: i64,
    course_execution_id: i64,
    title: String,
    topic_conjunctions: Json<Vec<Vec<i64>>>,
}

#[derive(FromRow)]
struct QuizRow {
    id: i64,
    course_execution_id: i64,
    title: String,
    quiz_type: String,
    creation_date: Option<DateTime<Utc>>,
    available_date: Option<DateTime<Utc>>,
    conclusion_date: Option<DateTime<Utc>>,
    results_date: Option<DateTime<Utc>>,
    qr_code_only: bool,
}

#[derive(FromRow)]
struct QuizQuestionRow {
    id: i64,
    quiz_id: i64,
    question_id: i64,
    sequence: i32,
}

#[derive(FromRow)]
struct QuizAnswerRow {
    id: i64,
    student_id: i64,
    quiz_id: i64,
    creation_date: Option<DateTime<Utc>>,
    answer_date: Option<DateTime<Utc>>,
    completed: bool,
    used_in_statistics: bool,
}

#[derive(FromRow)]
struct QuestionAnswerRow {
    id: i64,
    quiz_answer_id: i64,
    quiz_question_id: i64,
    question_id: i64,
    sequence: i32,
    time_taken: Option<i32>,
    answer_details: Option<Json<AnswerDetails>>,
}

impl From<QuestionAnswerRow> for QuestionAnswer {
    fn from(row: QuestionAnswerRow) -> Self {
        QuestionAnswer {
            id: row.id,
            quiz_answer_id: row.quiz_answer_id,
            quiz_question_id: row.quiz_question_id,
            question_id: row.question_id,
            sequence: row.sequence,
            time_taken: row.time_taken,
            answer_details: row.answer_details.map(|d| d.0),
        }
    }
}

#[derive(FromRow)]
struct QuizAnswerItemRow {
    id: i64,
    quiz_id: i64,
    quiz_answer_id: i64,
    answer_date: DateTime<Utc>,
    answers: Json<Vec<StatementAnswer>>,
}

#[derive(FromRow)]
struct QuestionAnswerItemRow {
    id: i64,
    username: String,
    quiz_id: i64,
    quiz_question_id: i64,
    answer_date: DateTime<Utc>,
    time_taken: Option<i32>,
    time_to_submission: i32,
    answer_details: Option<Json<AnswerDetails>>,
}

const QUIZ_COLUMNS: &str = "id, course_execution_id, title, quiz_type, creation_date, available_date, conclusion_date, results_date, qr_code_only";
const QUIZ_ANSWER_COLUMNS: &str = "qa.id, qa.student_id, qa.quiz_id, qa.creation_date, qa.answer_date, qa.completed, qa.used_in_statistics";

impl PgUnitOfWork {
    /// Attaches the question slots to quiz rows.
    async fn assemble_quizzes(&mut self, rows: Vec<QuizRow>) -> Result<Vec<Quiz>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let slots: Vec<QuizQuestionRow> = sqlx::query_as(
            "SELECT id, quiz_id, question_id, sequence FROM quiz_questions WHERE quiz_id = ANY($1) ORDER BY sequence",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_quiz: HashMap<i64, Vec<QuizQuestion>> = HashMap::new();
        for slot in slots {
            by_quiz.entry(slot.quiz_id).or_default().push(QuizQuestion {
                id: slot.id,
                quiz_id: slot.quiz_id,
                question_id: slot.question_id,
                sequence: slot.sequence,
            });
        }

        rows.into_iter()
            .map(|row| {
                let quiz_type = QuizType::parse(&row.quiz_type).ok_or_else(|| {
                    AppError::InternalServerError(format!("Unknown quiz type {}", row.quiz_type))
                })?;
                Ok(Quiz {
                    id: row.id,
                    course_execution_id: row.course_execution_id,
                    title: row.title,
                    quiz_type,
                    creation_date: row.creation_date,
                    available_date: row.available_date,
                    conclusion_date: row.conclusion_date,
                    results_date: row.results_date,
                    qr_code_only: row.qr_code_only,
                    questions: by_quiz.remove(&row.id).unwrap_or_default(),
                })
            })
            .collect()
    }

    /// Attaches the question answers, ordered by sequence, to attempt rows.
    async fn assemble_quiz_answers(&mut self, rows: Vec<QuizAnswerRow>) -> Result<Vec<QuizAnswer>, AppError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let answers: Vec<QuestionAnswerRow> = sqlx::query_as(
            r#"
            SELECT a.id, a.quiz_answer_id, a.quiz_question_id, qq.question_id, qq.sequence,
                   a.time_taken, a.answer_details
            FROM question_answers a
            JOIN quiz_questions qq ON qq.id = a.quiz_question_id
            WHERE a.quiz_answer_id = ANY($1)
            ORDER BY qq.sequence
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await?;

        let mut by_attempt: HashMap<i64, Vec<QuestionAnswer>> = HashMap::new();
        for answer in answers {
            by_attempt
                .entry(answer.quiz_answer_id)
                .or_default()
                .push(answer.into());
        }

        Ok(rows
            .into_iter()
            .map(|row| QuizAnswer {
                id: row.id,
                student_id: row.student_id,
                quiz_id: row.quiz_id,
                creation_date: row.creation_date,
                answer_date: row.answer_date,
                completed: row.completed,
                used_in_statistics: row.used_in_statistics,
                question_answers: by_attempt.remove(&row.id).unwrap_or_default(),
            })
            .collect())
    }

    async fn fetch_quiz_answers(&mut self, filter: &str, id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        let sql = format!(
            "SELECT {} FROM quiz_answers qa JOIN quizzes q ON q.id = qa.quiz_id WHERE {} ORDER BY qa.id",
            QUIZ_ANSWER_COLUMNS, filter
        );
        let rows: Vec<QuizAnswerRow> = sqlx::query_as(&sql).bind(id).fetch_all(&mut *self.tx).await?;
        self.assemble_quiz_answers(rows).await
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn student(&mut self, id: i64) -> Result<Option<Student>, AppError> {
        let sql = format!("{} WHERE s.id = $1 GROUP BY s.id", STUDENT_SELECT);
        let row: Option<StudentRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(Student::from))
    }

    async fn students_in_execution(&mut self, course_execution_id: i64) -> Result<Vec<Student>, AppError> {
        let sql = format!(
            "{} WHERE s.id IN (SELECT student_id FROM enrollments WHERE course_execution_id = $1) GROUP BY s.id ORDER BY s.id",
            STUDENT_SELECT
        );
        let rows: Vec<StudentRow> = sqlx::query_as(&sql)
            .bind(course_execution_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn course_execution(&mut self, id: i64) -> Result<Option<CourseExecution>, AppError> {
        Ok(sqlx::query_as("SELECT id, course_id FROM course_executions WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?)
    }

    async fn assessment(&mut self, id: i64) -> Result<Option<Assessment>, AppError> {
        let row: Option<AssessmentRow> = sqlx::query_as(
            "SELECT id, course_execution_id, title, topic_conjunctions FROM assessments WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(|r| Assessment {
            id: r.id,
            course_execution_id: r.course_execution_id,
            title: r.title,
            topic_conjunctions: r.topic_conjunctions.0,
        }))
    }

    async fn question(&mut self, id: i64) -> Result<Option<Question>, AppError> {
        let row: Option<QuestionRow> = sqlx::query_as(
            "SELECT id, course_id, title, content, status, topic_ids, kind FROM questions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Question::try_from).transpose()
    }

    async fn questions(&mut self, ids: &[i64]) -> Result<Vec<Question>, AppError> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            "SELECT id, course_id, title, content, status, topic_ids, kind FROM questions WHERE id = ANY($1) ORDER BY id",
        )
        .bind(ids)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Question::try_from).collect()
    }

    async fn available_questions(&mut self, course_id: i64) -> Result<Vec<Question>, AppError> {
        let rows: Vec<QuestionRow> = sqlx::query_as(
            "SELECT id, course_id, title, content, status, topic_ids, kind FROM questions WHERE course_id = $1 AND status = $2 ORDER BY id",
        )
        .bind(course_id)
        .bind(QuestionStatus::Available.as_str())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(Question::try_from).collect()
    }

    async fn quiz(&mut self, id: i64) -> Result<Option<Quiz>, AppError> {
        let sql = format!("SELECT {} FROM quizzes WHERE id = $1", QUIZ_COLUMNS);
        let rows: Vec<QuizRow> = sqlx::query_as(&sql).bind(id).fetch_all(&mut *self.tx).await?;
        Ok(self.assemble_quizzes(rows).await?.pop())
    }

    async fn quizzes_for_execution(&mut self, course_execution_id: i64) -> Result<Vec<Quiz>, AppError> {
        let sql = format!(
            "SELECT {} FROM quizzes WHERE course_execution_id = $1 ORDER BY id",
            QUIZ_COLUMNS
        );
        let rows: Vec<QuizRow> = sqlx::query_as(&sql)
            .bind(course_execution_id)
            .fetch_all(&mut *self.tx)
            .await?;
        self.assemble_quizzes(rows).await
    }

    async fn insert_quiz(&mut self, quiz: &NewQuiz) -> Result<Quiz, AppError> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO quizzes (course_execution_id, title, quiz_type, creation_date, available_date, conclusion_date, results_date, qr_code_only)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(quiz.course_execution_id)
        .bind(&quiz.title)
        .bind(quiz.quiz_type.as_str())
        .bind(quiz.creation_date)
        .bind(quiz.available_date)
        .bind(quiz.conclusion_date)
        .bind(quiz.results_date)
        .bind(quiz.qr_code_only)
        .fetch_one(&mut *self.tx)
        .await?;

        let mut questions = Vec::with_capacity(quiz.questions.len());
        for slot in &quiz.questions {
            let slot_id: i64 = sqlx::query_scalar(
                "INSERT INTO quiz_questions (quiz_id, question_id, sequence) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(id)
            .bind(slot.question_id)
            .bind(slot.sequence)
            .fetch_one(&mut *self.tx)
            .await?;
            questions.push(QuizQuestion {
                id: slot_id,
                quiz_id: id,
                question_id: slot.question_id,
                sequence: slot.sequence,
            });
        }

        Ok(Quiz {
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
        })
    }

    async fn quiz_question(&mut self, id: i64) -> Result<Option<QuizQuestion>, AppError> {
        let row: Option<QuizQuestionRow> =
            sqlx::query_as("SELECT id, quiz_id, question_id, sequence FROM quiz_questions WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(row.map(|r| QuizQuestion {
            id: r.id,
            quiz_id: r.quiz_id,
            question_id: r.question_id,
            sequence: r.sequence,
        }))
    }

    async fn count_question_answers(&mut self, quiz_question_id: i64) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM question_answers WHERE quiz_question_id = $1")
            .bind(quiz_question_id)
            .fetch_one(&mut *self.tx)
            .await?)
    }

    async fn delete_quiz_question(&mut self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM quiz_questions WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn quiz_answer(&mut self, id: i64) -> Result<Option<QuizAnswer>, AppError> {
        Ok(self.fetch_quiz_answers("qa.id = $1", id).await?.pop())
    }

    async fn lock_quiz_answer(&mut self, id: i64) -> Result<Option<QuizAnswer>, AppError> {
        // Waits for a concurrent holder and then reads its committed row.
        let sql = format!(
            "SELECT {} FROM quiz_answers qa WHERE qa.id = $1 FOR UPDATE",
            QUIZ_ANSWER_COLUMNS
        );
        let rows: Vec<QuizAnswerRow> = sqlx::query_as(&sql).bind(id).fetch_all(&mut *self.tx).await?;
        Ok(self.assemble_quiz_answers(rows).await?.pop())
    }

    async fn find_quiz_answer(&mut self, student_id: i64, quiz_id: i64) -> Result<Option<QuizAnswer>, AppError> {
        let sql = format!(
            "SELECT {} FROM quiz_answers qa WHERE qa.student_id = $1 AND qa.quiz_id = $2",
            QUIZ_ANSWER_COLUMNS
        );
        let rows: Vec<QuizAnswerRow> = sqlx::query_as(&sql)
            .bind(student_id)
            .bind(quiz_id)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(self.assemble_quiz_answers(rows).await?.pop())
    }

    async fn insert_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> Result<Option<QuizAnswer>, AppError> {
        let id: Option<i64> = sqlx::query_scalar(
            r#"
            INSERT INTO quiz_answers (student_id, quiz_id, completed, used_in_statistics)
            VALUES ($1, $2, FALSE, FALSE)
            ON CONFLICT (student_id, quiz_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(student_id)
        .bind(quiz.id)
        .fetch_optional(&mut *self.tx)
        .await?;
        let Some(id) = id else {
            return Ok(None);
        };

        let mut slots: Vec<&QuizQuestion> = quiz.questions.iter().collect();
        slots.sort_by_key(|qq| qq.sequence);
        let mut question_answers = Vec::with_capacity(slots.len());
        for slot in slots {
            let answer_id: i64 = sqlx::query_scalar(
                "INSERT INTO question_answers (quiz_answer_id, quiz_question_id) VALUES ($1, $2) RETURNING id",
            )
            .bind(id)
            .bind(slot.id)
            .fetch_one(&mut *self.tx)
            .await?;
            question_answers.push(QuestionAnswer {
                id: answer_id,
                quiz_answer_id: id,
                quiz_question_id: slot.id,
                question_id: slot.question_id,
                sequence: slot.sequence,
                time_taken: None,
                answer_details: None,
            });
        }

        Ok(Some(QuizAnswer {
            id,
            student_id,
            quiz_id: quiz.id,
            creation_date: None,
            answer_date: None,
            completed: false,
            used_in_statistics: false,
            question_answers,
        }))
    }

    async fn get_or_create_quiz_answer(&mut self, student_id: i64, quiz: &Quiz) -> Result<QuizAnswer, AppError> {
        if let Some(created) = self.insert_quiz_answer(student_id, quiz).await? {
            return Ok(created);
        }
        // The conflicting row is committed by now, so a fresh statement sees it.
        self.find_quiz_answer(student_id, quiz.id).await?.ok_or_else(|| {
            AppError::Transient(format!(
                "Quiz answer for student {} and quiz {} vanished during creation",
                student_id, quiz.id
            ))
        })
    }

    async fn save_quiz_answer(&mut self, quiz_answer: &QuizAnswer) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE quiz_answers
            SET creation_date = $1, answer_date = $2, completed = $3, used_in_statistics = $4
            WHERE id = $5
            "#,
        )
        .bind(quiz_answer.creation_date)
        .bind(quiz_answer.answer_date)
        .bind(quiz_answer.completed)
        .bind(quiz_answer.used_in_statistics)
        .bind(quiz_answer.id)
        .execute(&mut *self.tx)
        .await?;

        for answer in &quiz_answer.question_answers {
            sqlx::query("UPDATE question_answers SET time_taken = $1, answer_details = $2 WHERE id = $3")
                .bind(answer.time_taken)
                .bind(answer.answer_details.clone().map(Json))
                .bind(answer.id)
                .execute(&mut *self.tx)
                .await?;
        }
        Ok(())
    }

    async fn delete_quiz_answer(&mut self, id: i64) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM quiz_answers WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn quiz_answers_for_quiz(&mut self, quiz_id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        self.fetch_quiz_answers("qa.quiz_id = $1", quiz_id).await
    }

    async fn quiz_answers_for_student(&mut self, student_id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        self.fetch_quiz_answers("qa.student_id = $1", student_id).await
    }

    async fn quiz_answers_for_execution(&mut self, course_execution_id: i64) -> Result<Vec<QuizAnswer>, AppError> {
        self.fetch_quiz_answers("q.course_execution_id = $1", course_execution_id)
            .await
    }

    async fn all_quiz_answers(&mut self) -> Result<Vec<QuizAnswer>, AppError> {
        let sql = format!("SELECT {} FROM quiz_answers qa ORDER BY qa.id", QUIZ_ANSWER_COLUMNS);
        let rows: Vec<QuizAnswerRow> = sqlx::query_as(&sql).fetch_all(&mut *self.tx).await?;
        self.assemble_quiz_answers(rows).await
    }

    async fn quiz_answers_pending_statistics(&mut self, now: DateTime<Utc>) -> Result<Vec<QuizAnswer>, AppError> {
        let sql = format!(
            r#"
            SELECT {} FROM quiz_answers qa
            JOIN quizzes q ON q.id = qa.quiz_id
            WHERE qa.answer_date IS NOT NULL
              AND NOT qa.used_in_statistics
              AND COALESCE(q.results_date, q.conclusion_date, $1) <= $1
            ORDER BY qa.id
            FOR UPDATE OF qa SKIP LOCKED
            "#,
            QUIZ_ANSWER_COLUMNS
        );
        let rows: Vec<QuizAnswerRow> = sqlx::query_as(&sql).bind(now).fetch_all(&mut *self.tx).await?;
        self.assemble_quiz_answers(rows).await
    }

    async fn stage_quiz_answer_item(&mut self, item: &NewQuizAnswerItem) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar(
            "INSERT INTO quiz_answer_items (quiz_id, quiz_answer_id, answer_date, answers) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(item.quiz_id)
        .bind(item.quiz_answer_id)
        .bind(item.answer_date)
        .bind(Json(&item.answers))
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn quiz_answer_items(&mut self, quiz_id: i64) -> Result<Vec<QuizAnswerItem>, AppError> {
        let rows: Vec<QuizAnswerItemRow> = sqlx::query_as(
            "SELECT id, quiz_id, quiz_answer_id, answer_date, answers FROM quiz_answer_items WHERE quiz_id = $1 ORDER BY id FOR UPDATE SKIP LOCKED",
        )
        .bind(quiz_id)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| QuizAnswerItem {
                id: r.id,
                quiz_id: r.quiz_id,
                quiz_answer_id: r.quiz_answer_id,
                answer_date: r.answer_date,
                answers: r.answers.0,
            })
            .collect())
    }

    async fn delete_quiz_answer_item(&mut self, id: i64) -> Result<(), AppError> {
        sqlx::query("DELETE FROM quiz_answer_items WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn quizzes_with_pending_items(&mut self) -> Result<BTreeSet<i64>, AppError> {
        let ids: Vec<i64> = sqlx::query_scalar("SELECT DISTINCT quiz_id FROM quiz_answer_items")
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn stage_question_answer_item(&mut self, item: &NewQuestionAnswerItem) -> Result<i64, AppError> {
        Ok(sqlx::query_scalar(
            r#"
            INSERT INTO question_answer_items (username, quiz_id, quiz_question_id, answer_date, time_taken, time_to_submission, answer_details)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&item.username)
        .bind(item.quiz_id)
        .bind(item.quiz_question_id)
        .bind(item.answer_date)
        .bind(item.time_taken)
        .bind(item.time_to_submission)
        .bind(item.answer_details.clone().map(Json))
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn question_answer_items_for_username(&mut self, username: &str) -> Result<Vec<QuestionAnswerItem>, AppError> {
        let rows: Vec<QuestionAnswerItemRow> = sqlx::query_as(
            r#"
            SELECT id, username, quiz_id, quiz_question_id, answer_date, time_taken, time_to_submission, answer_details
            FROM question_answer_items
            WHERE username = $1
            ORDER BY id
            "#,
        )
        .bind(username)
        .fetch_all(&mut *self.tx)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| QuestionAnswerItem {
                id: r.id,
                username: r.username,
                quiz_id: r.quiz_id,
                quiz_question_id: r.quiz_question_id,
                answer_date: r.answer_date,
                time_taken: r.time_taken,
                time_to_submission: r.time_to_submission,
                answer_details: r.answer_details.map(|d| d.0),
            })
            .collect())
    }

    async fn delete_question_answer_items_for_usernames(&mut self, usernames: &[String]) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM question_answer_items WHERE username = ANY($1)")
            .bind(usernames)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn dashboard(&mut self, id: i64) -> Result<Option<Dashboard>, AppError> {
        Ok(sqlx::query_as(
            "SELECT id, student_id, course_execution_id, last_check_failed_answers FROM dashboards WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?)
    }

    async fn save_dashboard(&mut self, dashboard: &Dashboard) -> Result<(), AppError> {
        sqlx::query("UPDATE dashboards SET last_check_failed_answers = $1 WHERE id = $2")
            .bind(dashboard.last_check_failed_answers)
            .bind(dashboard.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn failed_answers(&mut self, dashboard_id: i64) -> Result<Vec<FailedAnswer>, AppError> {
        Ok(sqlx::query_as(
            r#"
            SELECT id, dashboard_id, question_answer_id, quiz_answer_id, question_id, collected, removed
            FROM failed_answers
            WHERE dashboard_id = $1
            ORDER BY id
            "#,
        )
        .bind(dashboard_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_failed_answer(&mut self, failed_answer: &NewFailedAnswer) -> Result<FailedAnswer, AppError> {
        Ok(sqlx::query_as(
            r#"
            INSERT INTO failed_answers (dashboard_id, question_answer_id, quiz_answer_id, question_id, collected, removed)
            VALUES ($1, $2, $3, $4, $5, FALSE)
            RETURNING id, dashboard_id, question_answer_id, quiz_answer_id, question_id, collected, removed
            "#,
        )
        .bind(failed_answer.dashboard_id)
        .bind(failed_answer.question_answer_id)
        .bind(failed_answer.quiz_answer_id)
        .bind(failed_answer.question_id)
        .bind(failed_answer.collected)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn save_failed_answer(&mut self, failed_answer: &FailedAnswer) -> Result<(), AppError> {
        sqlx::query("UPDATE failed_answers SET removed = $1 WHERE id = $2")
            .bind(failed_answer.removed)
            .bind(failed_answer.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), AppError> {
        self.tx.commit().await?;
        Ok(())
    }
}
