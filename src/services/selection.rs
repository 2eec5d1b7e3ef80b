// src/services/selection.rs

use crate::models::{question::Question, student::StudentModel};

/// Picks `count` questions out of a candidate pool for one student.
///
/// Callers guarantee `pool.len() >= count`. Implementations must return exactly
/// `count` questions taken from the pool, in the order they should appear.
pub trait QuestionSelector: Send + Sync {
    fn select(&self, model: &StudentModel, count: usize, pool: Vec<Question>) -> Vec<Question>;
}

impl<F> QuestionSelector for F
where
    F: Fn(&StudentModel, usize, Vec<Question>) -> Vec<Question> + Send + Sync,
{
    fn select(&self, model: &StudentModel, count: usize, pool: Vec<Question>) -> Vec<Question> {
        self(model, count, pool)
    }
}

/// Prefers questions the student has not seen, then ones they got wrong, then the rest.
/// Within a group, fewer attempts come first; ties go to the lower question id.
#[derive(Debug, Default, Clone, Copy)]
pub struct StudentModelSelector;

impl QuestionSelector for StudentModelSelector {
    fn select(&self, model: &StudentModel, count: usize, mut pool: Vec<Question>) -> Vec<Question> {
        pool.sort_by_key(|question| {
            let (group, attempts) = match model.get(question.id) {
                None => (0, 0),
                Some(record) if record.ever_failed() => (1, record.answered),
                Some(record) => (2, record.answered),
            };
            (group, attempts, question.id)
        });
        pool.truncate(count);
        pool
    }
}
