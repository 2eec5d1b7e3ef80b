// src/services/mod.rs

use std::sync::Arc;

use crate::{
    config::Config,
    store::Store,
    utils::clock::Clock,
};

pub mod answer;
pub mod exchange;
pub mod failed_answer;
pub mod generator;
pub mod maintenance;
pub mod reconcile;
pub mod selection;
pub mod statistics;

#[cfg(test)]
pub(crate) mod testing;

use answer::AnswerService;
use failed_answer::FailedAnswerService;
use generator::QuizGenerator;
use selection::StudentModelSelector;
use statistics::LoggingStatistics;

/// The services the HTTP layer talks to, sharing one store and clock.
#[derive(Clone)]
pub struct Services {
    pub answers: Arc<AnswerService>,
    pub generator: Arc<QuizGenerator>,
    pub failed_answers: Arc<FailedAnswerService>,
}

impl Services {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, config: &Config) -> Self {
        let answers = AnswerService::new(store.clone(), clock.clone(), Arc::new(LoggingStatistics))
            .configured(config);
        let generator = QuizGenerator::new(store.clone(), clock.clone(), Arc::new(StudentModelSelector))
            .configured(config);
        let failed_answers = FailedAnswerService::new(store, clock).configured(config);

        Self {
            answers: Arc::new(answers),
            generator: Arc::new(generator),
            failed_answers: Arc::new(failed_answers),
        }
    }
}
