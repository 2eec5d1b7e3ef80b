// src/services/maintenance.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::{
    task::{self, JoinHandle},
    time::{self, MissedTickBehavior},
};

use crate::services::answer::AnswerService;

/// Runs the maintenance sweep every `every`, starting one period from now.
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_sweeper(answers: Arc<AnswerService>, every: Duration) -> JoinHandle<()> {
    task::spawn(async move {
        let mut interval = time::interval(every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval.tick().await;

        loop {
            interval.tick().await;
            if let Err(e) = answers.write_quiz_answers_and_calculate_statistics().await {
                tracing::error!("Maintenance sweep failed: {}", e);
            }
        }
    })
}
