// src/state.rs

use axum::extract::FromRef;

use crate::{config::Config, services::Services};

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub config: Config,
}

impl FromRef<AppState> for Services {
    fn from_ref(state: &AppState) -> Self {
        state.services.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
