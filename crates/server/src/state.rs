use std::sync::Arc;

use imgqueue_core::{Config, ImageService};

/// Shared application state
pub struct AppState {
    config: Config,
    service: Arc<ImageService>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<ImageService>) -> Self {
        Self { config, service }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn service(&self) -> &ImageService {
        self.service.as_ref()
    }
}
