use crate::config::Config;
use crate::generator::BatchOrchestrator;
use crate::storage::StorageLayout;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub generator: BatchOrchestrator,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let layout = StorageLayout::from_config(&config);
        let generator = BatchOrchestrator::new(layout, config.font_path.clone());
        Self {
            config: Arc::new(config),
            generator,
        }
    }
}
