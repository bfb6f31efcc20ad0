use crate::config::ServerConfig;
use pulsemon_storage::MetricsStorage;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn MetricsStorage>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(storage: Arc<dyn MetricsStorage>, config: ServerConfig) -> Self {
        Self {
            storage,
            config: Arc::new(config),
        }
    }

    /// Shared secret for `HashSHA256`, if one is configured.
    pub fn key(&self) -> Option<&str> {
        self.config.key.as_deref().filter(|k| !k.is_empty())
    }
}
