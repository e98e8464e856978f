use std::sync::Arc;
use std::time::Instant;

use crate::config::ServerConfig;
use crate::search::{ModuleRegistry, Orchestrator, ResultSink};
use crate::sync::ConnectionHub;

/// Main server state shared across all handlers
pub struct AppState {
    pub config: ServerConfig,
    pub hub: ConnectionHub,
    pub orchestrator: Arc<Orchestrator>,
    pub modules: Arc<ModuleRegistry>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(config: ServerConfig, modules: ModuleRegistry) -> Self {
        let hub = ConnectionHub::with_capacity(config.max_connections);
        let sink: Arc<dyn ResultSink> = Arc::new(hub.clone());
        let orchestrator = Arc::new(Orchestrator::new(sink, config.orchestrator_config()));

        Self {
            config,
            hub,
            orchestrator,
            modules: Arc::new(modules),
            start_time: Instant::now(),
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
