pub mod cli;
pub mod config;
pub mod handlers;
pub mod modules;
pub mod search;
pub mod server;
pub mod state;
pub mod sync;
pub mod tasks;

pub use config::ServerConfig;
pub use search::{Orchestrator, OrchestratorConfig, ResultEvent, SearchModule};
pub use state::AppState;
