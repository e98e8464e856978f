use axum::{extract::State, Json};
use std::sync::Arc;

use crate::search::ModuleInfo;
use crate::state::AppState;
use crate::tasks::TaskSummary;

/// Registered search modules and their aliases
pub async fn list_modules(State(state): State<Arc<AppState>>) -> Json<Vec<ModuleInfo>> {
    Json(state.modules.describe())
}

/// Searches currently running, across all connections
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Vec<TaskSummary>> {
    let mut tasks = state.orchestrator.active_tasks();
    tasks.sort_by_key(|task| task.started_at);
    Json(tasks)
}
