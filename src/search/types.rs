use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tasks::{ChannelKey, TaskId};

/// Why a search failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Query rejected by the module's validator; never retried
    InvalidInput,
    /// The module itself failed (network, upstream, subprocess)
    ModuleError,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::InvalidInput => write!(f, "invalid_input"),
            ErrorKind::ModuleError => write!(f, "module_error"),
        }
    }
}

/// One event of a search's result stream.
///
/// `Started` comes first; `Completed`, `Failed` and `Cancelled` are terminal
/// and appear exactly once, last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEvent {
    Started {
        total_units: Option<u64>,
    },
    Progress {
        message: String,
        units_done: Option<u64>,
        units_total: Option<u64>,
    },
    Partial {
        module: String,
        payload: Value,
    },
    Completed {
        module: String,
        payload: Value,
    },
    Cancelled {
        module: String,
    },
    Failed {
        module: String,
        error_kind: ErrorKind,
        detail: String,
    },
}

impl ResultEvent {
    pub fn failed(module: impl Into<String>, error_kind: ErrorKind, detail: impl Into<String>) -> Self {
        ResultEvent::Failed {
            module: module.into(),
            error_kind,
            detail: detail.into(),
        }
    }

    pub fn cancelled(module: impl Into<String>) -> Self {
        ResultEvent::Cancelled {
            module: module.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ResultEvent::Completed { .. } | ResultEvent::Cancelled { .. } | ResultEvent::Failed { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ResultEvent::Started { .. } => "started",
            ResultEvent::Progress { .. } => "progress",
            ResultEvent::Partial { .. } => "partial",
            ResultEvent::Completed { .. } => "completed",
            ResultEvent::Cancelled { .. } => "cancelled",
            ResultEvent::Failed { .. } => "failed",
        }
    }
}

/// A result event addressed to the lane and dispatch that produced it
#[derive(Debug, Clone)]
pub struct SearchEvent {
    pub key: ChannelKey,
    pub task_id: TaskId,
    pub event: ResultEvent,
}

impl SearchEvent {
    pub fn new(key: ChannelKey, task_id: TaskId, event: ResultEvent) -> Self {
        Self { key, task_id, event }
    }
}
