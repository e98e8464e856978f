use serde::{Deserialize, Serialize};

use crate::search::ResultEvent;
use crate::tasks::{ConnectionId, TaskId};

/// Messages exchanged between a client and the broker over `/ws`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncMessage {
    // === Requests ===
    /// Start a search on `topic`, superseding whatever runs there.
    /// `module` defaults to the topic name.
    StartSearch {
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        module: Option<String>,
        query: String,
    },

    /// Cancel the search running on `topic`
    CancelSearch {
        topic: String,
    },

    /// Keepalive
    Ping,

    // === Responses ===
    /// Sent once after the upgrade
    Connected {
        connection_id: ConnectionId,
        server_version: String,
        modules: Vec<String>,
    },

    /// One event of a search's result stream
    SearchEvent {
        topic: String,
        task_id: TaskId,
        event: ResultEvent,
    },

    /// Reply to `cancel_search`; `active` says whether a task was running
    CancelAck {
        topic: String,
        active: bool,
    },

    Pong,

    /// Error response
    Error {
        message: String,
        code: String,
    },
}

impl SyncMessage {
    pub fn error(message: impl Into<String>, code: &str) -> Self {
        SyncMessage::Error {
            message: message.into(),
            code: code.to_string(),
        }
    }
}
