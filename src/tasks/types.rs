// Task types for the per-channel task registry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

/// Identity of one client connection
pub type ConnectionId = Uuid;

/// Identity of one dispatch; every event a task emits carries it
pub type TaskId = Uuid;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Channel {key} already has a live task: {existing}")]
    Conflict { key: ChannelKey, existing: TaskId },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// One logical lane: a connection plus a topic name.
///
/// Two topics on the same connection are independent lanes; the same topic
/// on the same connection holds at most one live task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelKey {
    pub connection: ConnectionId,
    pub topic: String,
}

impl ChannelKey {
    pub fn new(connection: ConnectionId, topic: impl Into<String>) -> Self {
        Self {
            connection,
            topic: topic.into(),
        }
    }
}

impl std::fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.connection, self.topic)
    }
}

/// Registry entry for a running search.
///
/// The registry keeps a clone only to request cancellation; the task owns
/// the token it observes and the guard that reports its exit.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: TaskId,
    pub key: ChannelKey,
    pub module: String,
    pub started_at: DateTime<Utc>,
    cancel_token: CancellationToken,
    finished: CancellationToken,
}

impl TaskHandle {
    pub fn new(id: TaskId, key: ChannelKey, module: impl Into<String>) -> Self {
        Self {
            id,
            key,
            module: module.into(),
            started_at: Utc::now(),
            cancel_token: CancellationToken::new(),
            finished: CancellationToken::new(),
        }
    }

    /// Token handed to the module run
    pub fn token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Guard held by the task body; dropping it marks the task finished,
    /// whichever way the task exits.
    pub fn finish_guard(&self) -> DropGuard {
        self.finished.clone().drop_guard()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_cancelled()
    }

    /// Wait up to `timeout` for the task to exit. Returns whether it did.
    pub async fn wait_finished(&self, timeout: Duration) -> bool {
        wait_for_cancel(&self.finished, timeout).await
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.id,
            connection_id: self.key.connection,
            topic: self.key.topic.clone(),
            module: self.module.clone(),
            started_at: self.started_at,
        }
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TaskHandle {}

/// Serializable view of a live task
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub connection_id: ConnectionId,
    pub topic: String,
    pub module: String,
    pub started_at: DateTime<Utc>,
}

/// Wait until `token` is cancelled or `timeout` elapses.
/// Returns `true` if the token was cancelled in time.
pub async fn wait_for_cancel(token: &CancellationToken, timeout: Duration) -> bool {
    if token.is_cancelled() {
        return true;
    }
    tokio::time::timeout(timeout, token.cancelled()).await.is_ok()
}
