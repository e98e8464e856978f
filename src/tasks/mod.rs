// Task registry for cancellable per-channel searches
//
// Provides:
// - Channel keys (connection + topic) and task handles
// - At-most-one-live-task registration with per-key locking
// - Cooperative cancellation via CancellationToken

mod registry;
mod types;

pub use registry::ChannelRegistry;
pub use types::{
    wait_for_cancel, ChannelKey, ConnectionId, RegistryError, RegistryResult, TaskHandle, TaskId,
    TaskSummary,
};

// Re-export CancellationToken for convenience
pub use tokio_util::sync::CancellationToken;
