// Search orchestrator - one live task per channel, superseded on re-dispatch
//
// Flow per dispatch:
// - validate the query (invalid input never touches the registry)
// - cancel whatever runs on the lane and wait briefly for it to exit
// - register a fresh handle, retrying if a concurrent dispatch won the slot
// - run the module on its own tokio task and emit exactly one terminal event
// - unregister unconditionally when the task exits

use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::emitter::Emitter;
use super::error::ModuleResult;
use super::module::SearchModule;
use super::sink::ResultSink;
use super::types::{ErrorKind, ResultEvent, SearchEvent};
use crate::tasks::{
    ChannelKey, ChannelRegistry, ConnectionId, RegistryError, TaskHandle, TaskId, TaskSummary,
};

/// Default window a superseded task gets to acknowledge cancellation
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long a new dispatch waits for the task it supersedes to exit
    pub ack_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            ack_timeout: DEFAULT_ACK_TIMEOUT,
        }
    }
}

pub struct Orchestrator {
    registry: Arc<ChannelRegistry>,
    sink: Arc<dyn ResultSink>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(sink: Arc<dyn ResultSink>, config: OrchestratorConfig) -> Self {
        Self {
            registry: Arc::new(ChannelRegistry::new()),
            sink,
            config,
        }
    }

    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Start `module` on `key`, superseding any task already running there.
    ///
    /// Returns once the new task is registered and spawned; results arrive
    /// through the sink tagged with the returned task id.
    pub async fn dispatch(
        &self,
        key: ChannelKey,
        module: Arc<dyn SearchModule>,
        query: impl Into<String>,
    ) -> TaskId {
        let query = query.into();
        let task_id = Uuid::new_v4();
        let module_name = module.name();

        if let Err(reason) = module.validate(&query) {
            warn!("Invalid input for {} on {}: {}", module_name, key, reason);
            self.sink.deliver(SearchEvent::new(
                key,
                task_id,
                ResultEvent::failed(module_name, ErrorKind::InvalidInput, reason),
            ));
            return task_id;
        }

        let handle = TaskHandle::new(task_id, key.clone(), module_name);
        let mut attempts = 0u32;
        let handle = loop {
            attempts += 1;
            if let Some(prior) = self.registry.cancel_and_clear(&key) {
                if prior.wait_finished(self.config.ack_timeout).await {
                    debug!("Task {} acknowledged cancellation", prior.id);
                } else {
                    warn!(
                        "Task {} on {} did not stop within {:?}, proceeding",
                        prior.id, key, self.config.ack_timeout
                    );
                }
            }

            match self.registry.try_register(handle.clone()) {
                Ok(registered) => break registered,
                Err(RegistryError::Conflict { existing, .. }) => {
                    debug!(
                        "Dispatch {} lost the race for {} to {} (attempt {}), retrying",
                        task_id, key, existing, attempts
                    );
                }
            }
        };

        info!("📋 Task {} started: {} on {}", task_id, module_name, key);
        self.spawn_task(handle, module, query);
        task_id
    }

    fn spawn_task(&self, handle: TaskHandle, module: Arc<dyn SearchModule>, query: String) {
        let registry = self.registry.clone();
        let sink = self.sink.clone();

        tokio::spawn(async move {
            // Drop order: registration first, then the finished signal
            let _finished = handle.finish_guard();
            let registration = Registration {
                registry,
                handle: handle.clone(),
            };

            let emitter = Emitter::new(sink, handle.key.clone(), handle.id, module.name());
            let token = handle.token();

            let outcome = AssertUnwindSafe(module.run(&query, token.clone(), &emitter))
                .catch_unwind()
                .await;

            let terminal = terminal_event(module.name(), token.is_cancelled(), outcome);
            match &terminal {
                ResultEvent::Completed { .. } => info!("📋 Task {} completed", handle.id),
                ResultEvent::Cancelled { .. } => info!("🚫 Task {} cancelled", handle.id),
                ResultEvent::Failed { detail, .. } => error!("Task {} failed: {}", handle.id, detail),
                _ => {}
            }

            drop(registration);
            emitter.finish(terminal);
        });
    }

    /// Cancel the task on `key`, if any. Its terminal `Cancelled` event is
    /// emitted by the task itself.
    pub fn cancel(&self, key: &ChannelKey) -> bool {
        self.registry.cancel_and_clear(key).is_some()
    }

    /// Connection went away: cancel all of its lanes. Safe to repeat.
    pub fn disconnect(&self, connection: ConnectionId) -> usize {
        let cancelled = self.registry.cancel_connection(connection);
        let pruned = self.registry.prune_connection(connection);
        if !cancelled.is_empty() {
            info!(
                "🛑 Cancelled {} tasks for closed connection {}",
                cancelled.len(),
                connection
            );
        }
        debug!("Pruned {} idle lanes of {}", pruned, connection);
        cancelled.len()
    }

    /// Signal every running task; used on process shutdown
    pub fn shutdown(&self) -> usize {
        self.registry.cancel_all()
    }

    pub fn is_active(&self, key: &ChannelKey) -> bool {
        self.registry.is_active(key)
    }

    pub fn active_count(&self) -> usize {
        self.registry.len()
    }

    pub fn active_tasks(&self) -> Vec<TaskSummary> {
        self.registry.snapshot()
    }
}

/// Removes the task's registry entry when dropped, so the slot is freed even
/// if the task body is aborted.
struct Registration {
    registry: Arc<ChannelRegistry>,
    handle: TaskHandle,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.handle);
    }
}

fn terminal_event(
    module: &str,
    cancelled: bool,
    outcome: Result<ModuleResult<Value>, Box<dyn Any + Send>>,
) -> ResultEvent {
    if cancelled {
        return ResultEvent::cancelled(module);
    }

    match outcome {
        Ok(Ok(payload)) => ResultEvent::Completed {
            module: module.to_string(),
            payload,
        },
        Ok(Err(e)) if e.is_cancelled() => ResultEvent::cancelled(module),
        Ok(Err(e)) => ResultEvent::failed(module, ErrorKind::ModuleError, e.to_string()),
        Err(panic) => {
            let detail = panic_message(panic.as_ref());
            error!("Module {} panicked: {}", module, detail);
            ResultEvent::failed(module, ErrorKind::ModuleError, detail)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "module panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::error::ModuleError;
    use serde_json::json;

    #[test]
    fn test_cancellation_overrides_outcome() {
        let event = terminal_event("whois", true, Ok(Ok(json!({"registrar": "x"}))));
        assert_eq!(event, ResultEvent::cancelled("whois"));
    }

    #[test]
    fn test_module_error_maps_to_failed() {
        let event = terminal_event(
            "whois",
            false,
            Ok(Err(ModuleError::Subprocess("exit status 1".into()))),
        );
        match event {
            ResultEvent::Failed {
                error_kind, detail, ..
            } => {
                assert_eq!(error_kind, ErrorKind::ModuleError);
                assert!(detail.contains("exit status 1"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_self_reported_cancel() {
        let event = terminal_event("whois", false, Ok(Err(ModuleError::Cancelled)));
        assert_eq!(event.kind(), "cancelled");
    }

    #[test]
    fn test_panic_payloads() {
        let boxed: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(boxed.as_ref()), "static message");

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(boxed.as_ref()), "owned message");

        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "module panicked");
    }
}
