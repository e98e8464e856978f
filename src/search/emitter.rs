use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::sink::ResultSink;
use super::types::{ResultEvent, SearchEvent};
use crate::tasks::{ChannelKey, TaskId};

/// Handle a running module uses to stream non-terminal events.
///
/// Cheap to clone for fan-out sub-lookups. Guarantees `Started` goes out
/// before anything else, and drops everything once the task's terminal event
/// has been sent.
#[derive(Clone)]
pub struct Emitter {
    inner: Arc<EmitterInner>,
}

struct EmitterInner {
    sink: Arc<dyn ResultSink>,
    key: ChannelKey,
    task_id: TaskId,
    module: String,
    state: Mutex<EmitterState>,
}

#[derive(Default)]
struct EmitterState {
    started: bool,
    closed: bool,
}

impl Emitter {
    pub fn new(
        sink: Arc<dyn ResultSink>,
        key: ChannelKey,
        task_id: TaskId,
        module: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(EmitterInner {
                sink,
                key,
                task_id,
                module: module.into(),
                state: Mutex::new(EmitterState::default()),
            }),
        }
    }

    /// Announce the start of work, optionally with the number of units.
    /// Ignored if anything was already emitted.
    pub fn started(&self, total_units: Option<u64>) -> bool {
        self.push(ResultEvent::Started { total_units })
    }

    pub fn progress(
        &self,
        message: impl Into<String>,
        units_done: Option<u64>,
        units_total: Option<u64>,
    ) -> bool {
        self.push(ResultEvent::Progress {
            message: message.into(),
            units_done,
            units_total,
        })
    }

    pub fn partial(&self, payload: Value) -> bool {
        self.push(ResultEvent::Partial {
            module: self.inner.module.clone(),
            payload,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    fn push(&self, event: ResultEvent) -> bool {
        if event.is_terminal() {
            return false;
        }

        let mut state = self.inner.state.lock();
        if state.closed {
            debug!(
                "Dropping {} event from finished task {}",
                event.kind(),
                self.inner.task_id
            );
            return false;
        }

        match event {
            ResultEvent::Started { .. } if state.started => return false,
            ResultEvent::Started { .. } => {}
            _ if !state.started => self.send(ResultEvent::Started { total_units: None }),
            _ => {}
        }
        state.started = true;
        self.send(event);
        true
    }

    /// Send the terminal event and close the stream. Only the orchestrator
    /// calls this, exactly once per task.
    pub(crate) fn finish(&self, terminal: ResultEvent) {
        let mut state = self.inner.state.lock();
        if state.closed {
            return;
        }
        if !state.started {
            self.send(ResultEvent::Started { total_units: None });
            state.started = true;
        }
        self.send(terminal);
        state.closed = true;
    }

    // Called with the state lock held so concurrent clones keep their order
    fn send(&self, event: ResultEvent) {
        self.inner.sink.deliver(SearchEvent::new(
            self.inner.key.clone(),
            self.inner.task_id,
            event,
        ));
    }
}
