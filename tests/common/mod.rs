#![allow(dead_code)]

use async_trait::async_trait;
use osint_broker::search::{Emitter, ModuleError, ModuleResult, ResultEvent, SearchEvent, SearchModule};
use osint_broker::tasks::{CancellationToken, TaskId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// Upper bound for any single wait in these tests
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Emits one partial and completes with the query; rejects blank queries
pub struct Echo;

#[async_trait]
impl SearchModule for Echo {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn validate(&self, query: &str) -> Result<(), String> {
        if query.trim().is_empty() {
            Err("No input provided".to_string())
        } else {
            Ok(())
        }
    }

    async fn run(&self, query: &str, _token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        emit.partial(json!({ "seen": query }));
        Ok(json!({ "echo": query }))
    }
}

/// Emits a progress event per tick and honours cancellation between ticks
pub struct Ticking {
    pub ticks: u64,
    pub interval: Duration,
}

impl Ticking {
    pub fn new(ticks: u64, interval_ms: u64) -> Self {
        Self {
            ticks,
            interval: Duration::from_millis(interval_ms),
        }
    }
}

#[async_trait]
impl SearchModule for Ticking {
    fn name(&self) -> &'static str {
        "ticking"
    }

    fn validate(&self, _query: &str) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _query: &str, token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        emit.started(Some(self.ticks));
        for tick in 1..=self.ticks {
            tokio::select! {
                _ = token.cancelled() => return Err(ModuleError::Cancelled),
                _ = tokio::time::sleep(self.interval) => {}
            }
            emit.progress(format!("tick {}", tick), Some(tick), Some(self.ticks));
        }
        Ok(json!({ "ticks": self.ticks }))
    }
}

/// Ignores its token and sleeps for the whole duration
pub struct Stubborn {
    pub duration: Duration,
}

#[async_trait]
impl SearchModule for Stubborn {
    fn name(&self) -> &'static str {
        "stubborn"
    }

    fn validate(&self, _query: &str) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _query: &str, _token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        emit.started(None);
        tokio::time::sleep(self.duration).await;
        emit.partial(json!({ "late": true }));
        Ok(json!({ "done": true }))
    }
}

/// Always fails with an upstream error
pub struct Failing;

#[async_trait]
impl SearchModule for Failing {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn validate(&self, _query: &str) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _query: &str, _token: CancellationToken, _emit: &Emitter) -> ModuleResult<Value> {
        Err(ModuleError::Upstream("upstream returned garbage".to_string()))
    }
}

/// Panics mid-run
pub struct Panicking;

#[async_trait]
impl SearchModule for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn validate(&self, _query: &str) -> Result<(), String> {
        Ok(())
    }

    async fn run(&self, _query: &str, _token: CancellationToken, emit: &Emitter) -> ModuleResult<Value> {
        emit.started(None);
        panic!("module exploded");
    }
}

pub async fn next_event(rx: &mut UnboundedReceiver<SearchEvent>) -> SearchEvent {
    tokio::time::timeout(EVENT_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("sink closed")
}

/// Receive events until `terminals` terminal events have been seen
pub async fn collect_terminals(rx: &mut UnboundedReceiver<SearchEvent>, terminals: usize) -> Vec<SearchEvent> {
    let mut events = Vec::new();
    let mut seen = 0;
    while seen < terminals {
        let event = next_event(rx).await;
        if event.event.is_terminal() {
            seen += 1;
        }
        events.push(event);
    }
    events
}

/// Receive events until the terminal event of `task_id`
pub async fn collect_task(rx: &mut UnboundedReceiver<SearchEvent>, task_id: TaskId) -> Vec<ResultEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        if event.task_id != task_id {
            continue;
        }
        let terminal = event.event.is_terminal();
        events.push(event.event);
        if terminal {
            return events;
        }
    }
}

/// Wait until an event of `kind` arrives for `task_id`
pub async fn wait_for_kind(rx: &mut UnboundedReceiver<SearchEvent>, task_id: TaskId, kind: &str) {
    loop {
        let event = next_event(rx).await;
        if event.task_id == task_id && event.event.kind() == kind {
            return;
        }
    }
}

/// Group events by task, preserving order within each task
pub fn by_task(events: &[SearchEvent]) -> HashMap<TaskId, Vec<ResultEvent>> {
    let mut grouped: HashMap<TaskId, Vec<ResultEvent>> = HashMap::new();
    for event in events {
        grouped.entry(event.task_id).or_default().push(event.event.clone());
    }
    grouped
}

/// Every task stream starts with `Started` and ends with its only terminal
pub fn assert_well_formed(events: &[ResultEvent]) {
    assert!(!events.is_empty(), "empty event stream");
    assert_eq!(events[0].kind(), "started", "stream must open with started: {:?}", events);
    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected exactly one terminal event: {:?}", events);
    assert!(events.last().is_some_and(|e| e.is_terminal()), "terminal must be last: {:?}", events);
}
