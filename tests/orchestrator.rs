mod common;

use common::*;
use osint_broker::search::{ChannelSink, ErrorKind, Orchestrator, OrchestratorConfig, ResultEvent, SearchModule};
use osint_broker::tasks::ChannelKey;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

fn orchestrator() -> (Arc<Orchestrator>, UnboundedReceiver<osint_broker::search::SearchEvent>) {
    let (sink, rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(Arc::new(sink), OrchestratorConfig::default());
    (Arc::new(orchestrator), rx)
}

fn key(topic: &str) -> ChannelKey {
    ChannelKey::new(Uuid::new_v4(), topic)
}

#[tokio::test]
async fn test_search_runs_to_completion() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("echo");

    let task_id = orchestrator.dispatch(key.clone(), Arc::new(Echo), "alice").await;
    let events = collect_task(&mut rx, task_id).await;

    assert_well_formed(&events);
    assert_eq!(events.len(), 3);
    assert_eq!(events[1].kind(), "partial");
    match &events[2] {
        ResultEvent::Completed { module, payload } => {
            assert_eq!(module, "echo");
            assert_eq!(payload["echo"], "alice");
        }
        other => panic!("expected completed, got {:?}", other),
    }
    assert!(!orchestrator.is_active(&key));
    assert_eq!(orchestrator.active_count(), 0);
}

#[tokio::test]
async fn test_invalid_input_never_registers() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("echo");

    let task_id = orchestrator.dispatch(key.clone(), Arc::new(Echo), "").await;
    let event = next_event(&mut rx).await;

    assert_eq!(event.task_id, task_id);
    assert_eq!(
        event.event,
        ResultEvent::failed("echo", ErrorKind::InvalidInput, "No input provided")
    );
    assert_eq!(orchestrator.registry().slot_count(), 0);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "invalid input must yield a single event");
}

#[tokio::test]
async fn test_new_search_supersedes_running_one() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("username");

    let first = orchestrator.dispatch(key.clone(), Arc::new(Ticking::new(50, 20)), "alice").await;
    wait_for_kind(&mut rx, first, "progress").await;

    let second = orchestrator.dispatch(key.clone(), Arc::new(Echo), "bob").await;
    let events = collect_terminals(&mut rx, 2).await;

    let first_cancelled = events
        .iter()
        .position(|e| e.task_id == first && e.event.kind() == "cancelled")
        .expect("superseded search must be cancelled");
    let second_started = events
        .iter()
        .position(|e| e.task_id == second && e.event.kind() == "started")
        .expect("new search must start");
    assert!(first_cancelled < second_started);

    let grouped = by_task(&events);
    assert_eq!(grouped[&second].last().map(|e| e.kind()), Some("completed"));
    assert!(!orchestrator.is_active(&key));
}

#[tokio::test]
async fn test_explicit_cancel() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("username");

    let task_id = orchestrator.dispatch(key.clone(), Arc::new(Ticking::new(100, 20)), "alice").await;
    wait_for_kind(&mut rx, task_id, "started").await;

    let requested = Instant::now();
    assert!(orchestrator.cancel(&key));
    assert!(!orchestrator.is_active(&key), "entry must be gone right after cancel");

    let events = collect_task(&mut rx, task_id).await;
    assert!(requested.elapsed() < Duration::from_millis(500));
    assert_eq!(events.last(), Some(&ResultEvent::cancelled("ticking")));

    // Nothing left to cancel
    assert!(!orchestrator.cancel(&key));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_dispatches_keep_one_live_task() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("domain");
    let dispatches = 12;

    let peak = Arc::new(AtomicUsize::new(0));
    let monitor = {
        let orchestrator = orchestrator.clone();
        let peak = peak.clone();
        tokio::spawn(async move {
            loop {
                peak.fetch_max(orchestrator.active_count(), Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    let mut handles = Vec::new();
    for _ in 0..dispatches {
        let orchestrator = orchestrator.clone();
        let key = key.clone();
        handles.push(tokio::spawn(async move {
            let module: Arc<dyn SearchModule> = Arc::new(Ticking::new(5, 10));
            orchestrator.dispatch(key, module, "example.com").await
        }));
    }
    let mut task_ids = Vec::new();
    for handle in handles {
        task_ids.push(handle.await.unwrap());
    }

    let events = collect_terminals(&mut rx, dispatches).await;
    monitor.abort();

    assert!(peak.load(Ordering::SeqCst) <= 1);
    let grouped = by_task(&events);
    assert_eq!(grouped.len(), dispatches);
    for task_id in &task_ids {
        assert_well_formed(&grouped[task_id]);
    }
    let completed = grouped
        .values()
        .filter(|events| events.last().map(|e| e.kind()) == Some("completed"))
        .count();
    assert!(completed >= 1, "the last dispatch must run to completion");
    assert_eq!(orchestrator.active_count(), 0);
}

#[tokio::test]
async fn test_module_error_becomes_failed() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("github");

    let task_id = orchestrator.dispatch(key.clone(), Arc::new(Failing), "alice").await;
    let events = collect_task(&mut rx, task_id).await;

    assert_well_formed(&events);
    match events.last() {
        Some(ResultEvent::Failed {
            error_kind, detail, ..
        }) => {
            assert_eq!(*error_kind, ErrorKind::ModuleError);
            assert!(detail.contains("upstream returned garbage"));
        }
        other => panic!("expected failed, got {:?}", other),
    }
    assert!(!orchestrator.is_active(&key));
}

#[tokio::test]
async fn test_panic_is_contained() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("reddit");

    let task_id = orchestrator.dispatch(key.clone(), Arc::new(Panicking), "alice").await;
    let events = collect_task(&mut rx, task_id).await;

    assert_well_formed(&events);
    assert_eq!(
        events.last(),
        Some(&ResultEvent::failed("panicking", ErrorKind::ModuleError, "module exploded"))
    );
    assert!(!orchestrator.is_active(&key));

    // The lane is usable again
    let next = orchestrator.dispatch(key, Arc::new(Echo), "bob").await;
    let events = collect_task(&mut rx, next).await;
    assert_eq!(events.last().map(|e| e.kind()), Some("completed"));
}

#[tokio::test]
async fn test_uncooperative_module_does_not_wedge_lane() {
    let (orchestrator, mut rx) = orchestrator();
    let key = key("whois");

    let stubborn = orchestrator
        .dispatch(
            key.clone(),
            Arc::new(Stubborn {
                duration: Duration::from_millis(600),
            }),
            "example.com",
        )
        .await;
    wait_for_kind(&mut rx, stubborn, "started").await;

    let started = Instant::now();
    let next = orchestrator.dispatch(key.clone(), Arc::new(Echo), "example.org").await;
    assert!(
        started.elapsed() < Duration::from_millis(450),
        "dispatch must only wait for the acknowledgment window"
    );

    let events = collect_terminals(&mut rx, 2).await;
    let grouped = by_task(&events);
    assert_eq!(grouped[&next].last().map(|e| e.kind()), Some("completed"));

    // The stubborn task still ends with exactly one terminal, reported as cancelled
    let stubborn_events = &grouped[&stubborn];
    assert_eq!(stubborn_events.last(), Some(&ResultEvent::cancelled("stubborn")));
    assert_eq!(stubborn_events.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_channels_are_independent() {
    let (orchestrator, mut rx) = orchestrator();
    let connection = Uuid::new_v4();
    let username = ChannelKey::new(connection, "username");
    let domain = ChannelKey::new(connection, "domain");
    let other_connection = ChannelKey::new(Uuid::new_v4(), "username");

    let a = orchestrator.dispatch(username.clone(), Arc::new(Ticking::new(100, 20)), "alice").await;
    let b = orchestrator.dispatch(domain.clone(), Arc::new(Ticking::new(5, 10)), "example.com").await;
    let c = orchestrator
        .dispatch(other_connection.clone(), Arc::new(Ticking::new(5, 10)), "alice")
        .await;
    assert_eq!(orchestrator.active_count(), 3);

    assert!(orchestrator.cancel(&username));
    assert!(orchestrator.is_active(&domain) || orchestrator.is_active(&other_connection));

    let events = collect_terminals(&mut rx, 3).await;
    let grouped = by_task(&events);
    assert_eq!(grouped[&a].last().map(|e| e.kind()), Some("cancelled"));
    assert_eq!(grouped[&b].last().map(|e| e.kind()), Some("completed"));
    assert_eq!(grouped[&c].last().map(|e| e.kind()), Some("completed"));
}

#[tokio::test]
async fn test_disconnect_is_idempotent() {
    let (orchestrator, mut rx) = orchestrator();
    let connection = Uuid::new_v4();

    let first = orchestrator
        .dispatch(ChannelKey::new(connection, "username"), Arc::new(Ticking::new(100, 20)), "alice")
        .await;
    let second = orchestrator
        .dispatch(ChannelKey::new(connection, "domain"), Arc::new(Ticking::new(100, 20)), "example.com")
        .await;
    let survivor_key = key("username");
    let survivor = orchestrator
        .dispatch(survivor_key.clone(), Arc::new(Ticking::new(100, 20)), "carol")
        .await;

    assert_eq!(orchestrator.disconnect(connection), 2);
    assert_eq!(orchestrator.disconnect(connection), 0);
    assert_eq!(orchestrator.disconnect(Uuid::new_v4()), 0);
    assert!(orchestrator.is_active(&survivor_key));

    let events = collect_terminals(&mut rx, 2).await;
    let grouped = by_task(&events);
    for task_id in [first, second] {
        assert_well_formed(&grouped[&task_id]);
        assert_eq!(grouped[&task_id].last().map(|e| e.kind()), Some("cancelled"));
    }
    assert!(!grouped.get(&survivor).is_some_and(|e| e.iter().any(|e| e.is_terminal())));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(orchestrator.disconnect(connection), 0);
    orchestrator.cancel(&survivor_key);
}

#[tokio::test]
async fn test_shutdown_cancels_everything() {
    let (orchestrator, mut rx) = orchestrator();
    let mut task_ids = Vec::new();
    for topic in ["username", "domain", "github"] {
        task_ids.push(
            orchestrator
                .dispatch(key(topic), Arc::new(Ticking::new(100, 20)), "alice")
                .await,
        );
    }

    assert_eq!(orchestrator.active_tasks().len(), 3);
    assert_eq!(orchestrator.shutdown(), 3);

    let events = collect_terminals(&mut rx, 3).await;
    let grouped = by_task(&events);
    for task_id in task_ids {
        assert_eq!(grouped[&task_id].last().map(|e| e.kind()), Some("cancelled"));
    }

    tokio::time::sleep(Duration::from_millis(20)).await;
    tokio_test::assert_ok!(tokio::time::timeout(Duration::from_millis(10), async {
        assert_eq!(orchestrator.active_count(), 0);
    })
    .await);
}
