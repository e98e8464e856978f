use anyhow::{anyhow, bail, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::search::{ChannelSink, ModuleRegistry, Orchestrator, ResultEvent, SearchEvent};
use crate::tasks::ChannelKey;

/// Dispatch one search through an in-process orchestrator and stream its
/// events to stdout. Ctrl-C cancels the search; the command still waits for
/// the terminal event.
pub async fn run_search(
    config: &ServerConfig,
    modules: &ModuleRegistry,
    module_name: &str,
    query: &str,
    topic: Option<String>,
) -> Result<()> {
    let module = modules
        .get(module_name)
        .ok_or_else(|| anyhow!("Unknown module: {} (see `osint-broker modules`)", module_name))?;

    let (sink, mut rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(Arc::new(sink), config.orchestrator_config());
    let key = ChannelKey::new(Uuid::new_v4(), topic.unwrap_or_else(|| module_name.to_string()));

    let task_id = orchestrator.dispatch(key.clone(), module, query).await;
    info!("📋 Search {} running on {}", task_id, key);

    follow_search(&orchestrator, &key, &mut rx, tokio::signal::ctrl_c(), |event| {
        println!("{}", serde_json::to_string(event)?);
        Ok(())
    })
    .await
}

/// Forward events to `on_event` until the terminal one. `interrupt` firing
/// cancels the search once; the terminal event is still awaited.
async fn follow_search<I, E>(
    orchestrator: &Orchestrator,
    key: &ChannelKey,
    rx: &mut UnboundedReceiver<SearchEvent>,
    interrupt: I,
    mut on_event: E,
) -> Result<()>
where
    I: Future<Output = std::io::Result<()>>,
    E: FnMut(&ResultEvent) -> Result<()>,
{
    tokio::pin!(interrupt);
    let mut interrupted = false;
    loop {
        tokio::select! {
            event = rx.recv() => {
                let Some(event) = event else {
                    bail!("search ended without a terminal event");
                };
                on_event(&event.event)?;

                match event.event {
                    ResultEvent::Failed { detail, error_kind, .. } => {
                        bail!("search failed ({}): {}", error_kind, detail);
                    }
                    ResultEvent::Completed { .. } | ResultEvent::Cancelled { .. } => return Ok(()),
                    _ => {}
                }
            }
            signal = &mut interrupt, if !interrupted => {
                interrupted = true;
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    continue;
                }
                info!("🛑 Interrupted, cancelling search on {}", key);
                orchestrator.cancel(key);
            }
        }
    }
}
