use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::hub::{ConnectionHub, RegistrationResult};
use super::types::SyncMessage;
use crate::search::{Orchestrator, SearchModule};
use crate::state::AppState;
use crate::tasks::{ChannelKey, ConnectionId};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Handle WebSocket upgrade
pub async fn handle_websocket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, receiver) = socket.split();
    let connection_id = Uuid::new_v4();
    let (tx, rx) = mpsc::unbounded_channel();

    if state.hub.register(connection_id, tx) == RegistrationResult::AtCapacity {
        warn!("Rejecting connection {}: server at capacity", connection_id);
        let full = SyncMessage::error("Server at capacity", "SERVER_FULL");
        if let Ok(json) = serde_json::to_string(&full) {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    info!("New WebSocket connection established: {}", connection_id);

    state.hub.send(
        &connection_id,
        SyncMessage::Connected {
            connection_id,
            server_version: VERSION.to_string(),
            modules: state.modules.names(),
        },
    );

    let mut writer = tokio::spawn(write_loop(sender, rx));
    let mut lanes = LaneDispatcher::new(connection_id, &state);

    tokio::select! {
        _ = read_loop(receiver, connection_id, &state, &mut lanes) => {}
        _ = &mut writer => {
            warn!("Outbound stream of {} closed", connection_id);
        }
    }

    // Disconnected: stop pending dispatches before cancelling every lane,
    // so none can register after the sweep
    lanes.shutdown().await;
    let cancelled = state.orchestrator.disconnect(connection_id);
    state.hub.unregister(&connection_id);
    writer.abort();

    info!(
        "WebSocket connection terminated: {} ({} searches cancelled)",
        connection_id, cancelled
    );
}

/// Drain the outbound queue into the socket, in order
async fn write_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<SyncMessage>,
) {
    while let Some(message) = rx.recv().await {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize message: {}", e);
                continue;
            }
        };
        if let Err(e) = sender.send(Message::Text(json.into())).await {
            error!("Failed to send message: {}", e);
            break;
        }
    }
}

async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    connection_id: ConnectionId,
    state: &AppState,
    lanes: &mut LaneDispatcher,
) {
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
        };

        match msg {
            Message::Text(text) => {
                // Parse incoming message
                let sync_msg: SyncMessage = match serde_json::from_str(&text) {
                    Ok(msg) => msg,
                    Err(e) => {
                        error!("Failed to parse message: {}", e);
                        state.hub.send(
                            &connection_id,
                            SyncMessage::error(format!("Invalid message format: {}", e), "PARSE_ERROR"),
                        );
                        continue;
                    }
                };

                if let Some(resp) = handle_sync_message(sync_msg, connection_id, state, lanes) {
                    state.hub.send(&connection_id, resp);
                }
            }
            Message::Close(_) => {
                info!("WebSocket connection closed by client");
                break;
            }
            // Pings are answered by the websocket layer itself
            _ => {}
        }
    }
}

/// Handle a sync message and return optional response
fn handle_sync_message(
    msg: SyncMessage,
    connection_id: ConnectionId,
    state: &AppState,
    lanes: &mut LaneDispatcher,
) -> Option<SyncMessage> {
    match msg {
        SyncMessage::StartSearch {
            topic,
            module,
            query,
        } => {
            let module_name = module.unwrap_or_else(|| topic.clone());
            let Some(module) = state.modules.get(&module_name) else {
                warn!("Unknown module requested: {}", module_name);
                return Some(SyncMessage::error(
                    format!("Unknown module: {}", module_name),
                    "UNKNOWN_MODULE",
                ));
            };

            debug!("Queueing {} on topic {}", module_name, topic);
            lanes.submit(topic, module, query);
            None
        }

        SyncMessage::CancelSearch { topic } => {
            // Behind any start still queued on the topic
            if lanes.has_lane(&topic) {
                lanes.cancel(topic);
                return None;
            }
            let key = ChannelKey::new(connection_id, topic.clone());
            let active = state.orchestrator.cancel(&key);
            info!("🛑 Cancel requested for {} (active: {})", key, active);
            Some(SyncMessage::CancelAck { topic, active })
        }

        SyncMessage::Ping => Some(SyncMessage::Pong),

        // These are responses, not requests
        SyncMessage::Connected { .. }
        | SyncMessage::SearchEvent { .. }
        | SyncMessage::CancelAck { .. }
        | SyncMessage::Pong
        | SyncMessage::Error { .. } => {
            warn!("Received response message as request, ignoring");
            None
        }
    }
}

enum LaneCommand {
    Start {
        module: Arc<dyn SearchModule>,
        query: String,
    },
    Cancel,
}

/// One dispatch worker per topic of a connection. A dispatch that waits for
/// its predecessor to stop holds up only its own topic; commands on the same
/// topic run in the order they were received.
struct LaneDispatcher {
    connection_id: ConnectionId,
    orchestrator: Arc<Orchestrator>,
    hub: ConnectionHub,
    lanes: HashMap<String, mpsc::UnboundedSender<LaneCommand>>,
    workers: JoinSet<()>,
}

impl LaneDispatcher {
    fn new(connection_id: ConnectionId, state: &AppState) -> Self {
        Self {
            connection_id,
            orchestrator: state.orchestrator.clone(),
            hub: state.hub.clone(),
            lanes: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    fn has_lane(&self, topic: &str) -> bool {
        self.lanes.contains_key(topic)
    }

    fn submit(&mut self, topic: String, module: Arc<dyn SearchModule>, query: String) {
        self.push(topic, LaneCommand::Start { module, query });
    }

    fn cancel(&mut self, topic: String) {
        self.push(topic, LaneCommand::Cancel);
    }

    fn push(&mut self, topic: String, mut command: LaneCommand) {
        if let Some(lane) = self.lanes.get(&topic) {
            match lane.send(command) {
                Ok(()) => return,
                // Worker gone; start a fresh one below
                Err(mpsc::error::SendError(returned)) => command = returned,
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(command);
        let lane = Lane {
            key: ChannelKey::new(self.connection_id, topic.clone()),
            orchestrator: self.orchestrator.clone(),
            hub: self.hub.clone(),
        };
        self.workers.spawn(lane.run(rx));
        self.lanes.insert(topic, tx);
    }

    /// Abort queued and in-flight commands and wait for the workers to exit
    async fn shutdown(&mut self) {
        self.lanes.clear();
        self.workers.shutdown().await;
    }
}

struct Lane {
    key: ChannelKey,
    orchestrator: Arc<Orchestrator>,
    hub: ConnectionHub,
}

impl Lane {
    async fn run(self, mut rx: mpsc::UnboundedReceiver<LaneCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                LaneCommand::Start { module, query } => {
                    let module_name = module.name();
                    let task_id = self.orchestrator.dispatch(self.key.clone(), module, query).await;
                    debug!("Dispatched {} as task {} on {}", module_name, task_id, self.key);
                }
                LaneCommand::Cancel => {
                    let active = self.orchestrator.cancel(&self.key);
                    info!("🛑 Cancel requested for {} (active: {})", self.key, active);
                    self.hub.send(
                        &self.key.connection,
                        SyncMessage::CancelAck {
                            topic: self.key.topic.clone(),
                            active,
                        },
                    );
                }
            }
        }
    }
}
