use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::SyncMessage;
use crate::search::{ResultSink, SearchEvent};
use crate::tasks::ConnectionId;

/// Default maximum connections to prevent DoS
const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Registration result
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationResult {
    /// Successfully registered
    Ok,
    /// Server at capacity, registration rejected
    AtCapacity,
}

/// Outbound queues of the live WebSocket connections.
///
/// Each connection has one writer task draining its queue into the socket,
/// so messages reach a client in the order they were queued.
#[derive(Clone)]
pub struct ConnectionHub {
    connections: Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<SyncMessage>>>>,
    max_connections: usize,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_CONNECTIONS)
    }

    /// Create hub with custom max connections
    pub fn with_capacity(max_connections: usize) -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
            max_connections,
        }
    }

    /// Register the outbound queue of a connection
    pub fn register(
        &self,
        connection: ConnectionId,
        tx: mpsc::UnboundedSender<SyncMessage>,
    ) -> RegistrationResult {
        let mut connections = self.connections.write();
        if connections.len() >= self.max_connections {
            return RegistrationResult::AtCapacity;
        }

        connections.insert(connection, tx);
        RegistrationResult::Ok
    }

    /// Drop a connection's queue; its writer task ends once the queue drains
    pub fn unregister(&self, connection: &ConnectionId) -> bool {
        self.connections.write().remove(connection).is_some()
    }

    /// Queue a message for a connection. False if the connection is gone.
    pub fn send(&self, connection: &ConnectionId, message: SyncMessage) -> bool {
        let connections = self.connections.read();
        match connections.get(connection) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Get the count of connected clients
    pub fn connection_count(&self) -> usize {
        self.connections.read().len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultSink for ConnectionHub {
    fn deliver(&self, event: SearchEvent) {
        let connection = event.key.connection;
        let message = SyncMessage::SearchEvent {
            topic: event.key.topic,
            task_id: event.task_id,
            event: event.event,
        };
        if !self.send(&connection, message) {
            debug!("Dropping search event for closed connection {}", connection);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::ResultEvent;
    use crate::tasks::ChannelKey;
    use uuid::Uuid;

    #[test]
    fn test_register_and_send() {
        let hub = ConnectionHub::new();
        let connection = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(hub.register(connection, tx), RegistrationResult::Ok);
        assert_eq!(hub.connection_count(), 1);

        assert!(hub.send(&connection, SyncMessage::Pong));
        assert_eq!(rx.try_recv().unwrap(), SyncMessage::Pong);

        assert!(!hub.send(&Uuid::new_v4(), SyncMessage::Pong));
    }

    #[test]
    fn test_capacity_limit() {
        let hub = ConnectionHub::with_capacity(2);
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(hub.register(Uuid::new_v4(), tx.clone()), RegistrationResult::Ok);
        assert_eq!(hub.register(Uuid::new_v4(), tx.clone()), RegistrationResult::Ok);
        assert_eq!(hub.register(Uuid::new_v4(), tx.clone()), RegistrationResult::AtCapacity);
        assert_eq!(hub.connection_count(), 2);
    }

    #[test]
    fn test_unregister_frees_capacity() {
        let hub = ConnectionHub::with_capacity(1);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx, _rx) = mpsc::unbounded_channel();

        assert_eq!(hub.register(first, tx.clone()), RegistrationResult::Ok);
        assert_eq!(hub.register(second, tx.clone()), RegistrationResult::AtCapacity);
        assert!(hub.unregister(&first));
        assert_eq!(hub.register(second, tx), RegistrationResult::Ok);
    }

    #[test]
    fn test_deliver_routes_by_connection_in_order() {
        let hub = ConnectionHub::new();
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register(first, tx1);
        hub.register(second, tx2);

        let task_id = Uuid::new_v4();
        let key = ChannelKey::new(first, "domain");
        hub.deliver(SearchEvent::new(key.clone(), task_id, ResultEvent::Started { total_units: None }));
        hub.deliver(SearchEvent::new(key, task_id, ResultEvent::cancelled("domain")));

        match rx1.try_recv().unwrap() {
            SyncMessage::SearchEvent { topic, event, .. } => {
                assert_eq!(topic, "domain");
                assert_eq!(event.kind(), "started");
            }
            other => panic!("unexpected {:?}", other),
        }
        match rx1.try_recv().unwrap() {
            SyncMessage::SearchEvent { event, .. } => assert_eq!(event.kind(), "cancelled"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(rx2.try_recv().is_err());
    }

    #[test]
    fn test_deliver_after_unregister_is_dropped() {
        let hub = ConnectionHub::new();
        let connection = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register(connection, tx);

        assert!(hub.unregister(&connection));
        assert!(!hub.unregister(&connection));

        hub.deliver(SearchEvent::new(
            ChannelKey::new(connection, "username"),
            Uuid::new_v4(),
            ResultEvent::cancelled("cross-site-enumeration"),
        ));
        assert!(rx.try_recv().is_err());
    }
}
