use tokio::sync::mpsc;

use super::types::SearchEvent;

/// Delivers result events to the connection that started the search.
///
/// Implementations must preserve submission order per connection and must
/// not block; different connections may be delivered in any order.
pub trait ResultSink: Send + Sync {
    fn deliver(&self, event: SearchEvent);
}

/// Sink backed by an unbounded channel, used by the CLI and tests
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ResultSink for ChannelSink {
    fn deliver(&self, event: SearchEvent) {
        // Receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}
