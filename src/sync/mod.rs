mod hub;
mod types;
pub mod websocket;

pub use hub::{ConnectionHub, RegistrationResult};
pub use types::SyncMessage;
pub use websocket::handle_websocket;
