//! WebSocket Adapter - Observer Connections
//!
//! Bridges axum WebSockets to the `ClientTransport` port and feeds
//! client heartbeats and subscriptions into the connection registry.

pub mod handler;
pub mod protocol;
pub mod transport;

pub use handler::ws_handler;
pub use transport::WsTransport;
