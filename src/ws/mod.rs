//! Realtime market updates over WebSocket.
//!
//! # Architecture
//!
//! - [`Client`]: public handle holding the subscription set and event handlers
//! - [`connection`]: supervisor task owning the socket, heartbeat and reconnect procedure
//! - [`events`]: event types and handler dispatch
//!
//! Events reach callers two ways: per-kind handlers registered with [`Client::on`], and the
//! [`Client::events`] stream.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;

pub use client::Client;
pub use config::Config;
pub use connection::ConnectionState;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use events::{Event, EventKind, HandlerId, StreamError};
