//! Transport abstraction for the pager session.
//!
//! This module provides a pluggable, frame-oriented duplex transport that
//! abstracts the underlying connection mechanism (WebSocket, mock for
//! testing).
//!
//! # Design
//!
//! The transport trait is async and connection-oriented:
//! - `connect()` establishes a connection
//! - `send()` transmits one frame
//! - `recv()` waits for the next frame
//! - `close()` terminates
//!
//! Methods take `&self` so that one task can sit in `recv()` while another
//! writes. Lifecycle policy (what a failure means, when to reconnect) is not
//! the transport's business; see [`crate::Connection`].

mod mock;
mod websocket;

pub use mock::MockTransport;
pub use websocket::WebSocketTransport;

use async_trait::async_trait;
use thiserror::Error;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Not connected.
    #[error("not connected")]
    NotConnected,

    /// Connection closed by the remote end.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Receive failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),
}

/// Transport trait for exchanging pager protocol frames.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to the endpoint at `address`.
    async fn connect(&self, address: &str) -> Result<(), TransportError>;

    /// Send one frame.
    async fn send(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Receive the next frame.
    ///
    /// Blocks until a frame is available or the connection ends.
    async fn recv(&self) -> Result<Vec<u8>, TransportError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), TransportError>;
}
