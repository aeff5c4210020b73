//! # pager-client
//!
//! Session layer of the Beep Pager client.
//!
//! ## Features
//!
//! - **Login handshake**: one connection attempt shared by every concurrent `sign_in`
//! - **Sync loop**: keeps asking for updates until the server reports `synced`
//! - **Transport Abstraction**: Pluggable transport layer (WebSocket, mock)
//! - **Pure State Machine**: Uses pager-core for the session state machine
//!
//! ## Example
//!
//! ```ignore
//! use beep_pager_client::{SessionConfig, SessionManager, WebSocketTransport};
//!
//! let config = SessionConfig::default();
//! let session = SessionManager::spawn(config, WebSocketTransport::new());
//!
//! session.sign_in("user-token", "secret-key").await?;
//! session.send_message("bob", "hello").await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod connection;
mod error;
pub mod ready;
pub mod session;
pub mod transport;

pub use config::{ConfigError, SessionConfig};
pub use connection::{Connection, ConnectionEvent, ConnectionState};
pub use error::SessionError;
pub use ready::{ReadyHandle, ReadyResult};
pub use session::{AccountInfo, SessionEvent, SessionEventKind, SessionManager, SessionPhase};
pub use transport::{MockTransport, Transport, TransportError, WebSocketTransport};
