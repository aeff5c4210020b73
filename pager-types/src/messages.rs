//! Protocol envelopes for the pager session.
//!
//! Commands flow client → server and carry a `cmd` discriminator; events flow
//! server → client and carry an `event` discriminator. In both directions the
//! variant's own fields are flattened into the same JSON object.

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, Pts};

/// All commands a client can send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Authenticate the device
    Login(LoginCommand),
    /// Ask for updates after a position
    Sync(SyncCommand),
    /// Deliver a message to another user
    SendMessage(SendMessageCommand),
}

impl Command {
    /// Serialize to a JSON frame.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Serialization)
    }

    /// The `cmd` discriminator of this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Login(_) => "login",
            Command::Sync(_) => "sync",
            Command::SendMessage(_) => "send_message",
        }
    }
}

/// Authentication handshake, sent once per connection.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginCommand {
    /// Identifies the user account
    pub user_token: String,
    /// Identifies this device (empty until device tokens are generated)
    pub device_token: String,
    /// Account secret
    pub secret_key: String,
}

impl std::fmt::Debug for LoginCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginCommand")
            .field("user_token", &self.user_token)
            .field("device_token", &self.device_token)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Incremental sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCommand {
    /// Last position this device has applied
    pub device_pts: Pts,
}

/// Message addressed to another user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageCommand {
    /// Recipient user token
    pub receiver: String,
    /// Message body
    pub contents: String,
}

/// All events a server can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Login accepted
    LoggedIn,
    /// Result of a sync request
    SyncUpdates(SyncUpdates),
}

impl ServerEvent {
    /// Deserialize from a JSON frame.
    ///
    /// Unknown `event` values, missing fields and malformed JSON are all
    /// reported as [`ProtocolError::Deserialization`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Deserialization)
    }
}

/// A batch of queued updates.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SyncUpdates {
    /// More updates exist server-side than were returned
    pub too_long: bool,
    /// The device is caught up
    pub synced: bool,
    /// Updates in server order
    pub updates: Vec<Update>,
}

/// A single queued update.
///
/// The payload schema is owned by the server and kept opaque here so that
/// new update kinds never break decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Update(serde_json::Value);

impl Update {
    /// Wrap a raw JSON value.
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }
}
