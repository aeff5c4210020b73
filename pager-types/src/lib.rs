//! # pager-types
//!
//! Wire format types for the Beep Pager session protocol.
//!
//! Every frame on the wire is one JSON envelope:
//! - [`Command`] - client → server, discriminated by the `cmd` field
//! - [`ServerEvent`] - server → client, discriminated by the `event` field
//! - [`Pts`] - the server-assigned sync position cursor
//! - [`ProtocolError`] - encode/decode failures

#![warn(missing_docs)]
#![warn(clippy::all)]

mod error;
mod messages;
mod pts;

pub use error::ProtocolError;
pub use messages::{
    Command, LoginCommand, SendMessageCommand, ServerEvent, SyncCommand, SyncUpdates, Update,
};
pub use pts::Pts;
