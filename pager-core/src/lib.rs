//! # pager-core
//!
//! Pure logic for the Beep Pager session (no I/O, instant tests).
//!
//! ## Design Philosophy
//!
//! Nothing in this crate touches the network. The [`StateMachine`] engine
//! runs caller-supplied actions against a caller-owned context, and the
//! [`SyncDriver`] talks to its coordinator through the [`SyncCoordinator`]
//! trait. The I/O (connection, session actor) lives in `pager-client`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod state;
pub mod sync;

pub use state::{Emitter, InvariantViolation, StateId, StateMachine, StateMachineEvent};
pub use sync::{SyncCoordinator, SyncDriver, SyncError};
