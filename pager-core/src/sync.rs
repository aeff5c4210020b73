//! Incremental sync driver.
//!
//! The driver owns the device's sync position and decides when to ask for
//! more updates. It never sends anything itself: requests go through a
//! [`SyncCoordinator`], which is expected to hold only a non-owning handle
//! back to the session so the session can be torn down independently.
//!
//! The loop is retry-until-caught-up: every `sync_updates` result that is not
//! `synced` triggers another request, with no backoff and no iteration cap.
//! At most one request is outstanding at a time; a sync asked for while one
//! is in flight is dropped.

use beep_pager_types::{Pts, SyncUpdates};
use thiserror::Error;

/// Sync errors.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SyncError {
    /// The session that should carry the request has been dropped.
    #[error("sync coordinator has already been dropped")]
    CoordinatorGone,
}

/// Sends sync requests on behalf of a [`SyncDriver`].
pub trait SyncCoordinator {
    /// Request updates after `from`.
    ///
    /// Implementations decide whether the request can actually be sent
    /// (e.g. only while signed in).
    fn request_sync(&self, from: Pts) -> Result<(), SyncError>;
}

/// Runs the sync request/response loop.
#[derive(Debug)]
pub struct SyncDriver<C: SyncCoordinator> {
    coordinator: C,
    local_pts: Pts,
    in_flight: bool,
}

impl<C: SyncCoordinator> SyncDriver<C> {
    /// Create a driver starting at position zero.
    pub fn new(coordinator: C) -> Self {
        Self::with_pts(coordinator, Pts::zero())
    }

    /// Create a driver resuming from a known position.
    pub fn with_pts(coordinator: C, local_pts: Pts) -> Self {
        Self {
            coordinator,
            local_pts,
            in_flight: false,
        }
    }

    /// The position sent with the next sync request.
    pub fn local_pts(&self) -> Pts {
        self.local_pts
    }

    /// Whether a request is waiting for its `sync_updates` result.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Ask the coordinator for updates after the local position.
    ///
    /// No-op while a request is already in flight.
    pub fn perform_sync(&mut self) -> Result<(), SyncError> {
        if self.in_flight {
            tracing::debug!(local_pts = %self.local_pts, "sync already in flight");
            return Ok(());
        }
        tracing::info!(local_pts = %self.local_pts, "start syncing");
        self.request()
    }

    /// Forget the outstanding request, e.g. because the session went away
    /// and its result will never arrive.
    pub fn reset(&mut self) {
        self.in_flight = false;
    }

    /// Handle a `sync_updates` result.
    ///
    /// Not yet synced means another request goes out immediately.
    // TODO: advance `local_pts` from `result.updates` once update payloads
    // carry a stable position; until then every retry repeats the same pts.
    pub fn handle_sync_result(&mut self, result: &SyncUpdates) -> Result<(), SyncError> {
        tracing::debug!(
            updates = result.updates.len(),
            too_long = result.too_long,
            synced = result.synced,
            "received sync result"
        );

        if result.synced {
            self.in_flight = false;
            return Ok(());
        }
        self.request()
    }

    fn request(&mut self) -> Result<(), SyncError> {
        let sent = self.coordinator.request_sync(self.local_pts);
        self.in_flight = sent.is_ok();
        sent
    }
}
