//! One-shot completion shared by every caller waiting for a signed-in session.

use tokio::sync::oneshot;

use crate::SessionError;

/// Outcome delivered to a waiting caller.
pub type ReadyResult = Result<(), SessionError>;

/// Bridges "the session became ready" back to pending `sign_in` calls.
///
/// Any number of callers can [`attach`](Self::attach); all of them receive
/// the same outcome. The first completion wins: later `resolve`/`reject`
/// calls are ignored, and callers attaching after completion get the stored
/// outcome immediately.
#[derive(Debug, Default)]
pub struct ReadyHandle {
    outcome: Option<ReadyResult>,
    waiters: Vec<oneshot::Sender<ReadyResult>>,
}

impl ReadyHandle {
    /// Create a pending handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller.
    pub fn attach(&mut self, waiter: oneshot::Sender<ReadyResult>) {
        match &self.outcome {
            Some(outcome) => {
                let _ = waiter.send(outcome.clone());
            }
            None => self.waiters.push(waiter),
        }
    }

    /// Complete with success.
    pub fn resolve(&mut self) {
        self.complete(Ok(()));
    }

    /// Complete with `error`.
    pub fn reject(&mut self, error: SessionError) {
        self.complete(Err(error));
    }

    /// Whether the handle has not completed yet.
    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    /// Number of callers still waiting.
    pub fn waiter_count(&self) -> usize {
        self.waiters.len()
    }

    fn complete(&mut self, outcome: ReadyResult) {
        if let Some(previous) = &self.outcome {
            tracing::debug!(?previous, ?outcome, "ready handle already completed");
            return;
        }

        for waiter in self.waiters.drain(..) {
            // A caller that gave up (timeout, dropped future) is fine to skip.
            let _ = waiter.send(outcome.clone());
        }
        self.outcome = Some(outcome);
    }
}
