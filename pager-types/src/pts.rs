//! Sync position cursor.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Server-assigned position of the last update a device has applied.
///
/// Monotonically increasing. On the wire it is a bare `u64`
/// (`{"cmd":"sync","device_pts":42}`).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Pts(u64);

impl Pts {
    /// Create a new Pts with the given value.
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the numeric value of this Pts.
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The position of a device that has applied nothing yet.
    pub fn zero() -> Self {
        Self(0)
    }
}

impl fmt::Display for Pts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for Pts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pts({})", self.0)
    }
}
