//! Error types for the wire codec.

use thiserror::Error;

/// Errors that can occur while encoding or decoding envelopes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON serialization failed
    #[error("serialization failed: {0}")]
    Serialization(#[source] serde_json::Error),

    /// JSON deserialization failed (malformed frame or unknown discriminator)
    #[error("deserialization failed: {0}")]
    Deserialization(#[source] serde_json::Error),
}
