//! Error types for the protocol layer.
//!
//! Every variant except [`ProtocolError::Encode`] describes a malformed
//! inbound message. Those are reported back to the sender and never tear
//! the connection down.

/// Errors that can occur while encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a message into JSON text).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame is not a JSON object.
    #[error("Malformed message: {0}")]
    Decode(serde_json::Error),

    /// The envelope lacks a required top-level field (`op` or `d`).
    #[error("Missing {0}")]
    MissingField(&'static str),

    /// The `op` value is not a known opcode.
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(i64),

    /// The `d` object does not have the shape required by its opcode.
    #[error("Malformed data for opcode {op}: {source}")]
    MalformedPayload {
        op: i64,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    /// Returns `true` for errors caused by what the peer sent.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, Self::Encode(_))
    }
}
