//! Protocol-level error taxonomy.

use thiserror::Error;

/// Convenience alias for protocol results.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from framing and payload codecs.
///
/// All structural: none of these imply anything about authenticity, and
/// none are grounds for terminating a session by themselves. A malformed
/// frame is dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Buffer too short to contain a header.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum byte count required
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Header claims more payload than the buffer carries.
    #[error("frame truncated: header claims {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size from the header
        expected: usize,
        /// Payload bytes actually available
        actual: usize,
    },

    /// Magic number mismatch.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Unknown protocol version.
    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the size limit.
    #[error("payload too large: {size} bytes exceeds maximum {max}")]
    PayloadTooLarge {
        /// Claimed or actual payload size
        size: usize,
        /// Enforced maximum
        max: usize,
    },

    /// Opcode not in the closed set.
    #[error("unknown opcode {0:#06x}")]
    UnknownOpcode(u16),

    /// Opcode does not match the payload being encoded or decoded.
    #[error("opcode {0:?} does not carry a CBOR payload of this type")]
    OpcodeMismatch(crate::Opcode),

    /// A payload field failed validation.
    #[error("invalid payload field: {field}")]
    InvalidField {
        /// Which field was rejected
        field: &'static str,
    },

    /// A signature on a control payload did not verify.
    #[error("control payload signature verification failed")]
    BadSignature,

    /// CBOR serialization failed.
    #[error("payload encoding failed: {0}")]
    Encode(String),

    /// CBOR deserialization failed.
    #[error("payload decoding failed: {0}")]
    Decode(String),
}
