//! Session-level error taxonomy.
//!
//! Aggregates the typed errors of the lower layers and adds the
//! conditions only the session owner can detect: lifecycle gates,
//! handshake timeouts, and prekey store state.

use std::time::Duration;

use thiserror::Error;
use wick_crypto::{
    handshake::HandshakeError, nonce::NonceError, ratchet::RatchetError, sas::SasError, CodecError,
};
use wick_proto::ProtocolError;

/// Errors surfaced by session establishment and frame processing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The prekey store has not been initialized yet; the caller should
    /// retry once publication completes.
    #[error("prekey store not ready")]
    NotReady,

    /// The initiator referenced a prekey this store no longer holds.
    #[error("unknown prekey id {prekey_id}")]
    UnknownPrekey {
        /// Identifier the initiator echoed
        prekey_id: u32,
    },

    /// Application traffic was attempted before the SAS comparison
    /// confirmed the session.
    #[error("session not verified; short authentication string pending")]
    NotVerified,

    /// The session reached a terminal state and processes no frames.
    #[error("session terminated")]
    Terminated,

    /// Policy demands a ratchet step before the next outgoing frame.
    #[error("rekey required at generation {generation}")]
    RekeyRequired {
        /// Current root-mix generation
        generation: u32,
    },

    /// A rekey announcement did not advance the current generation.
    #[error("rekey generation {received} does not follow current generation {current}")]
    StaleRekey {
        /// Local root-mix generation
        current: u32,
        /// Generation the announcement carries
        received: u32,
    },

    /// This side holds no material for the requested rekey operation.
    #[error("no rekey material available on this side of the session")]
    RekeyUnavailable,

    /// A frame arrived that the current state cannot accept.
    #[error("unexpected frame: opcode {opcode:#06x}")]
    UnexpectedFrame {
        /// Opcode of the offending frame
        opcode: u16,
    },

    /// The handshake did not complete within the deadline.
    #[error("handshake timeout after {elapsed:?}")]
    HandshakeTimeout {
        /// How long the driver waited
        elapsed: Duration,
    },

    /// Underlying transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Prekey persistence record failure.
    #[error("prekey storage error: {0}")]
    Storage(String),

    /// Handshake failure; terminal for the attempt.
    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    /// Ratchet advancement failure; the frame is dropped.
    #[error(transparent)]
    Ratchet(#[from] RatchetError),

    /// AEAD failure; opaque by design.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Nonce counter exhaustion; a rekey must install fresh chains.
    #[error(transparent)]
    Nonce(#[from] NonceError),

    /// SAS arbitration failure.
    #[error(transparent)]
    Sas(#[from] SasError),

    /// Wire format failure.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl SessionError {
    /// Whether the session must terminate.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Terminated | Self::Handshake(_) => true,
            Self::Sas(err) => err.is_fatal(),
            Self::Codec(err) => err.is_fatal(),
            Self::Ratchet(err) => err.is_fatal(),
            Self::NotReady
            | Self::UnknownPrekey { .. }
            | Self::NotVerified
            | Self::RekeyRequired { .. }
            | Self::StaleRekey { .. }
            | Self::RekeyUnavailable
            | Self::UnexpectedFrame { .. }
            | Self::HandshakeTimeout { .. }
            | Self::Transport(_)
            | Self::Storage(_)
            | Self::Nonce(_)
            | Self::Protocol(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use wick_crypto::sas::SasError;

    use super::*;

    #[test]
    fn sas_mismatch_is_fatal() {
        assert!(SessionError::Sas(SasError::Mismatch).is_fatal());
        assert!(!SessionError::Sas(SasError::AlreadyResolved).is_fatal());
    }

    #[test]
    fn timeouts_are_transient() {
        let err = SessionError::HandshakeTimeout { elapsed: Duration::from_secs(30) };
        assert!(!err.is_fatal());
    }

    #[test]
    fn handshake_failures_are_terminal() {
        assert!(SessionError::Handshake(HandshakeError::BadSignature).is_fatal());
    }

    #[test]
    fn dropped_frames_are_not_terminal() {
        let err = SessionError::Ratchet(RatchetError::Desync { generation: 0, counter: 3 });
        assert!(!err.is_fatal());
        assert!(!SessionError::Codec(CodecError::AuthenticationFailure).is_fatal());
    }
}
