//! Room error taxonomy.

use thiserror::Error;
use wick_crypto::{nonce::NonceError, CodecError};

/// Errors from sealing and opening room frames.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    /// The roster changed and the epoch has not rotated yet. Sealing is
    /// refused until [`crate::SenderKeyRoom::rotate`] installs a fresh
    /// secret.
    #[error("room secret rotation required before sending")]
    RotationRequired,

    /// The frame's epoch does not match the room's current epoch.
    #[error("stale room epoch: frame carries {received}, room is at {current}")]
    StaleEpoch {
        /// Epoch the room is currently in
        current: u32,
        /// Epoch the frame claims
        received: u32,
    },

    /// The frame's sender is not on the roster.
    #[error("sender {sender} is not a room member")]
    UnknownSender {
        /// Sender identifier from the frame header
        sender: u64,
    },

    /// A rotation announced an epoch that does not follow the current one.
    #[error("rotation epoch {received} does not advance current epoch {current}")]
    EpochRegression {
        /// Epoch the room is currently in
        current: u32,
        /// Epoch the rotation carries
        received: u32,
    },

    /// The frame's counter was already consumed for this sender.
    #[error("replayed counter {counter} from sender {sender}")]
    Replay {
        /// Sender identifier from the frame header
        sender: u64,
        /// Counter the frame carries
        counter: u32,
    },

    /// The frame is not a room data frame.
    #[error("frame is not room data")]
    UnexpectedFrame,

    /// AEAD failure; opaque by design.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Frame construction failed (oversized payload).
    #[error(transparent)]
    Protocol(#[from] wick_proto::ProtocolError),

    /// The local sending counter is exhausted; rotate before sending.
    #[error(transparent)]
    Nonce(#[from] NonceError),
}

impl RoomError {
    /// Whether the room is unusable until a rotation or rejoin.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::RotationRequired | Self::Nonce(_) => true,
            Self::Codec(err) => err.is_fatal(),
            Self::Protocol(_) => false,
            Self::StaleEpoch { .. }
            | Self::UnknownSender { .. }
            | Self::EpochRegression { .. }
            | Self::Replay { .. }
            | Self::UnexpectedFrame => false,
        }
    }
}
