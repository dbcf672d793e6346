//! Triple Ratchet key schedule.
//!
//! Three independent dimensions of key renewal:
//!
//! 1. Symmetric chain ratchet: a hash chain advances after every
//!    message, so each message key is gone the moment it is used.
//! 2. Classical DH ratchet: fresh X25519 entropy mixes into the root on
//!    a per-message-count policy, bounding what one compromised chain
//!    key reveals.
//! 3. Sparse PQ ratchet: an ML-KEM-768 encapsulation mixes into the
//!    root at epoch boundaries. KEM operations cost far more than a DH
//!    step, so the epoch schedule is sparse; the trade bounds the
//!    window in which a purely classical compromise helps a
//!    quantum-capable adversary.
//!
//! Out-of-order delivery is handled by deriving and caching message keys
//! up to a bounded lookahead; anything beyond the window is a protocol
//! violation and the message is dropped.

mod chain;
mod triple;

pub use chain::{ChainRatchet, MessageKey, SkippedKeyCache, MAX_SKIP};
pub use triple::{RatchetError, RatchetPolicy, RatchetState, Role};
