//! Directional nonce governance.
//!
//! A nonce is 96 bits: one direction flag bit, a 32-bit counter, and zero
//! padding. Both directions of a bidirectional session start their
//! counters at zero; the flag bit guarantees they can never collide.
//!
//! [`NonceState::reserve`] is the only path that reads and increments a
//! counter. Exclusive `&mut` access enforces the single-writer discipline
//! from the concurrency model: exactly one task owns a direction's
//! counter, so no lock-free sharing is needed.

use thiserror::Error;

use crate::suite::NONCE_LEN;

/// Counter value at which a mandatory rekey is forced.
///
/// Reserving stops one margin short of `2^32` so a ratchet step always
/// happens before the counter could wrap. Wrapping is never permitted.
pub const REKEY_THRESHOLD: u32 = u32::MAX - 1024;

/// Errors from nonce reservation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum NonceError {
    /// The counter reached the rekey threshold; a ratchet step must
    /// install fresh keys before this direction may send again.
    #[error("nonce counter exhausted on {direction:?} at {counter}; rekey required")]
    Exhausted {
        /// Direction whose counter ran out
        direction: Direction,
        /// Counter value at exhaustion
        counter: u32,
    },
}

/// Frame direction within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Originated by the session initiator.
    Sender,
    /// Originated by the session responder.
    Receiver,
}

impl Direction {
    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Self::Sender => Self::Receiver,
            Self::Receiver => Self::Sender,
        }
    }

    /// High bit of nonce byte zero.
    fn flag(self) -> u8 {
        match self {
            Self::Sender => 0x00,
            Self::Receiver => 0x80,
        }
    }
}

/// A fully formed 96-bit nonce.
///
/// Layout: byte 0 carries the direction flag in its high bit, bytes 8-11
/// carry the counter big-endian, everything else is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nonce {
    bytes: [u8; NONCE_LEN],
    direction: Direction,
    counter: u32,
}

impl Nonce {
    /// Construct the nonce for a `(direction, counter)` pair.
    pub fn new(direction: Direction, counter: u32) -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        bytes[0] = direction.flag();
        bytes[8..12].copy_from_slice(&counter.to_be_bytes());
        Self { bytes, direction, counter }
    }

    /// Raw nonce bytes for the AEAD.
    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.bytes
    }

    /// Direction this nonce belongs to.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Counter component.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

/// Strictly monotonic per-direction nonce counter.
///
/// # Invariants
///
/// - A `(direction, counter)` pair is never issued twice for one chain
///   key epoch; the ratchet installs fresh keys before counters reset.
/// - The counter never wraps: reservation fails at [`REKEY_THRESHOLD`].
#[derive(Debug)]
pub struct NonceState {
    direction: Direction,
    next: u32,
}

impl NonceState {
    /// Create a counter for one direction, starting at zero.
    pub fn new(direction: Direction) -> Self {
        Self { direction, next: 0 }
    }

    /// Reserve the next nonce: read the counter, then increment it.
    ///
    /// This is the only mutation path. Callers requiring concurrency run
    /// one owner per direction; `&mut self` makes a second concurrent
    /// writer unrepresentable.
    pub fn reserve(&mut self) -> Result<Nonce, NonceError> {
        if self.next >= REKEY_THRESHOLD {
            return Err(NonceError::Exhausted { direction: self.direction, counter: self.next });
        }
        let nonce = Nonce::new(self.direction, self.next);
        self.next += 1;
        Ok(nonce)
    }

    /// Next counter value that `reserve` would issue.
    pub fn next_counter(&self) -> u32 {
        self.next
    }

    /// Direction this state governs.
    pub fn direction(&self) -> Direction {
        self.direction
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn counters_strictly_increase() {
        let mut state = NonceState::new(Direction::Sender);
        let mut last = None;
        for _ in 0..100 {
            let nonce = state.reserve().unwrap();
            if let Some(prev) = last {
                assert!(nonce.counter() > prev);
            }
            last = Some(nonce.counter());
        }
    }

    #[test]
    fn directions_never_collide() {
        let mut send = NonceState::new(Direction::Sender);
        let mut recv = NonceState::new(Direction::Receiver);
        let mut seen = HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(*send.reserve().unwrap().as_bytes()));
            assert!(seen.insert(*recv.reserve().unwrap().as_bytes()));
        }
    }

    #[test]
    fn nonce_layout() {
        let nonce = Nonce::new(Direction::Receiver, 0x0102_0304);
        let bytes = nonce.as_bytes();
        assert_eq!(bytes[0], 0x80);
        assert_eq!(&bytes[1..8], &[0u8; 7]);
        assert_eq!(&bytes[8..12], &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn sender_flag_is_clear() {
        let nonce = Nonce::new(Direction::Sender, 0);
        assert_eq!(nonce.as_bytes()[0], 0x00);
    }

    #[test]
    fn exhaustion_is_an_error_not_a_wrap() {
        let mut state = NonceState { direction: Direction::Sender, next: REKEY_THRESHOLD - 1 };
        assert!(state.reserve().is_ok());
        let err = state.reserve();
        assert!(matches!(err, Err(NonceError::Exhausted { counter, .. }) if counter == REKEY_THRESHOLD));
        // Still exhausted on retry; the counter did not move.
        assert!(state.reserve().is_err());
        assert_eq!(state.next_counter(), REKEY_THRESHOLD);
    }
}
