//! Sender-key rooms.
//!
//! Pairwise ratchets cost O(n²) in an N-party room. Instead each member
//! derives one symmetric sender key from a shared room secret and seals
//! every message once, fanning the same ciphertext out to all members:
//! O(n) encryption work per message.
//!
//! ```text
//! senderKey = HKDF(roomSecret, info = "PQC-HKDF-AES-256-SENDER" || senderId)
//! ```
//!
//! The room secret is versioned by an epoch. Any roster mutation forces
//! an epoch rotation before the next message is sealed, so a removed
//! member holding the old secret cannot derive any key used after its
//! removal. Frames from a different epoch are rejected outright.
//!
//! Distributing the rotated secret to the surviving members travels over
//! their pairwise sessions and is not this crate's concern.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod room;
mod secret;

pub use error::RoomError;
pub use room::SenderKeyRoom;
pub use secret::{RoomSecret, SenderKey, SENDER_KEY_INFO};
