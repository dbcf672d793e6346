//! Wick wire protocol.
//!
//! Every transport message is a [`Frame`]: a fixed 32-byte big-endian
//! binary header for O(1) dispatch, followed by payload bytes. Control
//! payloads (handshake, rekey, room control) are CBOR; data payloads
//! are raw AEAD ciphertext and are never deserialized by this crate.
//!
//! The header doubles as the associated data for data frames, so the
//! routing fields a relay can see are the same fields the AEAD binds.
//!
//! This crate is structural only: it guarantees well-formed framing,
//! never authenticity. Signature and tag verification live in
//! `wick-crypto` and the session layer.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod errors;
mod frame;
mod header;
mod opcode;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::{FrameFlags, FrameHeader};
pub use opcode::Opcode;
pub use payloads::Payload;
