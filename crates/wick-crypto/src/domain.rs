//! Domain separation labels for key derivation.
//!
//! Every KDF invocation in this crate carries one of these labels so that
//! operations in different contexts produce unrelated outputs even from
//! identical inputs.

/// Combining the classical and post-quantum handshake secrets.
pub const HANDSHAKE_COMBINE: &[u8] = b"wick.handshake.combine.v1";

/// Hashing the handshake transcript.
pub const HANDSHAKE_TRANSCRIPT: &[u8] = b"wick.handshake.transcript.v1";

/// Initiator-to-responder key confirmation tag.
pub const KEY_CONFIRM_INITIATOR: &[u8] = b"wick.key_confirm.initiator.v1";

/// Responder-to-initiator key confirmation tag.
pub const KEY_CONFIRM_RESPONDER: &[u8] = b"wick.key_confirm.responder.v1";

/// Signing the initiator's opening handshake message.
pub const HANDSHAKE_SIG: &[u8] = b"wick.handshake.signature.v1";

/// Signing a prekey bundle with the long-term identity.
pub const PREKEY_SIG: &[u8] = b"wick.prekey.signature.v1";

/// Signing a mid-session rekey announcement.
pub const REKEY_SIG: &[u8] = b"wick.rekey.signature.v1";

/// Deriving the initiator's sending chain from the root key.
pub const CHAIN_INITIATOR: &[u8] = b"wick.chain.initiator.v1";

/// Deriving the responder's sending chain from the root key.
pub const CHAIN_RESPONDER: &[u8] = b"wick.chain.responder.v1";

/// Mixing a DH ratchet output into the root key.
pub const RATCHET_DH: &[u8] = b"wick.ratchet.dh.v1";

/// Mixing a PQ ratchet (ML-KEM) output into the root key.
pub const RATCHET_PQ: &[u8] = b"wick.ratchet.pq.v1";

/// Short authentication string derivation.
pub const SAS: &[u8] = b"wick.sas.v1";

/// Room secret epoch rotation.
pub const ROOM_ROTATE: &[u8] = b"wick.room.rotate.v1";
