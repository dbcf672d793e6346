//! Wick Cryptographic Session Core
//!
//! End-to-end confidentiality, integrity, and peer authenticity for
//! peer-to-peer data exchange, resistant to both classical and
//! quantum-capable adversaries. Protocol logic is synchronous and
//! sans-IO; callers provide transport bytes and random material.
//!
//! # Key Lifecycle
//!
//! ```text
//! Identity (Ed25519) ──signs──▶ SignedPrekeyBundle
//!                                      │
//!        Hybrid handshake (X25519 + ML-KEM-768)
//!                                      │
//!                                      ▼
//!                         Root Key (Triple Ratchet)
//!                          │        │         │
//!                 chain ratchet  DH ratchet  sparse PQ ratchet
//!                          │
//!                          ▼
//!                    Message Keys ──▶ AEAD frames (96-bit nonce)
//! ```
//!
//! Message keys are used for exactly one AEAD operation and zeroized
//! immediately afterwards. The short authentication string derived from
//! the handshake transcript gates the session: a mismatch is terminal.
//!
//! # Security
//!
//! Forward Secrecy:
//! - Chain advancement: old chain keys are zeroized after deriving the next
//! - DH ratchet: fresh X25519 entropy bounds what one chain key reveals
//! - Sparse PQ ratchet: ML-KEM-768 re-keying per epoch bounds the window a
//!   purely classical compromise is useful to a quantum adversary
//!
//! Nonce Governance:
//! - 96-bit nonce = direction bit, 32-bit counter, zero padding
//! - `NonceState::reserve` is the only read-then-increment path
//! - Exhaustion forces a ratchet step; counters never wrap
//!
//! Authenticity:
//! - Ed25519 identity signatures bind prekey bundles and rekeys
//! - AEAD tags are verified before any plaintext is released
//! - The SAS code detects active machine-in-the-middle attacks

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod domain;
pub mod handshake;
pub mod identity;
pub mod kdf;
pub mod kem;
pub mod nonce;
pub mod prekey;
pub mod ratchet;
pub mod sas;
pub mod suite;

pub use codec::{CodecError, SymmetricCodec};
pub use handshake::{
    HandshakeError, HandshakeInitiator, HandshakeResponder, HandshakeTranscript, SessionSeed,
};
pub use identity::{IdentityKeyPair, IdentityPublicKey};
pub use kem::{HybridCiphertext, HybridKeyPair, HybridPublicKey, SharedSecret};
pub use nonce::{Direction, Nonce, NonceState};
pub use prekey::{PrekeySecrets, SignedPrekeyBundle};
pub use ratchet::{MessageKey, RatchetError, RatchetPolicy, RatchetState, Role};
pub use sas::{SasCode, SasError, SasVerifier, SAS_DEADLINE, SAS_ENTROPY_BITS};
pub use suite::{AlgorithmId, SuiteError, SuitePolicy, NONCE_LEN, TAG_LEN};
