//! Session layer: ownership, establishment, and prekey publication.
//!
//! `wick-crypto` keeps protocol logic synchronous and sans-IO; this
//! crate supplies everything around it that touches a clock, a wire, or
//! shared state:
//!
//! - [`Session`]: exclusive owner of one conversation's ratchet, codec,
//!   and SAS verifier. Mutation goes through `&mut self`, so counter and
//!   chain-key advancement stays single-writer by construction.
//! - [`driver`]: async handshake establishment over a [`FrameTransport`],
//!   with per-receive deadlines and drop-cancellation.
//! - [`PrekeyStore`]: published prekeys behind immutable snapshots, so
//!   inbound handshakes never contend with rotation.
//! - [`Environment`]: injectable clock and entropy, for deterministic
//!   tests against a paused clock.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
pub mod env;
mod error;
mod prekey_store;
mod session;

pub use driver::{initiate, respond, FrameTransport, SessionConfig, HANDSHAKE_TIMEOUT};
pub use env::{EnvRng, Environment, SystemEnv};
pub use error::SessionError;
pub use prekey_store::{PrekeySnapshot, PrekeyStore};
pub use session::{Session, SessionStatus};
