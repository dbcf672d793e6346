//! Established session ownership.
//!
//! A [`Session`] exclusively owns one pairwise conversation's ratchet,
//! codec, and SAS verifier. All advance operations take `&mut self`, so
//! the single-writer discipline over counters and chain keys is enforced
//! by the borrow checker rather than by locks; callers requiring
//! concurrency put the session behind one owning task.
//!
//! # Lifecycle
//!
//! A fresh session starts pending verification: no application plaintext
//! flows until the operator confirms the short authentication string. A
//! reported mismatch terminates the session immediately, well inside the
//! [`wick_crypto::sas::SAS_DEADLINE`] window, and every later operation
//! returns [`SessionError::Terminated`]. Key material is zeroized when
//! the ratchet state drops.

use std::sync::Arc;

use rand_core::{CryptoRng, RngCore};
use tracing::{debug, warn};
use wick_crypto::{
    handshake::{HandshakeError, SessionSeed},
    kem::{self, HybridCiphertext, HybridPublicKey},
    sas::{SasCode, SasVerifier},
    suite::AlgorithmId,
    Direction, IdentityKeyPair, IdentityPublicKey, Nonce, PrekeySecrets, RatchetPolicy,
    RatchetState, Role, SymmetricCodec,
};
use wick_proto::{payloads::RekeyAnnounce, Frame, FrameFlags, FrameHeader, Opcode};

use crate::error::SessionError;

/// Where the session sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Keys agreed; waiting for the SAS comparison.
    PendingVerification,
    /// Verified; application traffic flows.
    Active,
    /// Terminal. No frames are processed.
    Terminated,
}

/// One established pairwise session.
pub struct Session {
    role: Role,
    direction: Direction,
    local_sender: u64,
    identity: Arc<IdentityKeyPair>,
    peer_identity: IdentityPublicKey,
    ratchet: RatchetState,
    codec: SymmetricCodec,
    sas: SasVerifier,
    status: SessionStatus,
    // Rekey material is asymmetric: the initiator encapsulates against
    // the prekey it handshook with, the responder decapsulates with the
    // matching secrets.
    rekey_target: Option<HybridPublicKey>,
    rekey_secrets: Option<Arc<PrekeySecrets>>,
}

impl Session {
    /// Build the initiator's session from a completed handshake.
    pub fn initiator(
        seed: &SessionSeed,
        identity: Arc<IdentityKeyPair>,
        peer_identity: IdentityPublicKey,
        local_sender: u64,
        rekey_target: HybridPublicKey,
        policy: RatchetPolicy,
    ) -> Self {
        Self::build(seed, identity, peer_identity, local_sender, Role::Initiator, Some(rekey_target), None, policy)
    }

    /// Build the responder's session from a completed handshake.
    pub fn responder(
        seed: &SessionSeed,
        identity: Arc<IdentityKeyPair>,
        peer_identity: IdentityPublicKey,
        local_sender: u64,
        rekey_secrets: Arc<PrekeySecrets>,
        policy: RatchetPolicy,
    ) -> Self {
        Self::build(seed, identity, peer_identity, local_sender, Role::Responder, None, Some(rekey_secrets), policy)
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        seed: &SessionSeed,
        identity: Arc<IdentityKeyPair>,
        peer_identity: IdentityPublicKey,
        local_sender: u64,
        role: Role,
        rekey_target: Option<HybridPublicKey>,
        rekey_secrets: Option<Arc<PrekeySecrets>>,
        policy: RatchetPolicy,
    ) -> Self {
        let direction = match role {
            Role::Initiator => Direction::Sender,
            Role::Responder => Direction::Receiver,
        };
        debug!(?role, algorithm = ?seed.algorithm(), "session established, pending verification");
        Self {
            role,
            direction,
            local_sender,
            identity,
            peer_identity,
            ratchet: RatchetState::initialize(seed.root_key(), role, policy),
            codec: SymmetricCodec::new(seed.algorithm()),
            sas: SasVerifier::new(seed.transcript_hash()),
            status: SessionStatus::PendingVerification,
            rekey_target,
            rekey_secrets,
        }
    }

    /// Lifecycle state.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// This side's handshake role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Negotiated AEAD algorithm.
    pub fn algorithm(&self) -> AlgorithmId {
        self.codec.algorithm()
    }

    /// Current root-mix generation.
    pub fn generation(&self) -> u32 {
        self.ratchet.generation()
    }

    /// The peer's long-term identity.
    pub fn peer_identity(&self) -> &IdentityPublicKey {
        &self.peer_identity
    }

    /// The code to display for the out-of-band comparison.
    pub fn sas_code(&self) -> &SasCode {
        self.sas.code()
    }

    /// Operator confirmed the codes match; application traffic may flow.
    pub fn confirm_sas(&mut self) -> Result<(), SessionError> {
        if self.status == SessionStatus::Terminated {
            return Err(SessionError::Terminated);
        }
        self.sas.confirm()?;
        self.status = SessionStatus::Active;
        debug!("session verified");
        Ok(())
    }

    /// Operator reported differing codes: probable interception.
    ///
    /// Terminates the session synchronously, so the deadline between the
    /// report and the last possible AEAD operation is zero. Returns the
    /// error the caller should propagate.
    pub fn report_sas_mismatch(&mut self) -> SessionError {
        let err = self.sas.report_mismatch();
        self.status = SessionStatus::Terminated;
        warn!("short authentication string mismatch; session terminated");
        SessionError::Sas(err)
    }

    /// Tear the session down. Key material is zeroized on drop.
    pub fn terminate(&mut self) {
        self.status = SessionStatus::Terminated;
    }

    fn ready(&self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Terminated => Err(SessionError::Terminated),
            SessionStatus::PendingVerification => Err(SessionError::NotVerified),
            SessionStatus::Active => Ok(()),
        }
    }

    /// Seal one application message into a data frame.
    ///
    /// # Errors
    ///
    /// [`SessionError::RekeyRequired`] once the ratchet policy demands a
    /// step (this side then calls [`Session::announce_rekey`]);
    /// lifecycle gate errors before verification or after termination.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Frame, SessionError> {
        self.ready()?;
        if self.rekey_target.is_some() && self.ratchet.needs_dh_ratchet() {
            return Err(SessionError::RekeyRequired { generation: self.ratchet.generation() });
        }

        let key = self.ratchet.next_send_key()?;
        let mut header = FrameHeader::new(Opcode::Data);
        header.set_sender_id(self.local_sender);
        header.set_context(self.ratchet.generation());
        header.set_counter(key.counter());
        let mut flags = FrameFlags::default().with(FrameFlags::EXPLICIT_COUNTER, true);
        if self.direction == Direction::Receiver {
            flags = flags.with(FrameFlags::RECEIVER_ORIGINATED, true);
        }
        header.set_flags(flags);

        let nonce = Nonce::new(self.direction, key.counter());
        let ciphertext =
            self.codec.encrypt(key.as_bytes(), &nonce, &header.associated_data(), plaintext)?;
        Ok(Frame::new(header, ciphertext)?)
    }

    /// Open one data frame from the peer.
    ///
    /// A frame that fails authentication is dropped; its message key was
    /// consumed, so a replacement frame for the same counter is served
    /// from the skipped-key cache only if it was derived along the way.
    pub fn open(&mut self, frame: &Frame) -> Result<Vec<u8>, SessionError> {
        self.ready()?;
        if frame.header.opcode_enum() != Some(Opcode::Data) {
            return Err(SessionError::UnexpectedFrame { opcode: frame.header.opcode() });
        }
        let direction =
            if frame.header.flags().receiver_originated() { Direction::Receiver } else { Direction::Sender };
        if direction != self.direction.flip() {
            return Err(SessionError::UnexpectedFrame { opcode: frame.header.opcode() });
        }

        let generation = frame.header.context();
        let counter = frame.header.counter();
        let key = self.ratchet.receive_key(generation, counter)?;
        let nonce = Nonce::new(direction, counter);
        match self.codec.decrypt(key.as_bytes(), &nonce, &frame.header.associated_data(), &frame.payload)
        {
            Ok(plaintext) => Ok(plaintext),
            Err(err) => {
                warn!(generation, counter, "data frame failed authentication");
                Err(err.into())
            }
        }
    }

    /// Start a ratchet step: mix fresh entropy locally and produce the
    /// signed announcement the peer applies.
    ///
    /// On PQ epoch boundaries the announcement carries an ML-KEM
    /// ciphertext and the root mix uses the encapsulated secret;
    /// otherwise a fresh X25519 exchange against the handshake prekey
    /// drives the mix.
    pub fn announce_rekey(
        &mut self,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<RekeyAnnounce, SessionError> {
        self.ready()?;
        let Some(target) = &self.rekey_target else {
            return Err(SessionError::RekeyUnavailable);
        };
        let encap = kem::encapsulate(rng, target).map_err(HandshakeError::from)?;

        let pq = self.ratchet.needs_pq_ratchet();
        let generation = self.ratchet.generation() + 1;
        let announce = RekeyAnnounce::sign(
            &self.identity,
            generation,
            encap.ciphertext.x25519_ephemeral,
            pq.then(|| encap.ciphertext.ml_kem.clone()),
        );
        if pq {
            self.ratchet.pq_ratchet(&encap.ml_kem_shared);
        } else {
            self.ratchet.dh_ratchet(&encap.x25519_shared);
        }
        debug!(generation, pq, "rekey announced");
        Ok(announce)
    }

    /// Apply a peer's rekey announcement.
    ///
    /// The signature is verified against the peer's long-term identity
    /// before anything is mixed; an injected announcement cannot
    /// desynchronize the ratchets.
    pub fn apply_rekey(&mut self, announce: &RekeyAnnounce) -> Result<(), SessionError> {
        self.ready()?;
        announce.verify(&self.peer_identity)?;

        let current = self.ratchet.generation();
        if announce.generation != current + 1 {
            return Err(SessionError::StaleRekey { current, received: announce.generation });
        }
        let Some(secrets) = &self.rekey_secrets else {
            return Err(SessionError::RekeyUnavailable);
        };

        match &announce.kem_ciphertext {
            Some(ciphertext) => {
                let shared = secrets
                    .decapsulate(&HybridCiphertext {
                        ml_kem: ciphertext.clone(),
                        x25519_ephemeral: announce.dh_public,
                    })
                    .map_err(HandshakeError::from)?;
                self.ratchet.pq_ratchet(&shared);
            }
            None => {
                let shared = secrets.diffie_hellman(&announce.dh_public);
                self.ratchet.dh_ratchet(&shared);
            }
        }
        debug!(generation = announce.generation, "rekey applied");
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("status", &self.status)
            .field("generation", &self.ratchet.generation())
            .field("algorithm", &self.codec.algorithm())
            .finish_non_exhaustive()
    }
}
