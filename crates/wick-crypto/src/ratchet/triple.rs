//! Root key management and the combined ratchet state machine.

use thiserror::Error;
use zeroize::Zeroize;

use crate::{
    domain, kdf,
    kem::SharedSecret,
    nonce::REKEY_THRESHOLD,
    ratchet::chain::{ChainRatchet, MessageKey, SkippedKeyCache, MAX_SKIP},
};

/// Which side of the handshake this state belongs to.
///
/// Determines which root-derived chain is the sending chain; the peer
/// holds the mirror image so the two states stay in lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The peer that sent the opening handshake message.
    Initiator,
    /// The peer that held the prekey bundle.
    Responder,
}

impl Role {
    fn sending_label(self) -> &'static [u8] {
        match self {
            Self::Initiator => domain::CHAIN_INITIATOR,
            Self::Responder => domain::CHAIN_RESPONDER,
        }
    }

    fn receiving_label(self) -> &'static [u8] {
        match self {
            Self::Initiator => domain::CHAIN_RESPONDER,
            Self::Responder => domain::CHAIN_INITIATOR,
        }
    }
}

/// When the DH and PQ ratchets fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatchetPolicy {
    /// Messages sent on one chain before a DH ratchet is required.
    pub dh_interval: u32,
    /// Root-mix generations between PQ (ML-KEM) ratchet steps. The KEM
    /// is far more expensive than a DH step, so this schedule is sparse.
    /// Zero disables the PQ schedule entirely.
    pub pq_interval: u32,
}

impl Default for RatchetPolicy {
    fn default() -> Self {
        Self { dh_interval: 256, pq_interval: 16 }
    }
}

/// Errors from ratchet advancement.
///
/// None of these terminate the session on their own: a desynchronized
/// frame is dropped, and exhaustion forces a rekey. Persistent desync is
/// escalated by the caller as a policy decision.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RatchetError {
    /// The counter was already consumed and is no longer cached.
    #[error("ratchet desync: counter {counter} of generation {generation} is not derivable")]
    Desync {
        /// Root-mix generation of the frame
        generation: u32,
        /// Chain counter of the frame
        counter: u32,
    },

    /// The counter gap exceeds the lookahead window.
    #[error("counter {received} is beyond the skip window (next expected {expected})")]
    SkipBeyondWindow {
        /// Next counter the receiving chain expects
        expected: u32,
        /// Counter carried by the frame
        received: u32,
    },

    /// The frame belongs to a generation this state has not reached.
    #[error("generation {received} is ahead of local generation {current}")]
    EpochOutOfRange {
        /// Local root-mix generation
        current: u32,
        /// Generation carried by the frame
        received: u32,
    },

    /// The sending chain reached the rekey threshold.
    #[error("sending chain exhausted at generation {generation}; ratchet step required")]
    ChainExhausted {
        /// Generation whose chain ran out
        generation: u32,
    },
}

impl RatchetError {
    /// Whether the session must terminate.
    ///
    /// A desynchronized or exhausted ratchet drops the frame or forces a
    /// rekey; only the caller escalates repeated failures.
    pub fn is_fatal(&self) -> bool {
        false
    }
}

/// Per-session Triple Ratchet state.
///
/// # Invariants
///
/// - Exclusively owned by one session; advance operations take `&mut
///   self` and are never replayed for the same logical step.
/// - Chain counters reset only when a root mix installs fresh chains, so
///   `(generation, counter)` never repeats for a derived key.
/// - The skipped-key cache is bounded; evicted and consumed keys are
///   zeroized.
pub struct RatchetState {
    role: Role,
    policy: RatchetPolicy,
    root_key: [u8; 32],
    sending: ChainRatchet,
    receiving: ChainRatchet,
    generation: u32,
    pq_epoch: u32,
    sent_since_ratchet: u32,
    skipped: SkippedKeyCache,
}

impl RatchetState {
    /// Initialize from a handshake root key.
    pub fn initialize(root: &SharedSecret, role: Role, policy: RatchetPolicy) -> Self {
        let root_key = *root.as_bytes();
        let sending = ChainRatchet::new(kdf::expand_key(&root_key, role.sending_label()));
        let receiving = ChainRatchet::new(kdf::expand_key(&root_key, role.receiving_label()));
        Self {
            role,
            policy,
            root_key,
            sending,
            receiving,
            generation: 0,
            pq_epoch: 0,
            sent_since_ratchet: 0,
            skipped: SkippedKeyCache::new(MAX_SKIP as usize),
        }
    }

    /// This state's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current root-mix generation, carried in frame headers.
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Number of PQ ratchet steps applied so far.
    pub fn pq_epoch(&self) -> u32 {
        self.pq_epoch
    }

    /// Counter the next outgoing frame will carry.
    pub fn next_send_counter(&self) -> u32 {
        self.sending.next_counter()
    }

    /// Derive the next sending message key.
    ///
    /// # Errors
    ///
    /// [`RatchetError::ChainExhausted`] once the chain approaches the
    /// counter ceiling; a ratchet step must install fresh chains before
    /// this direction may send again. The counter never wraps.
    pub fn next_send_key(&mut self) -> Result<MessageKey, RatchetError> {
        if self.sending.next_counter() >= REKEY_THRESHOLD {
            return Err(RatchetError::ChainExhausted { generation: self.generation });
        }
        self.sent_since_ratchet += 1;
        Ok(self.sending.advance())
    }

    /// Whether policy requires a DH ratchet before the next send.
    pub fn needs_dh_ratchet(&self) -> bool {
        self.sent_since_ratchet >= self.policy.dh_interval
    }

    /// Whether the next root mix must also be a PQ step.
    ///
    /// Every `pq_interval`-th generation mixes an ML-KEM secret; a zero
    /// interval never schedules one.
    pub fn needs_pq_ratchet(&self) -> bool {
        self.policy.pq_interval != 0 && (self.generation + 1) % self.policy.pq_interval == 0
    }

    /// Mix fresh X25519 entropy into the root and install new chains.
    ///
    /// Both peers apply the same shared secret, keeping the states in
    /// lockstep. Chain counters restart at zero under the new chains;
    /// keys cached from earlier generations remain retrievable until
    /// evicted.
    pub fn dh_ratchet(&mut self, fresh: &SharedSecret) {
        self.mix_root(fresh, domain::RATCHET_DH);
    }

    /// Mix an ML-KEM shared secret into the root (PQ epoch boundary).
    pub fn pq_ratchet(&mut self, kem_shared: &SharedSecret) {
        self.mix_root(kem_shared, domain::RATCHET_PQ);
        self.pq_epoch += 1;
    }

    fn mix_root(&mut self, entropy: &SharedSecret, label: &[u8]) {
        let mut next_root = kdf::derive_key(Some(&self.root_key), entropy.as_bytes(), label);
        self.root_key.copy_from_slice(&next_root);
        next_root.zeroize();
        self.sending = ChainRatchet::new(kdf::expand_key(&self.root_key, self.role.sending_label()));
        self.receiving =
            ChainRatchet::new(kdf::expand_key(&self.root_key, self.role.receiving_label()));
        self.generation += 1;
        self.sent_since_ratchet = 0;
    }

    /// Derive the message key for an incoming frame.
    ///
    /// Frames may arrive out of order within the lookahead window;
    /// intervening keys are derived and cached. A frame from a future
    /// generation means the caller must apply the announced rekey first.
    pub fn receive_key(
        &mut self,
        generation: u32,
        counter: u32,
    ) -> Result<MessageKey, RatchetError> {
        if generation > self.generation {
            return Err(RatchetError::EpochOutOfRange {
                current: self.generation,
                received: generation,
            });
        }
        if generation < self.generation {
            // Older generation: only a previously skipped key can serve it.
            return self
                .skipped
                .take(generation, counter)
                .ok_or(RatchetError::Desync { generation, counter });
        }

        if counter >= REKEY_THRESHOLD {
            // A conforming sender rekeys before this counter; refuse to
            // walk the chain toward the ceiling.
            return Err(RatchetError::Desync { generation, counter });
        }
        let expected = self.receiving.next_counter();
        if counter < expected {
            return self
                .skipped
                .take(generation, counter)
                .ok_or(RatchetError::Desync { generation, counter });
        }
        if counter - expected > MAX_SKIP {
            return Err(RatchetError::SkipBeyondWindow { expected, received: counter });
        }
        while self.receiving.next_counter() < counter {
            let skipped = self.receiving.advance();
            self.skipped.insert(generation, skipped);
        }
        Ok(self.receiving.advance())
    }
}

impl Drop for RatchetState {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}

impl std::fmt::Debug for RatchetState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RatchetState")
            .field("role", &self.role)
            .field("generation", &self.generation)
            .field("pq_epoch", &self.pq_epoch)
            .finish_non_exhaustive()
    }
}
