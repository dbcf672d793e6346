//! Hybrid handshake state machines.
//!
//! The initiator encapsulates against a verified prekey bundle and sends
//! its identity, a fresh X25519 ephemeral, and the ML-KEM-768 ciphertext.
//! The responder decapsulates, completes its own ephemeral exchange, and
//! both sides derive the session root key from three shared secrets:
//!
//! ```text
//! root = HKDF(salt = transcript_hash,
//!             ikm  = dh(eph_i, prekey) || dh(eph_i, eph_r) || kem_ss)
//! ```
//!
//! Every public value exchanged is absorbed into the transcript in wire
//! order, so the root key, the key-confirmation tags, and the short
//! authentication string all bind the exact bytes each side saw. An
//! active substitution of any value diverges the transcripts and is
//! caught either by the confirmation tags or by the SAS comparison.
//!
//! State machines advance by consuming `self`; a completed or failed
//! handshake cannot be driven twice. All failures are terminal for the
//! attempt and no partial key material escapes on an error path.

use hmac::{Hmac, Mac as _};
use rand_core::{CryptoRng, RngCore};
use sha2::{Digest as _, Sha256};
use subtle::ConstantTimeEq as _;
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize as _;

use crate::{
    domain,
    identity::{IdentityError, IdentityKeyPair, IdentityPublicKey, SIGNATURE_LEN},
    kdf,
    kem::{self, HybridCiphertext, KemError, SharedSecret, X25519_PUBLIC_LEN},
    prekey::{PrekeyError, PrekeySecrets, SignedPrekeyBundle},
    suite::{self, AlgorithmId, SuiteError, SuitePolicy},
};

/// Current handshake wire version.
pub const HANDSHAKE_VERSION: u8 = 1;

/// Errors that fail a handshake attempt.
///
/// Every variant is terminal for the attempt: the caller may start a
/// fresh handshake but never resume partial state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    /// An identity signature over handshake material did not verify.
    #[error("handshake signature verification failed")]
    BadSignature,

    /// The peer proposed a suite below the local policy minimum.
    #[error("downgrade attempt: peer proposed {proposed:?}")]
    Downgrade {
        /// Suite the peer proposed
        proposed: AlgorithmId,
    },

    /// No suite is acceptable to both sides.
    #[error("no mutually supported cipher suite")]
    NoCommonSuite,

    /// The peer spoke an unsupported protocol version.
    #[error("unsupported handshake version {version}")]
    UnsupportedVersion {
        /// Version byte the peer sent
        version: u8,
    },

    /// A key, ciphertext, or bundle failed to parse.
    #[error("malformed handshake material: {0}")]
    Malformed(#[from] KemError),

    /// The peer's key-confirmation tag did not match.
    #[error("key confirmation failed")]
    ConfirmationFailed,

    /// The local suite policy admits no algorithm at all.
    #[error(transparent)]
    Policy(#[from] SuiteError),
}

impl From<PrekeyError> for HandshakeError {
    fn from(err: PrekeyError) -> Self {
        match err {
            PrekeyError::BadSignature => Self::BadSignature,
            PrekeyError::Malformed(inner) => Self::Malformed(inner),
        }
    }
}

impl From<IdentityError> for HandshakeError {
    fn from(_: IdentityError) -> Self {
        // An undecodable key and a bad signature are indistinguishable to
        // the peer; both fail the attempt the same way.
        Self::BadSignature
    }
}

/// Initiator's opening message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeInit {
    /// Protocol version byte.
    pub version: u8,
    /// Initiator's long-term identity key.
    pub initiator_identity: IdentityPublicKey,
    /// Which of the responder's published prekeys was used.
    pub prekey_id: u32,
    /// Initiator's fresh X25519 ephemeral public key.
    pub ephemeral_x25519: [u8; X25519_PUBLIC_LEN],
    /// ML-KEM-768 ciphertext against the prekey's encapsulation key.
    pub kem_ciphertext: Vec<u8>,
    /// Suites the initiator supports, most preferred first.
    pub offered: Vec<AlgorithmId>,
    /// Identity signature over all fields above.
    pub signature: [u8; SIGNATURE_LEN],
}

impl HandshakeInit {
    fn signed_message(&self) -> Vec<u8> {
        let mut message = Vec::with_capacity(
            1 + 32 + 4 + X25519_PUBLIC_LEN + self.kem_ciphertext.len() + self.offered.len(),
        );
        message.push(self.version);
        message.extend_from_slice(self.initiator_identity.as_bytes());
        message.extend_from_slice(&self.prekey_id.to_be_bytes());
        message.extend_from_slice(&self.ephemeral_x25519);
        message.extend_from_slice(&self.kem_ciphertext);
        message.extend(self.offered.iter().map(|suite| suite.to_u8()));
        message
    }
}

/// Responder's reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Protocol version byte.
    pub version: u8,
    /// Responder's fresh X25519 ephemeral public key.
    pub ephemeral_x25519: [u8; X25519_PUBLIC_LEN],
    /// Suite the responder selected from the offer.
    pub chosen: AlgorithmId,
    /// Identity signature over the full transcript hash.
    pub signature: [u8; SIGNATURE_LEN],
    /// Responder's key-confirmation tag.
    pub confirm_tag: [u8; 32],
}

/// Initiator's closing key-confirmation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeConfirm {
    /// Initiator's key-confirmation tag.
    pub confirm_tag: [u8; 32],
}

/// Running hash over every public value exchanged, in wire order.
///
/// Immutable once the handshake completes; the final hash salts the root
/// key derivation and seeds the SAS code.
#[derive(Debug, Clone)]
pub struct HandshakeTranscript {
    hasher: Sha256,
}

impl HandshakeTranscript {
    /// Start an empty transcript.
    pub fn new() -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain::HANDSHAKE_TRANSCRIPT);
        Self { hasher }
    }

    /// Absorb one field, length-prefixed so field boundaries are
    /// unambiguous.
    pub fn append(&mut self, field: &[u8]) {
        self.hasher.update((field.len() as u32).to_be_bytes());
        self.hasher.update(field);
    }

    /// Hash of everything absorbed so far.
    pub fn hash(&self) -> [u8; 32] {
        self.hasher.clone().finalize().into()
    }
}

impl Default for HandshakeTranscript {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a new session needs from a completed handshake.
pub struct SessionSeed {
    root: SharedSecret,
    transcript_hash: [u8; 32],
    algorithm: AlgorithmId,
}

impl SessionSeed {
    /// Root key seeding the ratchet.
    pub fn root_key(&self) -> &SharedSecret {
        &self.root
    }

    /// Final transcript hash, the SAS derivation input.
    pub fn transcript_hash(&self) -> &[u8; 32] {
        &self.transcript_hash
    }

    /// Negotiated AEAD algorithm.
    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }
}

impl std::fmt::Debug for SessionSeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionSeed")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

/// Initiator side, waiting for the responder's reply.
pub struct HandshakeInitiator {
    ephemeral_secret: StaticSecret,
    dh_prekey: SharedSecret,
    kem_shared: SharedSecret,
    transcript: HandshakeTranscript,
    responder_identity: IdentityPublicKey,
    policy: SuitePolicy,
}

impl HandshakeInitiator {
    /// Verify the responder's prekey bundle and produce the opening
    /// message.
    ///
    /// # Errors
    ///
    /// [`HandshakeError::BadSignature`] if the bundle is not signed by
    /// `responder_identity`; nothing in the bundle is used in that case.
    pub fn start(
        rng: &mut (impl RngCore + CryptoRng),
        identity: &IdentityKeyPair,
        responder_identity: &IdentityPublicKey,
        bundle: &SignedPrekeyBundle,
        policy: SuitePolicy,
    ) -> Result<(Self, HandshakeInit), HandshakeError> {
        bundle.verify(responder_identity)?;

        let offered = policy.preference_order();
        if offered.is_empty() {
            return Err(SuiteError::UnsupportedPolicy {
                reason: "policy minimum excludes every supported algorithm",
            }
            .into());
        }

        let encap = kem::encapsulate(rng, &bundle.public)?;
        let mut init = HandshakeInit {
            version: HANDSHAKE_VERSION,
            initiator_identity: identity.public(),
            prekey_id: bundle.prekey_id,
            ephemeral_x25519: encap.ciphertext.x25519_ephemeral,
            kem_ciphertext: encap.ciphertext.ml_kem,
            offered,
            signature: [0u8; SIGNATURE_LEN],
        };
        init.signature = identity.sign(domain::HANDSHAKE_SIG, &init.signed_message());

        let mut transcript = HandshakeTranscript::new();
        absorb_init(&mut transcript, &init, responder_identity, &bundle.public.x25519, &bundle.public.ml_kem);

        let state = Self {
            ephemeral_secret: encap.x25519_ephemeral_secret,
            dh_prekey: encap.x25519_shared,
            kem_shared: encap.ml_kem_shared,
            transcript,
            responder_identity: *responder_identity,
            policy,
        };
        Ok((state, init))
    }

    /// Process the responder's reply, completing key agreement.
    ///
    /// Consumes the state machine. On success the session is in the
    /// key-agreed state; the returned [`HandshakeConfirm`] must be sent
    /// and the SAS comparison still gates the session.
    pub fn receive_response(
        mut self,
        response: &HandshakeResponse,
    ) -> Result<(SessionSeed, HandshakeConfirm), HandshakeError> {
        if response.version != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnsupportedVersion { version: response.version });
        }
        if !self.policy.accepts(response.chosen) {
            return Err(HandshakeError::Downgrade { proposed: response.chosen });
        }

        self.transcript.append(&response.ephemeral_x25519);
        self.transcript.append(&[response.chosen.to_u8()]);
        let transcript_hash = self.transcript.hash();

        self.responder_identity.verify(
            domain::HANDSHAKE_SIG,
            &transcript_hash,
            &response.signature,
        )?;

        let dh_ephemeral = SharedSecret::new(
            self.ephemeral_secret
                .diffie_hellman(&X25519Public::from(response.ephemeral_x25519))
                .to_bytes(),
        );
        let root = derive_root(&transcript_hash, &self.dh_prekey, &dh_ephemeral, &self.kem_shared);

        let expected = confirm_tag(&root, domain::KEY_CONFIRM_RESPONDER, &transcript_hash);
        if !bool::from(expected.ct_eq(&response.confirm_tag)) {
            return Err(HandshakeError::ConfirmationFailed);
        }

        let confirm = HandshakeConfirm {
            confirm_tag: confirm_tag(&root, domain::KEY_CONFIRM_INITIATOR, &transcript_hash),
        };
        let seed = SessionSeed { root, transcript_hash, algorithm: response.chosen };
        Ok((seed, confirm))
    }
}

impl std::fmt::Debug for HandshakeInitiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeInitiator")
            .field("responder_identity", &self.responder_identity)
            .finish_non_exhaustive()
    }
}

/// Responder side, waiting for the initiator's key confirmation.
pub struct HandshakeResponder {
    seed: SessionSeed,
    expected_confirm: [u8; 32],
}

impl HandshakeResponder {
    /// Process an opening message and produce the reply.
    ///
    /// The initiator's identity signature is verified against the
    /// identity carried in the message; pinning that identity against a
    /// trust-on-first-use record is the caller's responsibility.
    pub fn respond(
        rng: &mut (impl RngCore + CryptoRng),
        identity: &IdentityKeyPair,
        prekey: &PrekeySecrets,
        policy: SuitePolicy,
        init: &HandshakeInit,
    ) -> Result<(Self, HandshakeResponse), HandshakeError> {
        if init.version != HANDSHAKE_VERSION {
            return Err(HandshakeError::UnsupportedVersion { version: init.version });
        }
        init.initiator_identity.verify(
            domain::HANDSHAKE_SIG,
            &init.signed_message(),
            &init.signature,
        )?;

        let chosen = suite::negotiate(&policy.preference_order(), &init.offered)
            .ok_or(HandshakeError::NoCommonSuite)?;

        let dh_prekey = prekey.diffie_hellman(&init.ephemeral_x25519);
        let kem_shared = prekey.decapsulate(&HybridCiphertext {
            ml_kem: init.kem_ciphertext.clone(),
            x25519_ephemeral: init.ephemeral_x25519,
        })?;

        let ephemeral_secret = StaticSecret::random_from_rng(&mut *rng);
        let ephemeral_public = X25519Public::from(&ephemeral_secret);
        let dh_ephemeral = SharedSecret::new(
            ephemeral_secret
                .diffie_hellman(&X25519Public::from(init.ephemeral_x25519))
                .to_bytes(),
        );

        let mut transcript = HandshakeTranscript::new();
        absorb_init(
            &mut transcript,
            init,
            &identity.public(),
            &prekey.public().x25519,
            &prekey.public().ml_kem,
        );
        transcript.append(ephemeral_public.as_bytes());
        transcript.append(&[chosen.to_u8()]);
        let transcript_hash = transcript.hash();

        let root = derive_root(&transcript_hash, &dh_prekey, &dh_ephemeral, &kem_shared);

        let response = HandshakeResponse {
            version: HANDSHAKE_VERSION,
            ephemeral_x25519: *ephemeral_public.as_bytes(),
            chosen,
            signature: identity.sign(domain::HANDSHAKE_SIG, &transcript_hash),
            confirm_tag: confirm_tag(&root, domain::KEY_CONFIRM_RESPONDER, &transcript_hash),
        };

        let expected_confirm =
            confirm_tag(&root, domain::KEY_CONFIRM_INITIATOR, &transcript_hash);
        let seed = SessionSeed { root, transcript_hash, algorithm: chosen };
        Ok((Self { seed, expected_confirm }, response))
    }

    /// Verify the initiator's key confirmation and release the seed.
    pub fn receive_confirm(self, confirm: &HandshakeConfirm) -> Result<SessionSeed, HandshakeError> {
        if !bool::from(self.expected_confirm.ct_eq(&confirm.confirm_tag)) {
            return Err(HandshakeError::ConfirmationFailed);
        }
        Ok(self.seed)
    }
}

impl std::fmt::Debug for HandshakeResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeResponder")
            .field("algorithm", &self.seed.algorithm)
            .finish_non_exhaustive()
    }
}

/// Absorb the opening message plus the responder-side context both peers
/// know out of band (responder identity, prekey public halves).
fn absorb_init(
    transcript: &mut HandshakeTranscript,
    init: &HandshakeInit,
    responder_identity: &IdentityPublicKey,
    prekey_x25519: &[u8; X25519_PUBLIC_LEN],
    prekey_ml_kem: &[u8],
) {
    transcript.append(&[init.version]);
    transcript.append(init.initiator_identity.as_bytes());
    transcript.append(responder_identity.as_bytes());
    transcript.append(&init.prekey_id.to_be_bytes());
    transcript.append(prekey_x25519);
    transcript.append(prekey_ml_kem);
    transcript.append(&init.ephemeral_x25519);
    transcript.append(&init.kem_ciphertext);
    let offered: Vec<u8> = init.offered.iter().map(|suite| suite.to_u8()).collect();
    transcript.append(&offered);
}

/// Combine the three handshake secrets into the root key.
fn derive_root(
    transcript_hash: &[u8; 32],
    dh_prekey: &SharedSecret,
    dh_ephemeral: &SharedSecret,
    kem_shared: &SharedSecret,
) -> SharedSecret {
    let mut ikm = [0u8; 96];
    ikm[..32].copy_from_slice(dh_prekey.as_bytes());
    ikm[32..64].copy_from_slice(dh_ephemeral.as_bytes());
    ikm[64..].copy_from_slice(kem_shared.as_bytes());
    let root = kdf::derive_key(Some(transcript_hash), &ikm, domain::HANDSHAKE_COMBINE);
    ikm.zeroize();
    SharedSecret::new(root)
}

/// Key-confirmation tag: HMAC over the transcript hash under a
/// direction-specific key expanded from the root.
fn confirm_tag(root: &SharedSecret, label: &[u8], transcript_hash: &[u8; 32]) -> [u8; 32] {
    let mut key = kdf::expand_key(root.as_bytes(), label);
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(&key) else {
        unreachable!("HMAC-SHA256 accepts any key length");
    };
    key.zeroize();
    mac.update(transcript_hash);
    mac.finalize().into_bytes().into()
}
