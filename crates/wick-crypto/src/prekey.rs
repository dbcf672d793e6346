//! Signed prekey bundles for asynchronous handshakes.
//!
//! A responder publishes one or more bundles so initiators can start a
//! handshake while the responder is offline. Each bundle carries a
//! hybrid (X25519 + ML-KEM-768) public key signed by the long-term
//! identity; the signature is what a peer authenticates before trusting
//! any key in the bundle.
//!
//! Bundles rotate periodically. Verification of a stale or tampered
//! bundle is terminal for that handshake attempt; the same bundle is
//! never retried.

use rand_core::{CryptoRng, RngCore};
use thiserror::Error;

use crate::{
    domain,
    identity::{IdentityError, IdentityKeyPair, IdentityPublicKey, SIGNATURE_LEN},
    kem::{HybridCiphertext, HybridKeyPair, HybridPublicKey, KemError, SharedSecret},
};

/// Default bundle lifetime before rotation, in seconds (7 days).
pub const PREKEY_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;

/// Errors from prekey bundle handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PrekeyError {
    /// The bundle's identity signature did not verify.
    #[error("prekey bundle signature verification failed")]
    BadSignature,

    /// The bundle's key material is malformed.
    #[error("malformed prekey bundle: {0}")]
    Malformed(#[from] KemError),
}

impl From<IdentityError> for PrekeyError {
    fn from(_: IdentityError) -> Self {
        // Both identity error cases mean the bundle cannot be trusted.
        Self::BadSignature
    }
}

/// A published prekey bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPrekeyBundle {
    /// Identifier the initiator echoes back so the responder can find
    /// the matching secret.
    pub prekey_id: u32,
    /// Hybrid public key for key agreement.
    pub public: HybridPublicKey,
    /// Unix timestamp (seconds) at generation, for expiry.
    pub created_at: u64,
    /// Ed25519 signature by the owner's identity over the fields above.
    pub signature: [u8; SIGNATURE_LEN],
}

impl SignedPrekeyBundle {
    /// Byte string the identity signature covers.
    fn signed_message(prekey_id: u32, public: &HybridPublicKey, created_at: u64) -> Vec<u8> {
        let mut message =
            Vec::with_capacity(4 + 8 + public.x25519.len() + public.ml_kem.len());
        message.extend_from_slice(&prekey_id.to_be_bytes());
        message.extend_from_slice(&public.x25519);
        message.extend_from_slice(&public.ml_kem);
        message.extend_from_slice(&created_at.to_be_bytes());
        message
    }

    /// Verify the bundle against the owner's identity key.
    ///
    /// This is the peer-authentication gate: nothing in the bundle may
    /// be used for key agreement until this succeeds. Failure is
    /// terminal for the handshake attempt.
    pub fn verify(&self, identity: &IdentityPublicKey) -> Result<(), PrekeyError> {
        let message = Self::signed_message(self.prekey_id, &self.public, self.created_at);
        identity.verify(domain::PREKEY_SIG, &message, &self.signature)?;
        Ok(())
    }

    /// Whether the bundle has outlived `max_age_secs` at `now_secs`.
    pub fn is_expired(&self, now_secs: u64, max_age_secs: u64) -> bool {
        now_secs.saturating_sub(self.created_at) > max_age_secs
    }
}

/// Secret half of a published prekey, held by the bundle owner.
pub struct PrekeySecrets {
    prekey_id: u32,
    keypair: HybridKeyPair,
}

impl PrekeySecrets {
    /// Generate a fresh prekey and its signed public bundle.
    pub fn generate(
        rng: &mut (impl RngCore + CryptoRng),
        prekey_id: u32,
        identity: &IdentityKeyPair,
        created_at: u64,
    ) -> (Self, SignedPrekeyBundle) {
        let keypair = HybridKeyPair::generate(rng);
        let public = keypair.public().clone();
        let message = SignedPrekeyBundle::signed_message(prekey_id, &public, created_at);
        let signature = identity.sign(domain::PREKEY_SIG, &message);
        let bundle = SignedPrekeyBundle { prekey_id, public, created_at, signature };
        (Self { prekey_id, keypair }, bundle)
    }

    /// Identifier matching the published bundle.
    pub fn prekey_id(&self) -> u32 {
        self.prekey_id
    }

    /// DH against an initiator's ephemeral X25519 key.
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> SharedSecret {
        self.keypair.diffie_hellman(their_public)
    }

    /// Decapsulate the ML-KEM component of an initiator's ciphertext.
    pub fn decapsulate(&self, ciphertext: &HybridCiphertext) -> Result<SharedSecret, PrekeyError> {
        Ok(self.keypair.decapsulate(ciphertext)?)
    }

    /// Serialized secret halves for persistence.
    pub fn secret_bytes(&self) -> ([u8; 32], Vec<u8>) {
        self.keypair.secret_bytes()
    }

    /// Rebuild from persisted bytes.
    pub fn from_stored_bytes(
        prekey_id: u32,
        x25519_secret: [u8; 32],
        ml_kem_secret: &[u8],
        ml_kem_public: Vec<u8>,
    ) -> Result<Self, PrekeyError> {
        let keypair =
            HybridKeyPair::from_stored_bytes(x25519_secret, ml_kem_secret, ml_kem_public)?;
        Ok(Self { prekey_id, keypair })
    }

    /// Public half (for rebuilding bundles from storage).
    pub fn public(&self) -> &HybridPublicKey {
        self.keypair.public()
    }
}

impl std::fmt::Debug for PrekeySecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrekeySecrets").field("prekey_id", &self.prekey_id).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn generated_bundle_verifies() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let (_, bundle) = PrekeySecrets::generate(&mut OsRng, 7, &identity, 1_000);
        bundle.verify(&identity.public()).unwrap();
    }

    #[test]
    fn wrong_identity_rejects_bundle() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let other = IdentityKeyPair::generate(&mut OsRng);
        let (_, bundle) = PrekeySecrets::generate(&mut OsRng, 7, &identity, 1_000);
        assert_eq!(bundle.verify(&other.public()), Err(PrekeyError::BadSignature));
    }

    #[test]
    fn tampered_prekey_id_rejects_bundle() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let (_, mut bundle) = PrekeySecrets::generate(&mut OsRng, 7, &identity, 1_000);
        bundle.prekey_id = 8;
        assert_eq!(bundle.verify(&identity.public()), Err(PrekeyError::BadSignature));
    }

    #[test]
    fn tampered_kem_key_rejects_bundle() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let (_, mut bundle) = PrekeySecrets::generate(&mut OsRng, 7, &identity, 1_000);
        bundle.public.ml_kem[0] ^= 0xFF;
        assert_eq!(bundle.verify(&identity.public()), Err(PrekeyError::BadSignature));
    }

    #[test]
    fn expiry_window() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let (_, bundle) = PrekeySecrets::generate(&mut OsRng, 1, &identity, 1_000);
        assert!(!bundle.is_expired(1_000 + PREKEY_MAX_AGE_SECS, PREKEY_MAX_AGE_SECS));
        assert!(bundle.is_expired(1_001 + PREKEY_MAX_AGE_SECS, PREKEY_MAX_AGE_SECS));
    }

    #[test]
    fn stored_secrets_round_trip() {
        let identity = IdentityKeyPair::generate(&mut OsRng);
        let (secrets, bundle) = PrekeySecrets::generate(&mut OsRng, 3, &identity, 1_000);
        let (x_secret, kem_secret) = secrets.secret_bytes();
        let restored = PrekeySecrets::from_stored_bytes(
            3,
            x_secret,
            &kem_secret,
            bundle.public.ml_kem.clone(),
        )
        .unwrap();
        assert_eq!(restored.public(), &bundle.public);
    }
}
