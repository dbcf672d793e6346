//! Long-term Ed25519 identity keys.
//!
//! One identity per device, created at first run and persisted; never
//! rotated automatically. The identity signs prekey bundles and
//! mid-session rekey announcements, binding them to the device.

use ed25519_dalek::{Signature, Signer as _, SigningKey, VerifyingKey};
use rand_core::{CryptoRng, RngCore};
use subtle::ConstantTimeEq as _;
use thiserror::Error;

/// Ed25519 public key length in bytes.
pub const IDENTITY_PUBLIC_LEN: usize = 32;

/// Ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Errors from identity key handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdentityError {
    /// Public key bytes do not describe a valid Ed25519 point.
    #[error("invalid identity public key")]
    InvalidPublicKey,

    /// Signature verification failed.
    #[error("identity signature verification failed")]
    BadSignature,
}

/// Public identity key of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentityPublicKey {
    bytes: [u8; IDENTITY_PUBLIC_LEN],
}

impl IdentityPublicKey {
    /// Wrap raw public key bytes, validating the encoding.
    pub fn from_bytes(bytes: [u8; IDENTITY_PUBLIC_LEN]) -> Result<Self, IdentityError> {
        // Reject bytes that cannot be decompressed to a curve point now,
        // so later verification failures always mean a bad signature.
        VerifyingKey::from_bytes(&bytes).map_err(|_| IdentityError::InvalidPublicKey)?;
        Ok(Self { bytes })
    }

    /// Raw public key bytes.
    pub fn as_bytes(&self) -> &[u8; IDENTITY_PUBLIC_LEN] {
        &self.bytes
    }

    /// Constant-time equality with another identity key.
    ///
    /// Used for trust-on-first-use pinning checks where a timing oracle
    /// on the comparison would leak how much of the key matched.
    pub fn ct_eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }

    /// Verify a signature over `message` with domain separation.
    ///
    /// The domain label is prepended to the message so signatures from
    /// one context can never be replayed in another.
    pub fn verify(
        &self,
        label: &[u8],
        message: &[u8],
        signature: &[u8; SIGNATURE_LEN],
    ) -> Result<(), IdentityError> {
        let Ok(key) = VerifyingKey::from_bytes(&self.bytes) else {
            return Err(IdentityError::InvalidPublicKey);
        };
        let mut bound = Vec::with_capacity(label.len() + message.len());
        bound.extend_from_slice(label);
        bound.extend_from_slice(message);
        key.verify_strict(&bound, &Signature::from_bytes(signature))
            .map_err(|_| IdentityError::BadSignature)
    }
}

/// Long-term signing keypair for this device.
pub struct IdentityKeyPair {
    signing: SigningKey,
}

impl IdentityKeyPair {
    /// Generate a fresh identity.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        let signing = SigningKey::from_bytes(&seed);
        // SigningKey keeps its own copy; wipe ours.
        use zeroize::Zeroize as _;
        seed.zeroize();
        Self { signing }
    }

    /// Rebuild from a persisted 32-byte seed.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self { signing: SigningKey::from_bytes(seed) }
    }

    /// Persistable 32-byte seed.
    pub fn seed(&self) -> [u8; 32] {
        self.signing.to_bytes()
    }

    /// Public half of this identity.
    pub fn public(&self) -> IdentityPublicKey {
        IdentityPublicKey { bytes: self.signing.verifying_key().to_bytes() }
    }

    /// Sign `message` under a domain label.
    pub fn sign(&self, label: &[u8], message: &[u8]) -> [u8; SIGNATURE_LEN] {
        let mut bound = Vec::with_capacity(label.len() + message.len());
        bound.extend_from_slice(label);
        bound.extend_from_slice(message);
        self.signing.sign(&bound).to_bytes()
    }
}

impl std::fmt::Debug for IdentityKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityKeyPair").field("public", &self.public()).finish_non_exhaustive()
    }
}
