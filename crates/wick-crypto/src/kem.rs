//! Hybrid key agreement: ML-KEM-768 plus X25519.
//!
//! Both components run on every encapsulation; the handshake combines
//! their outputs through HKDF so the result is secure as long as either
//! primitive holds. Randomness is drawn through caller-provided RNGs so
//! tests can be deterministic.

use ml_kem::{
    kem::{Decapsulate as _, DecapsulationKey, EncapsulationKey},
    Ciphertext, EncapsulateDeterministic as _, Encoded, EncodedSizeUser as _, KemCore as _,
    MlKem768, MlKem768Params, B32,
};
use rand_core::{CryptoRng, RngCore};
use thiserror::Error;
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::Zeroize;

/// ML-KEM-768 encapsulation key length in bytes.
pub const ML_KEM_PUBLIC_LEN: usize = 1184;

/// ML-KEM-768 decapsulation key length in bytes.
pub const ML_KEM_SECRET_LEN: usize = 2400;

/// ML-KEM-768 ciphertext length in bytes.
pub const ML_KEM_CIPHERTEXT_LEN: usize = 1088;

/// X25519 public key length in bytes.
pub const X25519_PUBLIC_LEN: usize = 32;

/// Errors from hybrid KEM operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KemError {
    /// A key or ciphertext had the wrong length or failed to parse.
    #[error("malformed {field}: expected {expected} bytes, got {actual}")]
    Malformed {
        /// Which input was malformed
        field: &'static str,
        /// Expected byte length
        expected: usize,
        /// Actual byte length
        actual: usize,
    },

    /// Encapsulation or decapsulation failed inside the KEM.
    #[error("key encapsulation failed")]
    KemFailure,
}

/// A 32-byte shared secret, zeroized on drop.
#[derive(Clone)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedSecret").field(&"<REDACTED>").finish()
    }
}

/// Public half of a hybrid keypair, as transported in prekey bundles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridPublicKey {
    /// X25519 public key bytes.
    pub x25519: [u8; X25519_PUBLIC_LEN],
    /// ML-KEM-768 encapsulation key bytes.
    pub ml_kem: Vec<u8>,
}

impl HybridPublicKey {
    /// Validate lengths and construct from raw bytes.
    pub fn from_bytes(x25519: [u8; X25519_PUBLIC_LEN], ml_kem: Vec<u8>) -> Result<Self, KemError> {
        if ml_kem.len() != ML_KEM_PUBLIC_LEN {
            return Err(KemError::Malformed {
                field: "ml-kem public key",
                expected: ML_KEM_PUBLIC_LEN,
                actual: ml_kem.len(),
            });
        }
        Ok(Self { x25519, ml_kem })
    }

    fn encapsulation_key(&self) -> Result<EncapsulationKey<MlKem768Params>, KemError> {
        let encoded = Encoded::<EncapsulationKey<MlKem768Params>>::try_from(self.ml_kem.as_slice())
            .map_err(|_| KemError::Malformed {
                field: "ml-kem public key",
                expected: ML_KEM_PUBLIC_LEN,
                actual: self.ml_kem.len(),
            })?;
        Ok(EncapsulationKey::from_bytes(&encoded))
    }
}

/// Full hybrid keypair held by the party that published the public half.
pub struct HybridKeyPair {
    x25519_secret: StaticSecret,
    ml_kem_secret: DecapsulationKey<MlKem768Params>,
    public: HybridPublicKey,
}

impl HybridKeyPair {
    /// Generate a fresh hybrid keypair from the provided RNG.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let x25519_secret = StaticSecret::random_from_rng(&mut *rng);
        let x25519_public = X25519Public::from(&x25519_secret);

        let mut d = [0u8; 32];
        let mut z = [0u8; 32];
        rng.fill_bytes(&mut d);
        rng.fill_bytes(&mut z);
        let (ml_kem_secret, ml_kem_public) =
            MlKem768::generate_deterministic(&B32::from(d), &B32::from(z));
        d.zeroize();
        z.zeroize();

        let public = HybridPublicKey {
            x25519: *x25519_public.as_bytes(),
            ml_kem: ml_kem_public.as_bytes().to_vec(),
        };
        Self { x25519_secret, ml_kem_secret, public }
    }

    /// Rebuild a keypair from stored secret and public bytes.
    ///
    /// The encapsulation key is carried separately because the encoded
    /// decapsulation key does not expose it.
    pub fn from_stored_bytes(
        x25519_secret: [u8; 32],
        ml_kem_secret: &[u8],
        ml_kem_public: Vec<u8>,
    ) -> Result<Self, KemError> {
        let encoded = Encoded::<DecapsulationKey<MlKem768Params>>::try_from(ml_kem_secret)
            .map_err(|_| KemError::Malformed {
                field: "ml-kem secret key",
                expected: ML_KEM_SECRET_LEN,
                actual: ml_kem_secret.len(),
            })?;
        let ml_kem_secret = DecapsulationKey::from_bytes(&encoded);
        let x25519_secret = StaticSecret::from(x25519_secret);
        let x25519_public = X25519Public::from(&x25519_secret);
        let public = HybridPublicKey::from_bytes(*x25519_public.as_bytes(), ml_kem_public)?;
        Ok(Self { x25519_secret, ml_kem_secret, public })
    }

    /// Public half for publication.
    pub fn public(&self) -> &HybridPublicKey {
        &self.public
    }

    /// Serialized secret halves `(x25519, ml_kem)` for persistence.
    pub fn secret_bytes(&self) -> ([u8; 32], Vec<u8>) {
        (self.x25519_secret.to_bytes(), self.ml_kem_secret.as_bytes().to_vec())
    }

    /// Classical DH against a peer's X25519 public key.
    pub fn diffie_hellman(&self, their_public: &[u8; X25519_PUBLIC_LEN]) -> SharedSecret {
        let shared = self.x25519_secret.diffie_hellman(&X25519Public::from(*their_public));
        SharedSecret(shared.to_bytes())
    }

    /// Decapsulate the ML-KEM component of a hybrid ciphertext.
    pub fn decapsulate(&self, ciphertext: &HybridCiphertext) -> Result<SharedSecret, KemError> {
        let ct = Ciphertext::<MlKem768>::try_from(ciphertext.ml_kem.as_slice()).map_err(|_| {
            KemError::Malformed {
                field: "ml-kem ciphertext",
                expected: ML_KEM_CIPHERTEXT_LEN,
                actual: ciphertext.ml_kem.len(),
            }
        })?;
        let shared = self.ml_kem_secret.decapsulate(&ct).map_err(|_| KemError::KemFailure)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(shared.as_slice());
        Ok(SharedSecret(bytes))
    }
}

impl std::fmt::Debug for HybridKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridKeyPair").field("public", &self.public).finish_non_exhaustive()
    }
}

/// Hybrid ciphertext: ML-KEM ciphertext plus the ephemeral X25519 key
/// that the encapsulating side used for its DH component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HybridCiphertext {
    /// ML-KEM-768 ciphertext bytes.
    pub ml_kem: Vec<u8>,
    /// Ephemeral X25519 public key of the encapsulating side.
    pub x25519_ephemeral: [u8; X25519_PUBLIC_LEN],
}

/// Output of [`encapsulate`]: the wire ciphertext plus both local secrets.
pub struct Encapsulation {
    /// Ciphertext to transmit.
    pub ciphertext: HybridCiphertext,
    /// ML-KEM shared secret.
    pub ml_kem_shared: SharedSecret,
    /// X25519 shared secret from the ephemeral exchange.
    pub x25519_shared: SharedSecret,
    /// Ephemeral X25519 secret, retained for a second DH if the
    /// protocol requires one (the handshake does).
    pub x25519_ephemeral_secret: StaticSecret,
}

/// Encapsulate to a peer's hybrid public key.
///
/// Runs an ML-KEM-768 encapsulation and a fresh ephemeral X25519
/// exchange against the peer's static key.
pub fn encapsulate(
    rng: &mut (impl RngCore + CryptoRng),
    peer: &HybridPublicKey,
) -> Result<Encapsulation, KemError> {
    let ek = peer.encapsulation_key()?;
    let mut m = [0u8; 32];
    rng.fill_bytes(&mut m);
    let (ct, shared) = ek
        .encapsulate_deterministic(&B32::from(m))
        .map_err(|_| KemError::KemFailure)?;
    m.zeroize();

    let mut ml_kem_shared = [0u8; 32];
    ml_kem_shared.copy_from_slice(shared.as_slice());

    let ephemeral = StaticSecret::random_from_rng(&mut *rng);
    let ephemeral_public = X25519Public::from(&ephemeral);
    let dh = ephemeral.diffie_hellman(&X25519Public::from(peer.x25519));

    Ok(Encapsulation {
        ciphertext: HybridCiphertext {
            ml_kem: AsRef::<[u8]>::as_ref(&ct).to_vec(),
            x25519_ephemeral: *ephemeral_public.as_bytes(),
        },
        ml_kem_shared: SharedSecret(ml_kem_shared),
        x25519_shared: SharedSecret(dh.to_bytes()),
        x25519_ephemeral_secret: ephemeral,
    })
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn encapsulate_decapsulate_roundtrip() {
        let keypair = HybridKeyPair::generate(&mut OsRng);
        let encap = encapsulate(&mut OsRng, keypair.public()).unwrap();
        let decapped = keypair.decapsulate(&encap.ciphertext).unwrap();
        assert_eq!(encap.ml_kem_shared.as_bytes(), decapped.as_bytes());
    }

    #[test]
    fn dh_agrees_both_ways() {
        let alice = HybridKeyPair::generate(&mut OsRng);
        let bob = HybridKeyPair::generate(&mut OsRng);
        let ab = alice.diffie_hellman(&bob.public().x25519);
        let ba = bob.diffie_hellman(&alice.public().x25519);
        assert_eq!(ab.as_bytes(), ba.as_bytes());
    }

    #[test]
    fn secret_bytes_round_trip() {
        let keypair = HybridKeyPair::generate(&mut OsRng);
        let (x_secret, kem_secret) = keypair.secret_bytes();
        let restored = HybridKeyPair::from_stored_bytes(
            x_secret,
            &kem_secret,
            keypair.public().ml_kem.clone(),
        )
        .unwrap();
        assert_eq!(keypair.public(), restored.public());

        let encap = encapsulate(&mut OsRng, keypair.public()).unwrap();
        let decapped = restored.decapsulate(&encap.ciphertext).unwrap();
        assert_eq!(encap.ml_kem_shared.as_bytes(), decapped.as_bytes());
    }

    #[test]
    fn wrong_length_public_key_is_rejected() {
        let result = HybridPublicKey::from_bytes([0u8; 32], vec![0u8; 100]);
        assert!(matches!(result, Err(KemError::Malformed { .. })));
    }

    #[test]
    fn wrong_length_ciphertext_is_rejected() {
        let keypair = HybridKeyPair::generate(&mut OsRng);
        let bogus = HybridCiphertext { ml_kem: vec![0u8; 10], x25519_ephemeral: [0u8; 32] };
        assert!(matches!(keypair.decapsulate(&bogus), Err(KemError::Malformed { .. })));
    }

    #[test]
    fn public_key_sizes() {
        let keypair = HybridKeyPair::generate(&mut OsRng);
        assert_eq!(keypair.public().ml_kem.len(), ML_KEM_PUBLIC_LEN);
        let encap = encapsulate(&mut OsRng, keypair.public()).unwrap();
        assert_eq!(encap.ciphertext.ml_kem.len(), ML_KEM_CIPHERTEXT_LEN);
    }
}
