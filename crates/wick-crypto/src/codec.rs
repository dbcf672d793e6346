//! Authenticated frame encryption.
//!
//! One codec instance is bound to the negotiated [`AlgorithmId`] and
//! encrypts or decrypts a single frame at a time given a key, a
//! reserved [`Nonce`], and associated data. Every suite is driven with
//! the same 96-bit nonce and yields a 128-bit tag, so callers never
//! branch on the algorithm.
//!
//! # Security
//!
//! - Decryption verifies the tag before any other processing; plaintext
//!   is never released on failure.
//! - Failures are opaque: [`CodecError::AuthenticationFailure`] carries
//!   no reason, so a bad tag is indistinguishable from any other
//!   internal decryption problem (no oracle leakage).

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm,
};
use chacha20poly1305::ChaCha20Poly1305;
use thiserror::Error;

use crate::{
    nonce::Nonce,
    suite::{AlgorithmId, KEY_LEN, TAG_LEN},
};

/// Errors from frame encryption and decryption.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The frame failed authentication. Deliberately opaque.
    #[error("authentication failed")]
    AuthenticationFailure,

    /// The negotiated algorithm has no compiled backend.
    #[error("algorithm {algorithm:?} not available in this build")]
    Unsupported {
        /// Algorithm that cannot be dispatched
        algorithm: AlgorithmId,
    },
}

impl CodecError {
    /// Whether the session should treat this error as fatal.
    ///
    /// A single authentication failure drops one frame; deciding whether
    /// repeated failures indicate an attack is the caller's policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::AuthenticationFailure => false,
            Self::Unsupported { .. } => true,
        }
    }
}

/// Frame encryptor/decryptor bound to one negotiated suite.
#[derive(Debug, Clone, Copy)]
pub struct SymmetricCodec {
    algorithm: AlgorithmId,
}

impl SymmetricCodec {
    /// Bind a codec to the negotiated algorithm.
    pub fn new(algorithm: AlgorithmId) -> Self {
        Self { algorithm }
    }

    /// The algorithm this codec dispatches to.
    pub fn algorithm(&self) -> AlgorithmId {
        self.algorithm
    }

    /// Encrypt one frame.
    ///
    /// Returns ciphertext with the 16-byte tag appended. The nonce must
    /// come from [`crate::NonceState::reserve`] and is consumed by this
    /// call; reusing an issued `(direction, counter)` pair is a
    /// programming error the nonce layer exists to prevent.
    pub fn encrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &Nonce,
        associated_data: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        let payload = Payload { msg: plaintext, aad: associated_data };
        match self.algorithm {
            AlgorithmId::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.into());
                cipher
                    .encrypt(nonce.as_bytes().into(), payload)
                    .map_err(|_| CodecError::AuthenticationFailure)
            }
            AlgorithmId::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.into());
                cipher
                    .encrypt(nonce.as_bytes().into(), payload)
                    .map_err(|_| CodecError::AuthenticationFailure)
            }
            AlgorithmId::Aegis256 => aegis_encrypt(key, nonce, associated_data, plaintext),
        }
    }

    /// Decrypt one frame, verifying the tag first.
    ///
    /// # Errors
    ///
    /// [`CodecError::AuthenticationFailure`] on any verification or
    /// decryption problem; the variant is intentionally indivisible.
    pub fn decrypt(
        &self,
        key: &[u8; KEY_LEN],
        nonce: &Nonce,
        associated_data: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>, CodecError> {
        if ciphertext.len() < TAG_LEN {
            return Err(CodecError::AuthenticationFailure);
        }
        let payload = Payload { msg: ciphertext, aad: associated_data };
        match self.algorithm {
            AlgorithmId::Aes256Gcm => {
                let cipher = Aes256Gcm::new(key.into());
                cipher
                    .decrypt(nonce.as_bytes().into(), payload)
                    .map_err(|_| CodecError::AuthenticationFailure)
            }
            AlgorithmId::ChaCha20Poly1305 => {
                let cipher = ChaCha20Poly1305::new(key.into());
                cipher
                    .decrypt(nonce.as_bytes().into(), payload)
                    .map_err(|_| CodecError::AuthenticationFailure)
            }
            AlgorithmId::Aegis256 => aegis_decrypt(key, nonce, associated_data, ciphertext),
        }
    }
}

/// Expand the 96-bit frame nonce into AEGIS-256's native 256-bit nonce.
#[cfg(feature = "aegis")]
fn aegis_nonce(nonce: &Nonce) -> [u8; 32] {
    let mut wide = [0u8; 32];
    wide[..12].copy_from_slice(nonce.as_bytes());
    wide
}

#[cfg(feature = "aegis")]
fn aegis_encrypt(
    key: &[u8; KEY_LEN],
    nonce: &Nonce,
    associated_data: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    use aegis::aegis256::Aegis256;

    let wide = aegis_nonce(nonce);
    let (mut ciphertext, tag) = Aegis256::<TAG_LEN>::new(key, &wide).encrypt(plaintext, associated_data);
    ciphertext.extend_from_slice(tag.as_ref());
    Ok(ciphertext)
}

#[cfg(feature = "aegis")]
fn aegis_decrypt(
    key: &[u8; KEY_LEN],
    nonce: &Nonce,
    associated_data: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    use aegis::aegis256::Aegis256;

    let wide = aegis_nonce(nonce);
    let split = ciphertext.len().saturating_sub(TAG_LEN);
    let (body, tag_bytes) = ciphertext.split_at(split);
    let tag: [u8; TAG_LEN] =
        tag_bytes.try_into().map_err(|_| CodecError::AuthenticationFailure)?;
    Aegis256::<TAG_LEN>::new(key, &wide)
        .decrypt(body, &tag.into(), associated_data)
        .map_err(|_| CodecError::AuthenticationFailure)
}

#[cfg(not(feature = "aegis"))]
fn aegis_encrypt(
    _key: &[u8; KEY_LEN],
    _nonce: &Nonce,
    _associated_data: &[u8],
    _plaintext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unsupported { algorithm: AlgorithmId::Aegis256 })
}

#[cfg(not(feature = "aegis"))]
fn aegis_decrypt(
    _key: &[u8; KEY_LEN],
    _nonce: &Nonce,
    _associated_data: &[u8],
    _ciphertext: &[u8],
) -> Result<Vec<u8>, CodecError> {
    Err(CodecError::Unsupported { algorithm: AlgorithmId::Aegis256 })
}

#[cfg(test)]
mod tests {
    use crate::nonce::Direction;

    use super::*;

    fn test_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        for (i, byte) in key.iter_mut().enumerate() {
            *byte = i as u8;
        }
        key
    }

    fn suites() -> Vec<AlgorithmId> {
        let mut suites = vec![AlgorithmId::Aes256Gcm, AlgorithmId::ChaCha20Poly1305];
        if cfg!(feature = "aegis") {
            suites.push(AlgorithmId::Aegis256);
        }
        suites
    }

    #[test]
    fn roundtrip_all_suites() {
        for suite in suites() {
            let codec = SymmetricCodec::new(suite);
            let nonce = Nonce::new(Direction::Sender, 0);
            let frame = codec.encrypt(&test_key(), &nonce, b"aad", b"hello").unwrap();
            let plaintext = codec.decrypt(&test_key(), &nonce, b"aad", &frame).unwrap();
            assert_eq!(plaintext, b"hello");
        }
    }

    #[test]
    fn ciphertext_carries_full_tag() {
        let codec = SymmetricCodec::new(AlgorithmId::Aes256Gcm);
        let nonce = Nonce::new(Direction::Sender, 1);
        let frame = codec.encrypt(&test_key(), &nonce, b"", b"payload").unwrap();
        assert_eq!(frame.len(), b"payload".len() + TAG_LEN);
    }

    #[test]
    fn every_bit_flip_fails_authentication() {
        let codec = SymmetricCodec::new(AlgorithmId::ChaCha20Poly1305);
        let nonce = Nonce::new(Direction::Sender, 7);
        let frame = codec.encrypt(&test_key(), &nonce, b"aad", b"sensitive").unwrap();

        for byte_index in 0..frame.len() {
            for bit in 0..8 {
                let mut tampered = frame.clone();
                tampered[byte_index] ^= 1 << bit;
                let result = codec.decrypt(&test_key(), &nonce, b"aad", &tampered);
                assert_eq!(result, Err(CodecError::AuthenticationFailure));
            }
        }
    }

    #[test]
    fn wrong_aad_fails_authentication() {
        let codec = SymmetricCodec::new(AlgorithmId::Aes256Gcm);
        let nonce = Nonce::new(Direction::Receiver, 3);
        let frame = codec.encrypt(&test_key(), &nonce, b"header-a", b"body").unwrap();
        let result = codec.decrypt(&test_key(), &nonce, b"header-b", &frame);
        assert_eq!(result, Err(CodecError::AuthenticationFailure));
    }

    #[test]
    fn wrong_nonce_fails_authentication() {
        let codec = SymmetricCodec::new(AlgorithmId::Aes256Gcm);
        let frame = codec
            .encrypt(&test_key(), &Nonce::new(Direction::Sender, 0), b"", b"body")
            .unwrap();
        let result =
            codec.decrypt(&test_key(), &Nonce::new(Direction::Receiver, 0), b"", &frame);
        assert_eq!(result, Err(CodecError::AuthenticationFailure));
    }

    #[test]
    fn truncated_frame_is_opaque_failure() {
        let codec = SymmetricCodec::new(AlgorithmId::Aes256Gcm);
        let nonce = Nonce::new(Direction::Sender, 0);
        let result = codec.decrypt(&test_key(), &nonce, b"", &[0u8; 4]);
        assert_eq!(result, Err(CodecError::AuthenticationFailure));
    }

    #[cfg(not(feature = "aegis"))]
    #[test]
    fn aegis_without_backend_is_unsupported() {
        let codec = SymmetricCodec::new(AlgorithmId::Aegis256);
        let nonce = Nonce::new(Direction::Sender, 0);
        let result = codec.encrypt(&test_key(), &nonce, b"", b"x");
        assert!(matches!(result, Err(CodecError::Unsupported { .. })));
    }
}
