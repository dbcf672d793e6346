//! Room secret and per-sender key derivation.

use rand_core::{CryptoRng, RngCore};
use wick_crypto::{domain, kdf};
use zeroize::Zeroize;

/// Domain label for sender key derivation.
///
/// The sender identifier is appended in big-endian, so every member of
/// an epoch derives a distinct key from the same room secret.
pub const SENDER_KEY_INFO: &[u8] = b"PQC-HKDF-AES-256-SENDER";

/// The shared secret of one room epoch.
///
/// Created fresh when a room is opened and replaced on every rotation.
/// Zeroized on drop.
#[derive(Clone)]
pub struct RoomSecret([u8; 32]);

impl RoomSecret {
    /// Generate a fresh secret.
    pub fn generate(rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap secret bytes received over a pairwise session.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw bytes, for sealed distribution to members.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the successor secret for an epoch rotation.
    ///
    /// The old secret salts the derivation and fresh randomness is the
    /// input keying material, so a removed member holding the old secret
    /// still cannot compute the successor.
    pub fn rotate(&self, rng: &mut (impl RngCore + CryptoRng)) -> Self {
        let mut entropy = [0u8; 32];
        rng.fill_bytes(&mut entropy);
        let next = kdf::derive_key(Some(&self.0), &entropy, domain::ROOM_ROTATE);
        entropy.zeroize();
        Self(next)
    }

    /// Derive one member's sender key.
    pub fn sender_key(&self, sender: u64) -> SenderKey {
        let mut info = [0u8; SENDER_KEY_INFO.len() + 8];
        info[..SENDER_KEY_INFO.len()].copy_from_slice(SENDER_KEY_INFO);
        info[SENDER_KEY_INFO.len()..].copy_from_slice(&sender.to_be_bytes());
        SenderKey(kdf::derive_key(None, &self.0, &info))
    }
}

impl Drop for RoomSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for RoomSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("RoomSecret").field(&"<REDACTED>").finish()
    }
}

/// One member's symmetric key within an epoch.
///
/// Derived on demand and zeroized on drop; never persisted.
pub struct SenderKey([u8; 32]);

impl SenderKey {
    /// Key bytes for the AEAD.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl Drop for SenderKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for SenderKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SenderKey").field(&"<REDACTED>").finish()
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn sender_keys_are_deterministic() {
        let secret = RoomSecret::from_bytes([7u8; 32]);
        assert_eq!(secret.sender_key(1).as_bytes(), secret.sender_key(1).as_bytes());
    }

    #[test]
    fn sender_keys_differ_per_member() {
        let secret = RoomSecret::from_bytes([7u8; 32]);
        assert_ne!(secret.sender_key(1).as_bytes(), secret.sender_key(2).as_bytes());
    }

    #[test]
    fn rotation_changes_every_sender_key() {
        let secret = RoomSecret::from_bytes([7u8; 32]);
        let rotated = secret.rotate(&mut OsRng);
        assert_ne!(secret.as_bytes(), rotated.as_bytes());
        assert_ne!(secret.sender_key(1).as_bytes(), rotated.sender_key(1).as_bytes());
    }

    #[test]
    fn rotations_are_not_reproducible_from_the_old_secret() {
        // Two rotations of the same secret diverge: fresh entropy, not a
        // deterministic successor a removed member could compute.
        let secret = RoomSecret::from_bytes([7u8; 32]);
        let a = secret.rotate(&mut OsRng);
        let b = secret.rotate(&mut OsRng);
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
