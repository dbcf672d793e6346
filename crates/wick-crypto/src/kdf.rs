//! HKDF-SHA256 helpers.
//!
//! Thin wrappers fixing the output length at 32 bytes, which is the only
//! key size this protocol uses. Callers supply a domain label from
//! [`crate::domain`].

use hkdf::Hkdf;
use sha2::Sha256;

/// Derive a 32-byte key from input key material under a domain label.
///
/// Extract-then-expand with an optional salt. Deterministic: the same
/// `(salt, ikm, info)` triple always produces the same output.
pub fn derive_key(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; 32] {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);
    let mut okm = [0u8; 32];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

/// Expand an existing 32-byte pseudorandom key under a domain label.
///
/// Used where the input is already uniform (chain keys, root keys) and
/// the extract step would be redundant.
pub fn expand_key(prk: &[u8; 32], info: &[u8]) -> [u8; 32] {
    let Ok(hkdf) = Hkdf::<Sha256>::from_prk(prk) else {
        unreachable!("32-byte PRK is always valid for HKDF-SHA256");
    };
    let mut okm = [0u8; 32];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = derive_key(Some(b"salt"), b"ikm", b"info");
        let b = derive_key(Some(b"salt"), b"ikm", b"info");
        assert_eq!(a, b);
    }

    #[test]
    fn different_labels_produce_different_keys() {
        let a = derive_key(None, b"ikm", b"label-a");
        let b = derive_key(None, b"ikm", b"label-b");
        assert_ne!(a, b);
    }

    #[test]
    fn different_salts_produce_different_keys() {
        let a = derive_key(Some(b"salt-a"), b"ikm", b"info");
        let b = derive_key(Some(b"salt-b"), b"ikm", b"info");
        assert_ne!(a, b);
    }

    #[test]
    fn expand_differs_from_derive() {
        let prk = [7u8; 32];
        let expanded = expand_key(&prk, b"info");
        let derived = derive_key(None, &prk, b"info");
        assert_ne!(expanded, derived);
    }

    proptest! {
        #[test]
        fn distinct_labels_never_collide(ikm in any::<[u8; 32]>()) {
            let a = derive_key(None, &ikm, b"wick.test.a.v1");
            let b = derive_key(None, &ikm, b"wick.test.b.v1");
            prop_assert_ne!(a, b);
        }

        #[test]
        fn expansion_labels_separate_chains(prk in any::<[u8; 32]>()) {
            prop_assert_ne!(expand_key(&prk, b"msg"), expand_key(&prk, b"chain"));
        }
    }
}
