//! Published prekey store with snapshot reads.
//!
//! The store is read-mostly: every inbound handshake looks up a prekey,
//! while rotation happens on a slow timer. Readers therefore take an
//! immutable [`PrekeySnapshot`] behind an `Arc` and never contend with
//! the single rotating writer; a rotation swaps in a whole new snapshot.
//!
//! Until the first initialization completes, lookups fail with the typed
//! [`SessionError::NotReady`] rather than a panic or a silent empty
//! result, so callers can distinguish "still publishing" from "unknown
//! prekey".

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use rand_core::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;
use wick_crypto::{
    prekey::PREKEY_MAX_AGE_SECS, IdentityKeyPair, PrekeySecrets, SignedPrekeyBundle,
};

use crate::error::SessionError;

/// Immutable view of the published prekeys at one point in time.
#[derive(Debug)]
pub struct PrekeySnapshot {
    bundles: Vec<SignedPrekeyBundle>,
    secrets: HashMap<u32, Arc<PrekeySecrets>>,
}

impl PrekeySnapshot {
    /// All currently published bundles.
    pub fn bundles(&self) -> &[SignedPrekeyBundle] {
        &self.bundles
    }

    /// The most recently generated bundle, the one handed to new
    /// initiators.
    pub fn newest(&self) -> Option<&SignedPrekeyBundle> {
        self.bundles.iter().max_by_key(|bundle| bundle.created_at)
    }

    /// Secret half for a prekey id, if still held.
    pub fn secrets(&self, prekey_id: u32) -> Option<Arc<PrekeySecrets>> {
        self.secrets.get(&prekey_id).cloned()
    }
}

struct Inner {
    snapshot: Option<Arc<PrekeySnapshot>>,
    next_prekey_id: u32,
}

/// Prekey store: snapshot reads, single-writer rotation.
pub struct PrekeyStore {
    inner: RwLock<Inner>,
}

impl PrekeyStore {
    /// Create an empty, not-yet-ready store.
    pub fn new() -> Self {
        Self { inner: RwLock::new(Inner { snapshot: None, next_prekey_id: 1 }) }
    }

    /// Generate and publish the first batch of prekeys.
    pub fn initialize(
        &self,
        rng: &mut (impl RngCore + CryptoRng),
        identity: &IdentityKeyPair,
        count: usize,
        now_secs: u64,
    ) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut bundles = Vec::with_capacity(count);
        let mut secrets = HashMap::with_capacity(count);
        for _ in 0..count {
            let prekey_id = guard.next_prekey_id;
            guard.next_prekey_id += 1;
            let (secret, bundle) = PrekeySecrets::generate(rng, prekey_id, identity, now_secs);
            bundles.push(bundle);
            secrets.insert(prekey_id, Arc::new(secret));
        }
        debug!(count, "prekey store initialized");
        guard.snapshot = Some(Arc::new(PrekeySnapshot { bundles, secrets }));
    }

    /// Drop expired prekeys and generate replacements.
    ///
    /// Sessions opened against a retired prekey keep their `Arc` to the
    /// secrets; the store merely stops answering new handshakes with it.
    pub fn rotate(
        &self,
        rng: &mut (impl RngCore + CryptoRng),
        identity: &IdentityKeyPair,
        now_secs: u64,
    ) -> Result<(), SessionError> {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let current = guard.snapshot.as_ref().map(Arc::clone).ok_or(SessionError::NotReady)?;

        let target = current.bundles.len();
        let mut bundles: Vec<SignedPrekeyBundle> = current
            .bundles
            .iter()
            .filter(|bundle| !bundle.is_expired(now_secs, PREKEY_MAX_AGE_SECS))
            .cloned()
            .collect();
        let mut secrets: HashMap<u32, Arc<PrekeySecrets>> = bundles
            .iter()
            .filter_map(|bundle| {
                current.secrets.get(&bundle.prekey_id).map(|s| (bundle.prekey_id, Arc::clone(s)))
            })
            .collect();

        let replaced = target.saturating_sub(bundles.len());
        for _ in bundles.len()..target {
            let prekey_id = guard.next_prekey_id;
            guard.next_prekey_id += 1;
            let (secret, bundle) = PrekeySecrets::generate(rng, prekey_id, identity, now_secs);
            bundles.push(bundle);
            secrets.insert(prekey_id, Arc::new(secret));
        }
        debug!(replaced, total = target, "prekey rotation complete");
        guard.snapshot = Some(Arc::new(PrekeySnapshot { bundles, secrets }));
        Ok(())
    }

    /// Take an immutable snapshot of the published prekeys.
    ///
    /// # Errors
    ///
    /// [`SessionError::NotReady`] before the first initialization.
    pub fn snapshot(&self) -> Result<Arc<PrekeySnapshot>, SessionError> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard.snapshot.as_ref().map(Arc::clone).ok_or(SessionError::NotReady)
    }

    /// Serialize the current prekeys as a CBOR record batch.
    pub fn export(&self) -> Result<Vec<u8>, SessionError> {
        let snapshot = self.snapshot()?;
        let records: Vec<PrekeyRecord> = snapshot
            .bundles
            .iter()
            .filter_map(|bundle| {
                snapshot.secrets.get(&bundle.prekey_id).map(|secret| {
                    let (x25519_secret, ml_kem_secret) = secret.secret_bytes();
                    PrekeyRecord {
                        prekey_id: bundle.prekey_id,
                        created_at: bundle.created_at,
                        signature: bundle.signature.to_vec(),
                        x25519_secret,
                        ml_kem_secret,
                        ml_kem_public: bundle.public.ml_kem.clone(),
                    }
                })
            })
            .collect();
        let mut bytes = Vec::new();
        ciborium::into_writer(&records, &mut bytes)
            .map_err(|err| SessionError::Storage(err.to_string()))?;
        Ok(bytes)
    }

    /// Restore prekeys from a previously exported record batch.
    pub fn import(&self, bytes: &[u8]) -> Result<(), SessionError> {
        let records: Vec<PrekeyRecord> =
            ciborium::from_reader(bytes).map_err(|err| SessionError::Storage(err.to_string()))?;

        let mut bundles = Vec::with_capacity(records.len());
        let mut secrets = HashMap::with_capacity(records.len());
        let mut highest_id = 0u32;
        for record in records {
            let secret = PrekeySecrets::from_stored_bytes(
                record.prekey_id,
                record.x25519_secret,
                &record.ml_kem_secret,
                record.ml_kem_public,
            )
            .map_err(|err| SessionError::Storage(err.to_string()))?;
            let signature: [u8; 64] = record
                .signature
                .as_slice()
                .try_into()
                .map_err(|_| SessionError::Storage("invalid signature length".to_string()))?;
            bundles.push(SignedPrekeyBundle {
                prekey_id: record.prekey_id,
                public: secret.public().clone(),
                created_at: record.created_at,
                signature,
            });
            highest_id = highest_id.max(record.prekey_id);
            secrets.insert(record.prekey_id, Arc::new(secret));
        }

        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.next_prekey_id = guard.next_prekey_id.max(highest_id + 1);
        guard.snapshot = Some(Arc::new(PrekeySnapshot { bundles, secrets }));
        Ok(())
    }
}

impl Default for PrekeyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PrekeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrekeyStore").finish_non_exhaustive()
    }
}

/// One prekey's persistence record.
#[derive(Serialize, Deserialize)]
struct PrekeyRecord {
    prekey_id: u32,
    created_at: u64,
    signature: Vec<u8>,
    x25519_secret: [u8; 32],
    ml_kem_secret: Vec<u8>,
    ml_kem_public: Vec<u8>,
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;

    use super::*;

    #[test]
    fn uninitialized_store_is_not_ready() {
        let store = PrekeyStore::new();
        assert!(matches!(store.snapshot(), Err(SessionError::NotReady)));
        let identity = IdentityKeyPair::generate(&mut OsRng);
        assert!(matches!(
            store.rotate(&mut OsRng, &identity, 1_000),
            Err(SessionError::NotReady)
        ));
    }

    #[test]
    fn initialize_publishes_verifiable_bundles() {
        let store = PrekeyStore::new();
        let identity = IdentityKeyPair::generate(&mut OsRng);
        store.initialize(&mut OsRng, &identity, 3, 1_000);
        let snapshot = store.snapshot().unwrap();
        assert_eq!(snapshot.bundles().len(), 3);
        for bundle in snapshot.bundles() {
            bundle.verify(&identity.public()).unwrap();
            assert!(snapshot.secrets(bundle.prekey_id).is_some());
        }
    }

    #[test]
    fn rotation_replaces_expired_prekeys() {
        let store = PrekeyStore::new();
        let identity = IdentityKeyPair::generate(&mut OsRng);
        store.initialize(&mut OsRng, &identity, 2, 1_000);
        let old = store.snapshot().unwrap();
        let old_ids: Vec<u32> = old.bundles().iter().map(|b| b.prekey_id).collect();

        // Far enough in the future that every bundle is expired.
        let later = 1_000 + PREKEY_MAX_AGE_SECS + 1;
        store.rotate(&mut OsRng, &identity, later).unwrap();
        let fresh = store.snapshot().unwrap();
        assert_eq!(fresh.bundles().len(), 2);
        for bundle in fresh.bundles() {
            assert!(!old_ids.contains(&bundle.prekey_id));
            assert_eq!(bundle.created_at, later);
        }
        // The old snapshot is still usable by in-flight handshakes.
        assert!(old.secrets(old_ids[0]).is_some());
    }

    #[test]
    fn rotation_keeps_unexpired_prekeys() {
        let store = PrekeyStore::new();
        let identity = IdentityKeyPair::generate(&mut OsRng);
        store.initialize(&mut OsRng, &identity, 2, 1_000);
        store.rotate(&mut OsRng, &identity, 2_000).unwrap();
        let snapshot = store.snapshot().unwrap();
        let ids: Vec<u32> = snapshot.bundles().iter().map(|b| b.prekey_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn newest_prefers_latest_rotation() {
        let store = PrekeyStore::new();
        let identity = IdentityKeyPair::generate(&mut OsRng);
        store.initialize(&mut OsRng, &identity, 1, 1_000);
        let later = 1_000 + PREKEY_MAX_AGE_SECS + 1;
        store.rotate(&mut OsRng, &identity, later).unwrap();
        assert_eq!(store.snapshot().unwrap().newest().map(|b| b.created_at), Some(later));
    }

    #[test]
    fn export_import_round_trip() {
        let store = PrekeyStore::new();
        let identity = IdentityKeyPair::generate(&mut OsRng);
        store.initialize(&mut OsRng, &identity, 2, 1_000);
        let exported = store.export().unwrap();

        let restored = PrekeyStore::new();
        restored.import(&exported).unwrap();
        let snapshot = restored.snapshot().unwrap();
        assert_eq!(snapshot.bundles().len(), 2);
        for bundle in snapshot.bundles() {
            bundle.verify(&identity.public()).unwrap();
        }

        // New ids continue past the imported ones.
        restored.initialize(&mut OsRng, &identity, 1, 2_000);
        let next = restored.snapshot().unwrap();
        assert!(next.bundles().iter().all(|b| b.prekey_id >= 3));
    }

    #[test]
    fn garbage_import_is_a_storage_error() {
        let store = PrekeyStore::new();
        assert!(matches!(store.import(&[0xFF, 0x01]), Err(SessionError::Storage(_))));
    }
}
