//! Symmetric chain ratchet and the skipped-key cache.

use std::collections::{HashMap, VecDeque};

use zeroize::Zeroize;

use crate::kdf;

/// Maximum lookahead for out-of-order messages, in skipped counters.
///
/// A counter gap larger than this is a protocol violation and the frame
/// is dropped rather than derived.
pub const MAX_SKIP: u32 = 1000;

/// Label advancing a chain key to its message key.
const MSG_LABEL: &[u8] = b"msg";

/// Label advancing a chain key to the next chain key.
const CHAIN_LABEL: &[u8] = b"chain";

/// A single-use message key.
///
/// Consumed by exactly one AEAD operation; the bytes are zeroized when
/// the value drops.
pub struct MessageKey {
    key: [u8; 32],
    counter: u32,
}

impl MessageKey {
    /// Key bytes for the AEAD.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.key
    }

    /// Position of this key within its chain.
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl Drop for MessageKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for MessageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKey").field("counter", &self.counter).finish_non_exhaustive()
    }
}

/// One direction's hash chain.
///
/// Advancing derives the message key, then replaces the chain key with
/// its successor and wipes the predecessor. There is no way back: the
/// state held after message k cannot reproduce any key for messages
/// before k.
pub struct ChainRatchet {
    chain_key: [u8; 32],
    next: u32,
}

impl ChainRatchet {
    /// Start a chain from a derived chain key.
    pub fn new(chain_key: [u8; 32]) -> Self {
        Self { chain_key, next: 0 }
    }

    /// Rebuild a chain mid-stream. Tests use this to place a chain near
    /// the counter ceiling without walking it there.
    #[cfg(test)]
    pub(crate) fn resume(chain_key: [u8; 32], next: u32) -> Self {
        Self { chain_key, next }
    }

    /// Derive the next message key and step the chain.
    pub fn advance(&mut self) -> MessageKey {
        let key = kdf::expand_key(&self.chain_key, MSG_LABEL);
        let counter = self.next;
        let mut successor = kdf::expand_key(&self.chain_key, CHAIN_LABEL);
        self.chain_key.copy_from_slice(&successor);
        successor.zeroize();
        self.next += 1;
        MessageKey { key, counter }
    }

    /// Counter the next [`ChainRatchet::advance`] call will assign.
    pub fn next_counter(&self) -> u32 {
        self.next
    }
}

impl Drop for ChainRatchet {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

impl std::fmt::Debug for ChainRatchet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRatchet").field("next", &self.next).finish_non_exhaustive()
    }
}

/// Bounded cache of message keys derived for not-yet-arrived frames.
///
/// Keys are stored under `(generation, counter)` so entries from before
/// a DH ratchet step stay retrievable until evicted. Eviction is
/// oldest-first and zeroizes the evicted key.
pub struct SkippedKeyCache {
    keys: HashMap<(u32, u32), [u8; 32]>,
    order: VecDeque<(u32, u32)>,
    capacity: usize,
}

impl SkippedKeyCache {
    /// Create a cache holding at most `capacity` keys.
    pub fn new(capacity: usize) -> Self {
        Self { keys: HashMap::new(), order: VecDeque::new(), capacity }
    }

    /// Store a derived key for a frame that has not arrived yet.
    pub fn insert(&mut self, generation: u32, key: MessageKey) {
        if self.capacity == 0 {
            return;
        }
        while self.keys.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            if let Some(mut evicted) = self.keys.remove(&oldest) {
                evicted.zeroize();
            }
        }
        let slot = (generation, key.counter());
        self.keys.insert(slot, *key.as_bytes());
        self.order.push_back(slot);
    }

    /// Remove and return the key for `(generation, counter)`, if cached.
    pub fn take(&mut self, generation: u32, counter: u32) -> Option<MessageKey> {
        let key = self.keys.remove(&(generation, counter))?;
        self.order.retain(|slot| *slot != (generation, counter));
        Some(MessageKey { key, counter })
    }

    /// Number of cached keys.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl Drop for SkippedKeyCache {
    fn drop(&mut self) {
        for (_, key) in self.keys.iter_mut() {
            key.zeroize();
        }
    }
}

impl std::fmt::Debug for SkippedKeyCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SkippedKeyCache")
            .field("len", &self.keys.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_assigns_sequential_counters() {
        let mut chain = ChainRatchet::new([1u8; 32]);
        for expected in 0..10 {
            assert_eq!(chain.advance().counter(), expected);
        }
    }

    #[test]
    fn message_keys_are_all_distinct() {
        let mut chain = ChainRatchet::new([1u8; 32]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            assert!(seen.insert(*chain.advance().as_bytes()));
        }
    }

    #[test]
    fn identical_chains_stay_in_lockstep() {
        let mut a = ChainRatchet::new([9u8; 32]);
        let mut b = ChainRatchet::new([9u8; 32]);
        for _ in 0..20 {
            assert_eq!(a.advance().as_bytes(), b.advance().as_bytes());
        }
    }

    #[test]
    fn advanced_chain_cannot_reproduce_earlier_keys() {
        // Forward secrecy within the chain: after k0 is consumed, the
        // surviving state only ever yields later keys.
        let mut chain = ChainRatchet::new([5u8; 32]);
        let k0 = *chain.advance().as_bytes();
        let k1 = *chain.advance().as_bytes();
        let k2 = *chain.advance().as_bytes();
        assert_ne!(k0, k1);
        assert_ne!(k1, k2);
        assert_ne!(k0, k2);
    }

    #[test]
    fn cache_round_trip() {
        let mut cache = SkippedKeyCache::new(16);
        let mut chain = ChainRatchet::new([3u8; 32]);
        let key = chain.advance();
        let bytes = *key.as_bytes();
        cache.insert(0, key);
        let recovered = cache.take(0, 0).unwrap();
        assert_eq!(recovered.as_bytes(), &bytes);
        assert!(cache.take(0, 0).is_none());
    }

    #[test]
    fn cache_evicts_oldest_first() {
        let mut cache = SkippedKeyCache::new(2);
        let mut chain = ChainRatchet::new([3u8; 32]);
        for _ in 0..3 {
            cache.insert(0, chain.advance());
        }
        assert_eq!(cache.len(), 2);
        assert!(cache.take(0, 0).is_none());
        assert!(cache.take(0, 1).is_some());
        assert!(cache.take(0, 2).is_some());
    }

    #[test]
    fn generations_do_not_collide() {
        let mut cache = SkippedKeyCache::new(16);
        let mut chain = ChainRatchet::new([3u8; 32]);
        cache.insert(0, chain.advance());
        let mut other = ChainRatchet::new([4u8; 32]);
        cache.insert(1, other.advance());
        assert!(cache.take(0, 0).is_some());
        assert!(cache.take(1, 0).is_some());
    }
}
