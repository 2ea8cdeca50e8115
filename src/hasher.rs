//! Seeded key hashing.
//!
//! Each cache instance draws a fresh random seed, so the same key lands in
//! different buckets in different caches and an attacker cannot precompute
//! colliding keys for a running process.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;

use ahash::RandomState;

/// Per-instance seeded hash function over `K`.
pub struct Hasher<K> {
    state: RandomState,
    _key: PhantomData<fn(&K)>,
}

impl<K: Hash> Hasher<K> {
    /// Creates a hasher with a process-random seed.
    pub fn new() -> Self {
        Self {
            state: RandomState::new(),
            _key: PhantomData,
        }
    }

    #[inline]
    pub fn hash(&self, key: &K) -> u64 {
        self.state.hash_one(key)
    }
}

impl<K: Hash> Default for Hasher<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for Hasher<K> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            _key: PhantomData,
        }
    }
}

impl<K> fmt::Debug for Hasher<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hasher").finish_non_exhaustive()
    }
}
