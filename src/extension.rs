//! Read-only inspection of a running cache.
//!
//! Everything here bypasses the usual accounting unless stated otherwise:
//! `*_quietly` reads record no hit or miss and leave frequencies alone, so
//! diagnostics never skew eviction.
//!
//! ```
//! use s3cache::{Cache, QueueTag};
//!
//! let cache: Cache<u32, &str> = Cache::new(10);
//! cache.set(1, "one");
//! cache.flush();
//!
//! let ext = cache.extension();
//! assert_eq!(ext.get_quietly(&1), Some("one"));
//! assert_eq!(ext.policy_info(&1).map(|info| info.queue()), Some(QueueTag::Small));
//! assert_eq!(cache.stats().hits(), 0);
//! ```

use std::hash::Hash;
use std::time::{Duration, SystemTime};

use crate::cache::{Cache, Core};
use crate::node::{NEVER_EXPIRES, NodeRef, QueueTag};

/// Owned snapshot of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry<K, V> {
    key: K,
    value: V,
    expiration: Option<SystemTime>,
    expires_after: Option<Duration>,
    cost: u32,
}

impl<K, V> Entry<K, V> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn value(&self) -> &V {
        &self.value
    }

    /// Wall-clock instant the entry expires, `None` if it never does.
    pub fn expiration(&self) -> Option<SystemTime> {
        self.expiration
    }

    /// Remaining lifetime when the snapshot was taken.
    pub fn expires_after(&self) -> Option<Duration> {
        self.expires_after
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }
}

/// Eviction metadata of one entry.
///
/// The queue is assigned by the maintenance thread; call
/// [`Cache::flush`] first to observe the effect of recent writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolicyInfo {
    queue: QueueTag,
    frequency: u8,
    cost: u32,
}

impl PolicyInfo {
    pub fn queue(&self) -> QueueTag {
        self.queue
    }

    /// Saturating access counter, 0..=3.
    pub fn frequency(&self) -> u8 {
        self.frequency
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

/// Handle returned by [`Cache::extension`].
pub struct Extension<'a, K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    cache: &'a Cache<K, V>,
}

impl<'a, K, V> Extension<'a, K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub(crate) fn new(cache: &'a Cache<K, V>) -> Self {
        Self { cache }
    }

    fn core(&self) -> &Core<K, V> {
        self.cache.core()
    }

    fn remaining(&self, node: &NodeRef<K, V>) -> Option<Duration> {
        let expiration = node.expiration();
        (expiration != NEVER_EXPIRES).then(|| {
            let left = expiration.saturating_sub(self.core().clock.now());
            Duration::from_secs(u64::from(left))
        })
    }

    fn entry(&self, node: &NodeRef<K, V>) -> Entry<K, V>
    where
        K: Clone,
        V: Clone,
    {
        let expiration = node.expiration();
        Entry {
            key: node.key().clone(),
            value: node.value().clone(),
            expiration: (expiration != NEVER_EXPIRES)
                .then(|| self.core().clock.to_system_time(expiration)),
            expires_after: self.remaining(node),
            cost: node.cost(),
        }
    }

    /// Value for `key` with no side effects.
    pub fn get_quietly(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.core().find(key).map(|node| node.value().clone())
    }

    /// Entry snapshot for `key`, accounted like [`Cache::get`].
    pub fn get_entry(&self, key: &K) -> Option<Entry<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        self.core().lookup(key).map(|node| self.entry(&node))
    }

    /// Entry snapshot for `key` with no side effects.
    pub fn get_entry_quietly(&self, key: &K) -> Option<Entry<K, V>>
    where
        K: Clone,
        V: Clone,
    {
        self.core().find(key).map(|node| self.entry(&node))
    }

    pub fn policy_info(&self, key: &K) -> Option<PolicyInfo> {
        self.core().find(key).map(|node| PolicyInfo {
            queue: node.queue(),
            frequency: node.frequency(),
            cost: node.cost(),
        })
    }

    /// Remaining lifetime of `key`. `None` if it is absent or never expires.
    pub fn expires_after(&self, key: &K) -> Option<Duration> {
        self.core().find(key).and_then(|node| self.remaining(&node))
    }

    /// Visits snapshots of live entries until `f` returns `false`.
    pub fn for_each_entry(&self, mut f: impl FnMut(Entry<K, V>) -> bool)
    where
        K: Clone,
        V: Clone,
    {
        let now = self.core().clock.now();
        self.core().table.range(|node| {
            if !node.is_alive() || node.has_expired(now) {
                return true;
            }
            f(self.entry(node))
        });
    }
}
