//! The cache façade.
//!
//! A [`Cache`] is a striped key → node table plus a handle to its
//! maintenance thread. Reads touch only the table and the stats counters;
//! writes mutate the table under one bucket lock and then queue a task for
//! the maintenance loop, which owns the eviction policy and expiry queue.
//!
//! ```text
//!   get ──► table ──► stats, frequency bump
//!   set ──► table ──► Task::Add / Task::Update ──┐
//!   delete ─► table ─► Task::Delete ─────────────┼──► WriteBuffer ──► maintenance
//!   get (expired) ─► table ─► Task::Expired ─────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use s3cache::Cache;
//!
//! let cache: Cache<&str, u32> = Cache::new(100);
//! assert!(cache.set("answer", 42));
//! assert_eq!(cache.get(&"answer"), Some(42));
//! cache.delete(&"answer");
//! assert_eq!(cache.get(&"answer"), None);
//! ```
//!
//! Eviction runs asynchronously, so the table may briefly hold more cost
//! than the capacity; [`Cache::flush`] waits until every queued write has
//! been applied.

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::builder::Builder;
use crate::clock::ClockReader;
use crate::ds::{ShardedTable, WriteBuffer};
use crate::extension::Extension;
use crate::hasher::Hasher;
use crate::node::{NEVER_EXPIRES, NodeManager, NodeRef};
use crate::policy::Policy;
use crate::stats::{Stats, StatsCounters};
use crate::task::{Latch, Task};

/// Per-entry cost function.
pub type CostFn<K, V> = Arc<dyn Fn(&K, &V) -> u32 + Send + Sync>;

/// Callback invoked by the maintenance thread for every entry leaving the
/// cache, except on [`Cache::clear`] and [`Cache::close`].
///
/// It must not call back into the same cache: a blocking write from the
/// maintenance thread can deadlock on a full write buffer.
pub type DeletionListener<K, V> = Box<dyn Fn(&K, &V, DeletionCause) + Send>;

/// Why an entry left the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeletionCause {
    /// Removed by [`Cache::delete`] or [`Cache::delete_by`].
    Explicit,
    /// Overwritten by a later `set` of the same key.
    Replaced,
    /// Evicted to keep the total cost within capacity.
    Size,
    /// Its time-to-live ran out.
    Expired,
}

/// State shared between the façade and the maintenance thread.
pub(crate) struct Core<K, V> {
    pub(crate) table: ShardedTable<K, V>,
    pub(crate) hasher: Hasher<K>,
    pub(crate) buffer: WriteBuffer<Task<K, V>>,
    pub(crate) stats: StatsCounters,
    pub(crate) clock: ClockReader,
    pub(crate) nodes: NodeManager,
    pub(crate) capacity: u64,
    pub(crate) max_entry_cost: u64,
    pub(crate) ttl: Option<Duration>,
    pub(crate) variable_ttl: bool,
    pub(crate) cost: Option<CostFn<K, V>>,
    pub(crate) closed: AtomicBool,
}

impl<K, V> Core<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Relative expiration second for an entry written now. A zero TTL
    /// means the entry never expires.
    fn expiration_for(&self, ttl: Option<Duration>) -> u32 {
        let Some(ttl) = ttl.or(self.ttl).filter(|ttl| !ttl.is_zero()) else {
            return NEVER_EXPIRES;
        };
        let secs = ttl.as_secs().saturating_add(u64::from(ttl.subsec_nanos() > 0));
        let expiration = u64::from(self.clock.now()).saturating_add(secs);
        expiration.min(u64::from(NEVER_EXPIRES - 1)) as u32
    }

    /// Queues `task`. If the loop has shut down, the node it carries is
    /// taken back out of the table so nothing unmanaged stays behind.
    fn submit(&self, hash: u64, task: Task<K, V>) {
        if let Err(task) = self.buffer.push(task) {
            if let Task::Add(node) | Task::Update { node, .. } = task {
                self.table.delete_node(hash, &node);
                node.die();
            }
        }
    }

    /// Live, unexpired node for `key`, without any side effect.
    pub(crate) fn find(&self, key: &K) -> Option<NodeRef<K, V>> {
        let node = self.table.get(self.hasher.hash(key), key)?;
        (!node.has_expired(self.clock.now())).then_some(node)
    }

    /// Lookup on the read path: records hit or miss, bumps frequency, and
    /// removes an expired node on the spot.
    pub(crate) fn lookup(&self, key: &K) -> Option<NodeRef<K, V>> {
        let hash = self.hasher.hash(key);
        let Some(node) = self.table.get(hash, key) else {
            self.stats.inc_misses();
            return None;
        };
        if node.has_expired(self.clock.now()) {
            if self.table.delete_node(hash, &node) {
                node.die();
                self.submit(hash, Task::Expired(node));
            }
            self.stats.inc_misses();
            return None;
        }
        Policy::<K>::read([&node]);
        self.stats.inc_hits();
        Some(node)
    }

    pub(crate) fn insert(
        &self,
        key: K,
        value: V,
        ttl: Option<Duration>,
        only_if_absent: bool,
    ) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let cost = self.cost.as_ref().map_or(1, |cost| cost(&key, &value));
        if u64::from(cost) > self.max_entry_cost {
            self.stats.inc_rejected_sets();
            return false;
        }

        let hash = self.hasher.hash(&key);
        let node = self.nodes.create(key, value, self.expiration_for(ttl), cost);

        if !only_if_absent {
            match self.table.set(hash, node.clone()) {
                Some(old) => {
                    old.die();
                    self.submit(hash, Task::Update { node, old });
                },
                None => self.submit(hash, Task::Add(node)),
            }
            return true;
        }

        loop {
            match self.table.set_if_absent(hash, node.clone()) {
                None => {
                    self.submit(hash, Task::Add(node));
                    return true;
                },
                Some(resident) if resident.has_expired(self.clock.now()) => {
                    if self.table.delete_node(hash, &resident) {
                        resident.die();
                        self.submit(hash, Task::Expired(resident));
                    }
                },
                Some(_) => return false,
            }
        }
    }

    pub(crate) fn remove(&self, key: &K) -> bool {
        let hash = self.hasher.hash(key);
        match self.table.delete(hash, key) {
            Some(node) => {
                node.die();
                self.submit(hash, Task::Delete(node));
                true
            },
            None => false,
        }
    }

    /// Pushes a gate task and blocks until the loop reaches it. Returns
    /// immediately once the cache is closed.
    fn await_gate(&self, task: impl FnOnce(Arc<Latch>) -> Task<K, V>) {
        let latch = Latch::new();
        if self.buffer.push(task(Arc::clone(&latch))).is_ok() {
            latch.wait();
        }
    }
}

/// Concurrent, bounded S3-FIFO cache.
///
/// Share it between threads behind an [`Arc`]. Dropping the cache closes it.
pub struct Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    core: Arc<Core<K, V>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// Creates a cache holding at most `capacity` entries of cost 1.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero or the maintenance thread cannot be
    /// spawned. Use [`Builder::try_build`] to handle these as errors.
    pub fn new(capacity: u64) -> Self {
        Builder::new(capacity).build()
    }

    pub fn builder(capacity: u64) -> Builder<K, V> {
        Builder::new(capacity)
    }

    pub(crate) fn from_parts(core: Arc<Core<K, V>>, worker: JoinHandle<()>) -> Self {
        Self {
            core,
            worker: Mutex::new(Some(worker)),
        }
    }

    pub(crate) fn core(&self) -> &Core<K, V> {
        &self.core
    }

    /// Returns a clone of the value for `key`, recording a hit or miss.
    pub fn get(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.get_with(key, V::clone)
    }

    /// Applies `f` to the value for `key` without cloning it.
    pub fn get_with<R>(&self, key: &K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.core.lookup(key).map(|node| f(node.value()))
    }

    /// Inserts or replaces `key` using the cache-wide TTL, if any.
    ///
    /// Returns `false` when the entry's cost exceeds the largest admissible
    /// cost (the Small queue budget) or the cache is closed. Such a rejection
    /// is permanent for that cost.
    pub fn set(&self, key: K, value: V) -> bool {
        self.core.insert(key, value, None, false)
    }

    /// Like [`set`](Self::set) with a per-entry TTL; `Duration::ZERO` means
    /// the entry never expires.
    ///
    /// # Panics
    ///
    /// Panics if the cache was not built with
    /// [`Builder::variable_ttl`].
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        self.assert_variable_ttl();
        self.core.insert(key, value, Some(ttl), false)
    }

    /// Inserts `key` only if no live entry exists for it.
    pub fn set_if_absent(&self, key: K, value: V) -> bool {
        self.core.insert(key, value, None, true)
    }

    /// [`set_if_absent`](Self::set_if_absent) with a per-entry TTL.
    ///
    /// # Panics
    ///
    /// Panics if the cache was not built with [`Builder::variable_ttl`].
    pub fn set_if_absent_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        self.assert_variable_ttl();
        self.core.insert(key, value, Some(ttl), true)
    }

    fn assert_variable_ttl(&self) {
        assert!(
            self.core.variable_ttl,
            "per-entry ttl requires a cache built with Builder::variable_ttl"
        );
    }

    /// Removes `key`. Returns `true` if an entry was removed.
    pub fn delete(&self, key: &K) -> bool {
        self.core.remove(key)
    }

    /// Removes every entry for which `f` returns `true`.
    ///
    /// `f` runs under a bucket lock and must not call into the cache.
    pub fn delete_by(&self, mut f: impl FnMut(&K, &V) -> bool) {
        let removed = self.core.table.retain(|node| !f(node.key(), node.value()));
        for node in removed {
            node.die();
            let hash = self.core.hasher.hash(node.key());
            self.core.submit(hash, Task::Delete(node));
        }
    }

    /// `true` if a live entry exists for `key`. Records no statistics.
    pub fn contains(&self, key: &K) -> bool {
        self.core.find(key).is_some()
    }

    /// Visits live entries until `f` returns `false`. Entries written during
    /// the walk may or may not be seen.
    pub fn range(&self, mut f: impl FnMut(&K, &V) -> bool) {
        let now = self.core.clock.now();
        self.core.table.range(|node| {
            if !node.is_alive() || node.has_expired(now) {
                return true;
            }
            f(node.key(), node.value())
        });
    }

    /// Number of entries in the table, including expired entries not yet
    /// reaped.
    pub fn len(&self) -> usize {
        self.core.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum total cost.
    pub fn capacity(&self) -> u64 {
        self.core.capacity
    }

    /// Largest cost a single entry may have.
    pub fn max_entry_cost(&self) -> u64 {
        self.core.max_entry_cost
    }

    pub fn stats(&self) -> Stats {
        self.core.stats.snapshot()
    }

    /// Read-only inspection API.
    pub fn extension(&self) -> Extension<'_, K, V> {
        Extension::new(self)
    }

    /// Blocks until every write queued before this call has been applied to
    /// the eviction policy and expiry queue.
    pub fn flush(&self) {
        self.core.await_gate(Task::Barrier);
    }

    /// Removes every entry and resets policy state. Returns once the
    /// maintenance loop has applied the reset. No deletion events fire.
    /// A write racing with `clear` either lands before it and is removed,
    /// or lands after it and is kept.
    pub fn clear(&self) {
        if self.core.closed.load(Ordering::Acquire) {
            return;
        }
        for node in self.core.table.clear() {
            node.die();
        }
        self.core.await_gate(Task::Clear);
        debug!("cache cleared");
    }

    /// Clears the cache, stops the maintenance thread and releases the
    /// clock. Later writes are refused and reads miss. Idempotent.
    pub fn close(&self) {
        if self.core.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.core.buffer.push(Task::Close);
        if let Some(worker) = self.worker.lock().take()
            && worker.join().is_err()
        {
            debug!("maintenance thread exited with a panic");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.core.closed.load(Ordering::Acquire)
    }
}

impl<K, V> Drop for Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.close();
    }
}

impl<K, V> fmt::Debug for Cache<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("len", &self.len())
            .field("capacity", &self.core.capacity)
            .field("layout", &self.core.nodes.layout())
            .field("pending_writes", &self.core.buffer.len())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
