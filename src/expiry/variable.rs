//! Hierarchical timer wheel for per-entry TTLs.
//!
//! Five levels of buckets with power-of-two spans. A node lands in the
//! coarsest level whose span still covers its remaining lifetime, and in
//! the bucket selected by its expiration tick at that level:
//!
//! ```text
//!   level │ buckets │ tick span │ covers up to
//!   ──────┼─────────┼───────────┼──────────────
//!     0   │   64    │     1 s   │    64 s
//!     1   │   64    │    64 s   │  ~1.1 h
//!     2   │   32    │  4096 s   │  ~1.5 d
//!     3   │    4    │ 131072 s  │  ~6 d
//!     4   │    1    │ 524288 s  │  overflow
//! ```
//!
//! When the clock advances, every level whose tick changed has the buckets
//! it moved over drained, up to and including the one under the new cursor:
//! expired nodes are handed back, the rest are re-added and cascade down
//! into finer levels.

use super::ExpiryQueue;
use super::list::ExpLists;
use crate::node::{NodeRef, Slab};

const BUCKETS: [u32; 5] = [64, 64, 32, 4, 1];

const SPANS: [u32; 6] = [
    1,
    64,
    4096,
    131_072,
    4 * 131_072,
    4 * 131_072,
];

const SHIFTS: [u32; 5] = [
    SPANS[0].trailing_zeros(),
    SPANS[1].trailing_zeros(),
    SPANS[2].trailing_zeros(),
    SPANS[3].trailing_zeros(),
    SPANS[4].trailing_zeros(),
];

const OFFSETS: [usize; 5] = [
    0,
    BUCKETS[0] as usize,
    (BUCKETS[0] + BUCKETS[1]) as usize,
    (BUCKETS[0] + BUCKETS[1] + BUCKETS[2]) as usize,
    (BUCKETS[0] + BUCKETS[1] + BUCKETS[2] + BUCKETS[3]) as usize,
];

const ROOTS: usize = (BUCKETS[0] + BUCKETS[1] + BUCKETS[2] + BUCKETS[3] + BUCKETS[4]) as usize;

#[derive(Debug)]
pub struct Variable {
    wheel: ExpLists,
    time: u32,
}

impl Variable {
    /// Creates a wheel whose cursor starts at clock second `now`.
    pub fn new(now: u32) -> Self {
        Self {
            wheel: ExpLists::new(ROOTS),
            time: now,
        }
    }

    /// Root index of the bucket that should hold a node expiring at
    /// `expiration`. Already-expired nodes go to the current level-0 bucket,
    /// which is drained on the next tick.
    fn find_bucket(&self, expiration: u32) -> usize {
        let expiration = expiration.max(self.time);
        let duration = expiration - self.time;
        for level in 0..BUCKETS.len() - 1 {
            if duration < SPANS[level + 1] {
                let ticks = expiration >> SHIFTS[level];
                let index = (ticks & (BUCKETS[level] - 1)) as usize;
                return OFFSETS[level] + index;
            }
        }
        OFFSETS[BUCKETS.len() - 1]
    }

    fn drain_level<K, V>(
        &mut self,
        level: usize,
        previous_ticks: u32,
        delta: u32,
        slab: &Slab<K, V>,
        expired: &mut Vec<NodeRef<K, V>>,
    ) {
        let mask = BUCKETS[level] - 1;
        // The bucket under the new cursor is drained too, so nodes cascade
        // down before their tick comes up.
        let steps = delta.saturating_add(1).min(BUCKETS[level]);
        let start = previous_ticks & mask;
        let mut pending = Vec::new();
        for step in 0..steps {
            let root = OFFSETS[level] + ((start + step) & mask) as usize;
            while let Some(node) = self.wheel.pop_front(root, slab) {
                pending.push(node);
            }
        }
        for node in pending {
            if node.has_expired(self.time) {
                expired.push(node);
            } else {
                self.wheel.push_back(self.find_bucket(node.expiration()), &node, slab);
            }
        }
    }
}

impl<K, V> ExpiryQueue<K, V> for Variable {
    fn add(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        let root = self.find_bucket(node.expiration());
        self.wheel.push_back(root, node, slab);
    }

    fn delete(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        self.wheel.unlink(node, slab);
    }

    fn delete_expired(&mut self, now: u32, slab: &Slab<K, V>, expired: &mut Vec<NodeRef<K, V>>) {
        if now <= self.time {
            return;
        }
        let previous = self.time;
        self.time = now;
        for level in 0..BUCKETS.len() {
            let previous_ticks = previous >> SHIFTS[level];
            let delta = (now >> SHIFTS[level]) - previous_ticks;
            if delta == 0 {
                break;
            }
            self.drain_level(level, previous_ticks, delta, slab, expired);
        }
    }

    fn clear(&mut self, slab: &Slab<K, V>) {
        self.wheel.clear(slab);
    }

    fn len(&self) -> usize {
        self.wheel.len()
    }
}
