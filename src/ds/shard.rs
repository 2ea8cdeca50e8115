//! Striped bucket table mapping keys to nodes.
//!
//! The table is a fixed power-of-two array of buckets, each behind its own
//! mutex. A bucket holds a few inline `(hash, node)` slots and chains
//! overflow segments when they fill up. Every bucket and overflow segment is
//! aligned to a cache line so neighbouring locks never share one.
//!
//! ```text
//!   hash & mask
//!        │
//!        ▼
//!   ┌──────────────────────────────────────┐     ┌──────────────────────┐
//!   │ Mutex<Segment>                       │     │ Segment (overflow)   │
//!   │  hashes: [h0, h1, h2, h3]            │     │  hashes: [h4, ..]    │
//!   │  nodes:  [n0, n1, None, n3]          │────►│  nodes:  [n4, ..]    │
//!   └──────────────────────────────────────┘     └──────────────────────┘
//! ```
//!
//! Lookups compare the stored hash first and the key second, so colliding
//! hashes are still told apart. Locks are held only for the scan of a
//! single bucket; callers never run policy code under them.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::node::{NodeRef, same_node};

/// Inline slots per segment.
pub const BUCKET_SLOTS: usize = 4;

/// Keeps the bucket table bounded when capacity is a large cost budget.
const MAX_SIZING_HINT: usize = 1 << 20;

#[repr(align(64))]
#[derive(Debug)]
struct Padded<T>(T);

struct Segment<K, V> {
    hashes: [u64; BUCKET_SLOTS],
    nodes: [Option<NodeRef<K, V>>; BUCKET_SLOTS],
    overflow: Option<Box<Padded<Segment<K, V>>>>,
}

impl<K, V> Segment<K, V> {
    fn new() -> Self {
        Self {
            hashes: [0; BUCKET_SLOTS],
            nodes: [const { None }; BUCKET_SLOTS],
            overflow: None,
        }
    }

    /// `true` iff no slot in this segment or its overflow chain is occupied.
    #[cfg(test)]
    fn is_empty(&self) -> bool {
        let mut segment = self;
        loop {
            if segment.nodes.iter().any(Option::is_some) {
                return false;
            }
            match &segment.overflow {
                Some(next) => segment = &next.0,
                None => return true,
            }
        }
    }

    fn find_slot(
        &mut self,
        mut matches: impl FnMut(u64, &NodeRef<K, V>) -> bool,
    ) -> Option<&mut Option<NodeRef<K, V>>> {
        let mut segment = self;
        loop {
            for i in 0..BUCKET_SLOTS {
                let hit = match &segment.nodes[i] {
                    Some(node) => matches(segment.hashes[i], node),
                    None => false,
                };
                if hit {
                    return Some(&mut segment.nodes[i]);
                }
            }
            match &mut segment.overflow {
                Some(next) => segment = &mut next.0,
                None => return None,
            }
        }
    }

    fn insert(&mut self, hash: u64, node: NodeRef<K, V>) {
        let mut segment = self;
        loop {
            if let Some(i) = segment.nodes.iter().position(Option::is_none) {
                segment.hashes[i] = hash;
                segment.nodes[i] = Some(node);
                return;
            }
            segment = &mut segment
                .overflow
                .get_or_insert_with(|| Box::new(Padded(Segment::new())))
                .0;
        }
    }

    fn for_each(&self, mut f: impl FnMut(&NodeRef<K, V>)) {
        let mut segment = self;
        loop {
            segment.nodes.iter().flatten().for_each(&mut f);
            match &segment.overflow {
                Some(next) => segment = &next.0,
                None => return,
            }
        }
    }

    /// Removes every node matching `pred`, handing each to `out`.
    fn retain(
        &mut self,
        mut pred: impl FnMut(&NodeRef<K, V>) -> bool,
        out: &mut Vec<NodeRef<K, V>>,
    ) {
        let mut segment = self;
        loop {
            for slot in segment.nodes.iter_mut() {
                if slot.as_ref().is_some_and(|node| !pred(node))
                    && let Some(node) = slot.take()
                {
                    out.push(node);
                }
            }
            match &mut segment.overflow {
                Some(next) => segment = &mut next.0,
                None => return,
            }
        }
    }
}

/// Concurrent key → node table.
pub struct ShardedTable<K, V> {
    buckets: Box<[Padded<Mutex<Segment<K, V>>>]>,
    mask: usize,
    len: AtomicUsize,
}

impl<K, V> ShardedTable<K, V>
where
    K: Eq,
{
    /// Sizes the table for about `expected` entries, with at least four
    /// buckets per available CPU to keep lock contention low.
    pub fn new(expected: usize) -> Self {
        let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
        let by_size = expected.min(MAX_SIZING_HINT).div_ceil(BUCKET_SLOTS);
        let count = by_size.max(parallelism * 4).next_power_of_two();
        let buckets = (0..count)
            .map(|_| Padded(Mutex::new(Segment::new())))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buckets,
            mask: count - 1,
            len: AtomicUsize::new(0),
        }
    }

    #[inline]
    fn bucket(&self, hash: u64) -> &Mutex<Segment<K, V>> {
        &self.buckets[(hash as usize) & self.mask].0
    }

    #[cfg(test)]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the node stored for `key`.
    pub fn get(&self, hash: u64, key: &K) -> Option<NodeRef<K, V>> {
        let mut segment = self.bucket(hash).lock();
        segment
            .find_slot(|h, node| h == hash && node.key() == key)
            .and_then(|slot| slot.clone())
    }

    /// Inserts `node`, replacing and returning any node with the same key.
    pub fn set(&self, hash: u64, node: NodeRef<K, V>) -> Option<NodeRef<K, V>> {
        let mut segment = self.bucket(hash).lock();
        if let Some(slot) = segment.find_slot(|h, n| h == hash && n.key() == node.key()) {
            return slot.replace(node);
        }
        segment.insert(hash, node);
        self.len.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Inserts `node` unless the key is present; returns the resident node
    /// in that case.
    pub fn set_if_absent(&self, hash: u64, node: NodeRef<K, V>) -> Option<NodeRef<K, V>> {
        let mut segment = self.bucket(hash).lock();
        if let Some(slot) = segment.find_slot(|h, n| h == hash && n.key() == node.key()) {
            return slot.clone();
        }
        segment.insert(hash, node);
        self.len.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Removes and returns the node stored for `key`.
    pub fn delete(&self, hash: u64, key: &K) -> Option<NodeRef<K, V>> {
        let mut segment = self.bucket(hash).lock();
        let removed = segment
            .find_slot(|h, node| h == hash && node.key() == key)
            .and_then(Option::take);
        if removed.is_some() {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Removes exactly `node`, leaving a newer node for the same key alone.
    pub fn delete_node(&self, hash: u64, node: &NodeRef<K, V>) -> bool {
        let mut segment = self.bucket(hash).lock();
        let removed = segment
            .find_slot(|h, n| h == hash && same_node(n, node))
            .and_then(Option::take)
            .is_some();
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    /// Removes the nodes for which `pred` returns `false`, bucket by bucket,
    /// and returns them.
    pub fn retain(&self, mut pred: impl FnMut(&NodeRef<K, V>) -> bool) -> Vec<NodeRef<K, V>> {
        let mut removed = Vec::new();
        for bucket in self.buckets.iter() {
            let before = removed.len();
            bucket.0.lock().retain(&mut pred, &mut removed);
            self.len.fetch_sub(removed.len() - before, Ordering::Relaxed);
        }
        removed
    }

    /// Empties the table and returns the removed nodes.
    pub fn clear(&self) -> Vec<NodeRef<K, V>> {
        let mut removed = Vec::new();
        for bucket in self.buckets.iter() {
            let mut segment = bucket.0.lock();
            let before = removed.len();
            segment.for_each(|node| removed.push(node.clone()));
            *segment = Segment::new();
            self.len.fetch_sub(removed.len() - before, Ordering::Relaxed);
        }
        removed
    }

    /// Visits a snapshot of each bucket outside its lock until `f` returns
    /// `false`.
    pub fn range(&self, mut f: impl FnMut(&NodeRef<K, V>) -> bool) {
        let mut batch = Vec::with_capacity(BUCKET_SLOTS);
        for bucket in self.buckets.iter() {
            bucket.0.lock().for_each(|node| batch.push(node.clone()));
            for node in batch.drain(..) {
                if !f(&node) {
                    return;
                }
            }
        }
    }

    /// `true` iff the bucket `hash` maps to holds no live node.
    #[cfg(test)]
    pub fn is_bucket_empty(&self, hash: u64) -> bool {
        self.bucket(hash).lock().is_empty()
    }
}

impl<K, V> std::fmt::Debug for ShardedTable<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedTable")
            .field("buckets", &self.buckets.len())
            .field("len", &self.len.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NEVER_EXPIRES, NodeManager};

    fn node(key: u64, value: u64) -> NodeRef<u64, u64> {
        NodeManager::new(false, false).create(key, value, NEVER_EXPIRES, 1)
    }

    #[test]
    fn set_get_delete() {
        let table = ShardedTable::new(16);
        assert!(table.set(1, node(1, 10)).is_none());
        assert_eq!(table.get(1, &1).map(|n| *n.value()), Some(10));
        assert_eq!(table.len(), 1);

        let old = table.set(1, node(1, 11)).unwrap();
        assert_eq!(*old.value(), 10);
        assert_eq!(table.len(), 1);

        let removed = table.delete(1, &1).unwrap();
        assert_eq!(*removed.value(), 11);
        assert!(table.get(1, &1).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn colliding_hashes_are_told_apart_by_key() {
        let table = ShardedTable::new(4);
        for key in 0..20 {
            table.set(7, node(key, key * 2));
        }
        assert_eq!(table.len(), 20);
        for key in 0..20 {
            assert_eq!(table.get(7, &key).map(|n| *n.value()), Some(key * 2));
        }
        assert!(table.get(7, &99).is_none());
    }

    #[test]
    fn overflow_chain_reports_empty_after_deletes() {
        let table = ShardedTable::new(4);
        for key in 0..(BUCKET_SLOTS as u64 * 3) {
            table.set(3, node(key, key));
        }
        assert!(!table.is_bucket_empty(3));
        for key in 0..(BUCKET_SLOTS as u64 * 3) {
            assert!(table.delete(3, &key).is_some());
        }
        assert!(table.is_bucket_empty(3));

        // Freed inline slots are reused before the chain.
        table.set(3, node(100, 1));
        assert_eq!(table.get(3, &100).map(|n| *n.value()), Some(1));
    }

    #[test]
    fn delete_node_respects_identity() {
        let table = ShardedTable::new(4);
        let first = node(1, 1);
        table.set(1, first.clone());
        let second = node(1, 2);
        table.set(1, second.clone());

        assert!(!table.delete_node(1, &first));
        assert!(table.delete_node(1, &second));
        assert!(table.get(1, &1).is_none());
    }

    #[test]
    fn set_if_absent_keeps_resident() {
        let table = ShardedTable::new(4);
        assert!(table.set_if_absent(1, node(1, 1)).is_none());
        let resident = table.set_if_absent(1, node(1, 2)).unwrap();
        assert_eq!(*resident.value(), 1);
        assert_eq!(table.get(1, &1).map(|n| *n.value()), Some(1));
    }

    #[test]
    fn retain_clear_and_range() {
        let table = ShardedTable::new(64);
        for key in 0..50u64 {
            table.set(key.wrapping_mul(0x9E37_79B9_7F4A_7C15), node(key, key));
        }

        let removed = table.retain(|n| n.key() % 2 == 0);
        assert_eq!(removed.len(), 25);
        assert_eq!(table.len(), 25);

        let mut seen = 0;
        table.range(|n| {
            assert_eq!(n.key() % 2, 0);
            seen += 1;
            true
        });
        assert_eq!(seen, 25);

        let mut visited = 0;
        table.range(|_| {
            visited += 1;
            visited < 3
        });
        assert_eq!(visited, 3);

        assert_eq!(table.clear().len(), 25);
        assert!(table.is_empty());
    }

    #[test]
    fn bucket_count_is_power_of_two() {
        let table: ShardedTable<u64, u64> = ShardedTable::new(1000);
        assert!(table.bucket_count().is_power_of_two());
        assert!(table.bucket_count() >= 1000 / BUCKET_SLOTS);
    }
}
