//! S3-FIFO eviction over slab-linked nodes.
//!
//! Three cooperating queues decide which entries leave the cache once the
//! total cost exceeds capacity:
//!
//! ```text
//!   add ──► ghost hit? ──yes──────────────────────────┐
//!              │no                                     ▼
//!              ▼                              ┌─────────────────┐
//!   ┌────────────────────┐  freq > 1 (promote)│  MAIN (90%)     │◄─┐ freq > 0:
//!   │  SMALL (10%)       │───────────────────►│  head ──► tail  │──┘ decrement,
//!   │  head ──► tail     │                    └────────┬────────┘    reinsert
//!   └─────────┬──────────┘                             │ freq == 0 or
//!             │ freq <= 1                              ▼ 20th reinsertion
//!             ▼                                      evicted
//!   GHOST (hashes only) + evicted
//! ```
//!
//! ## Budgets
//!
//! | Queue | Budget                          |
//! |-------|---------------------------------|
//! | Small | `max(capacity / 10, 1)`         |
//! | Main  | `capacity - small budget`       |
//! | Ghost | `len(Small) + len(Main)` hashes |
//!
//! The policy is driven exclusively by the maintenance loop, so it takes
//! `&mut self` and holds no locks. Reads are recorded by bumping node
//! frequency directly from any thread (see [`Policy::read`]); queue position
//! never changes on a hit.

use std::hash::Hash;

use crate::hasher::Hasher;
use crate::node::{NodeRef, QueueTag, Slab};
use crate::policy::ghost::Ghost;
use crate::policy::queue::Queue;

/// Consecutive Main reinsertions after which the current head is evicted
/// regardless of its frequency.
pub const MAX_REINSERTIONS: usize = 20;

/// Cost budget of the Small queue for a given capacity.
#[inline]
pub fn small_budget(capacity: u64) -> u64 {
    (capacity / 10).max(1)
}

#[derive(Debug)]
pub struct Policy<K> {
    small: Queue,
    main: Queue,
    ghost: Ghost,
    capacity: u64,
    hasher: Hasher<K>,
}

impl<K> Policy<K>
where
    K: Hash + Eq,
{
    pub fn new(capacity: u64, hasher: Hasher<K>) -> Self {
        let small_max = small_budget(capacity);
        Self {
            small: Queue::new(small_max),
            main: Queue::new(capacity.saturating_sub(small_max)),
            ghost: Ghost::new(),
            capacity,
            hasher,
        }
    }

    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Largest cost a single entry may have and still be admitted.
    #[inline]
    pub fn max_available_cost(&self) -> u64 {
        self.small.max_cost()
    }

    #[inline]
    pub fn cost(&self) -> u64 {
        self.small.cost() + self.main.cost()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.small.len() + self.main.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn small_len(&self) -> usize {
        self.small.len()
    }

    pub fn main_len(&self) -> usize {
        self.main.len()
    }

    pub fn ghost_len(&self) -> usize {
        self.ghost.len()
    }

    /// Records hits on `nodes`. Only frequency changes; no queue moves.
    #[inline]
    pub fn read<'a, V: 'a>(nodes: impl IntoIterator<Item = &'a NodeRef<K, V>>)
    where
        K: 'a,
    {
        for node in nodes {
            node.increment_frequency();
        }
    }

    /// Admits `node` and evicts until the total cost fits the capacity.
    /// Evicted nodes are appended to `evicted`, already unlinked from
    /// Small/Main but still owning their slab slot.
    pub fn add<V>(
        &mut self,
        node: &NodeRef<K, V>,
        now: u32,
        slab: &Slab<K, V>,
        evicted: &mut Vec<NodeRef<K, V>>,
    ) {
        if self.ghost.contains(self.hasher.hash(node.key())) {
            node.mark_main();
            self.main.push(node, slab);
            node.reset_frequency();
        } else {
            node.mark_small();
            self.small.push(node, slab);
        }

        while self.cost() > self.capacity {
            let progressed = if self.small.cost() >= self.small.max_cost() {
                self.evict_small(now, slab, evicted)
            } else {
                self.evict_main(now, slab, evicted)
            };
            if !progressed {
                break;
            }
        }
    }

    /// Removes `node` from whichever queue holds it; no-op otherwise.
    pub fn delete<V>(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        match node.queue() {
            QueueTag::Small => self.small.unlink(node, slab),
            QueueTag::Main => self.main.unlink(node, slab),
            QueueTag::Unqueued => return,
        }
        node.unmark();
    }

    /// Empties all three queues.
    pub fn clear<V>(&mut self, slab: &Slab<K, V>) {
        self.small.clear(slab);
        self.main.clear(slab);
        self.ghost.clear();
    }

    /// Returns `false` only if Small was empty.
    fn evict_small<V>(
        &mut self,
        now: u32,
        slab: &Slab<K, V>,
        evicted: &mut Vec<NodeRef<K, V>>,
    ) -> bool {
        let Some(node) = self.small.pop(slab) else {
            return false;
        };
        node.unmark();

        if !node.is_alive() || node.has_expired(now) {
            evicted.push(node);
            return true;
        }

        if node.frequency() > 1 {
            node.mark_main();
            self.main.push(&node, slab);
            while self.main.is_over_budget() {
                if !self.evict_main(now, slab, evicted) {
                    break;
                }
            }
            node.reset_frequency();
            return true;
        }

        let limit = self.small.len() + self.main.len();
        self.ghost.record(self.hasher.hash(node.key()), limit);
        evicted.push(node);
        true
    }

    /// Returns `false` only if Main was empty.
    fn evict_main<V>(
        &mut self,
        now: u32,
        slab: &Slab<K, V>,
        evicted: &mut Vec<NodeRef<K, V>>,
    ) -> bool {
        let mut reinsertions = 0;
        while let Some(node) = self.main.pop(slab) {
            if !node.is_alive() || node.has_expired(now) || node.frequency() == 0 {
                node.unmark();
                evicted.push(node);
                return true;
            }

            reinsertions += 1;
            if reinsertions >= MAX_REINSERTIONS {
                node.unmark();
                evicted.push(node);
                return true;
            }

            self.main.push(&node, slab);
            node.decrement_frequency();
        }
        false
    }

    /// Validates queue links, tags and cost accounting.
    #[cfg(test)]
    pub fn check_invariants<V>(&self, slab: &Slab<K, V>) -> Result<(), crate::error::InvariantError>
    where
        K: std::fmt::Debug,
    {
        use crate::error::InvariantError;

        for (name, queue, tag) in [
            ("Small", &self.small, QueueTag::Small),
            ("Main", &self.main, QueueTag::Main),
        ] {
            let mut count = 0;
            let mut cost = 0u64;
            let mut prev = None;
            for node in queue.iter(slab) {
                count += 1;
                cost += u64::from(node.cost());
                if node.queue() != tag {
                    return Err(InvariantError::new(format!(
                        "{name} queue: node {:?} tagged {:?}",
                        node.key(),
                        node.queue()
                    )));
                }
                if node.prev() != prev {
                    return Err(InvariantError::new(format!(
                        "{name} queue: node {:?} prev pointer inconsistent",
                        node.key()
                    )));
                }
                prev = node.slot();
                if count > slab.len() {
                    return Err(InvariantError::new(format!("{name} queue: cycle detected")));
                }
            }
            if count != queue.len() {
                return Err(InvariantError::new(format!(
                    "{name} queue: counted {count} but len = {}",
                    queue.len()
                )));
            }
            if cost != queue.cost() {
                return Err(InvariantError::new(format!(
                    "{name} queue: summed cost {cost} but cost = {}",
                    queue.cost()
                )));
            }
        }

        if self.cost() > self.capacity {
            return Err(InvariantError::new(format!(
                "Total cost {} > capacity {}",
                self.cost(),
                self.capacity
            )));
        }
        if !self.ghost.is_consistent() {
            return Err(InvariantError::new("Ghost order and members disagree"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::SlotArena;
    use crate::node::{NEVER_EXPIRES, NodeManager};

    struct Harness {
        policy: Policy<u32>,
        slab: Slab<u32, u32>,
        manager: NodeManager,
        evicted: Vec<NodeRef<u32, u32>>,
    }

    impl Harness {
        fn new(capacity: u64) -> Self {
            Self {
                policy: Policy::new(capacity, Hasher::new()),
                slab: SlotArena::new(),
                manager: NodeManager::new(true, true),
                evicted: Vec::new(),
            }
        }

        fn admit(&mut self, node: &NodeRef<u32, u32>) {
            node.set_slot(Some(self.slab.insert(node.clone())));
            self.policy.add(node, 0, &self.slab, &mut self.evicted);
            self.release_evicted();
        }

        fn add_with(&mut self, key: u32, cost: u32, expiration: u32) -> NodeRef<u32, u32> {
            let node = self.manager.create(key, key, expiration, cost);
            self.admit(&node);
            node
        }

        fn add(&mut self, key: u32) -> NodeRef<u32, u32> {
            self.add_with(key, 1, NEVER_EXPIRES)
        }

        fn release_evicted(&mut self) {
            for node in &self.evicted {
                if let Some(id) = node.slot() {
                    self.slab.remove(id);
                    node.set_slot(None);
                }
            }
        }

        fn evicted_keys(&self) -> Vec<u32> {
            self.evicted.iter().map(|n| *n.key()).collect()
        }

        fn check(&self) {
            #[cfg(debug_assertions)]
            self.policy.check_invariants(&self.slab).unwrap();
        }
    }

    mod admission {
        use super::*;

        #[test]
        fn new_node_goes_to_small() {
            let mut h = Harness::new(100);
            let node = h.add(1);
            assert!(node.is_small());
            assert_eq!(h.policy.small_len(), 1);
            assert_eq!(h.policy.main_len(), 0);
            h.check();
        }

        #[test]
        fn small_budget_is_at_least_one() {
            assert_eq!(small_budget(5), 1);
            assert_eq!(small_budget(10), 1);
            assert_eq!(small_budget(1000), 100);
            let policy: Policy<u32> = Policy::new(3, Hasher::new());
            assert_eq!(policy.max_available_cost(), 1);
        }

        #[test]
        fn ghost_hit_goes_to_main_with_reset_frequency() {
            let mut h = Harness::new(10);
            for key in 1..=11 {
                h.add(key);
            }
            assert_eq!(h.evicted_keys(), vec![1]);

            let node = h.manager.create(1, 1, NEVER_EXPIRES, 1);
            node.increment_frequency();
            node.increment_frequency();
            h.admit(&node);
            assert!(node.is_main());
            assert_eq!(node.frequency(), 0);
            h.check();
        }
    }

    mod eviction {
        use super::*;

        #[test]
        fn oldest_small_entry_evicted_first() {
            let mut h = Harness::new(10);
            for key in 1..=11 {
                h.add(key);
            }
            assert_eq!(h.evicted_keys(), vec![1]);
            assert_eq!(h.policy.cost(), 10);
            assert_eq!(h.policy.ghost_len(), 1);
            h.check();
        }

        #[test]
        fn frequent_small_entry_is_promoted() {
            let mut h = Harness::new(10);
            let hot = h.add(1);
            Policy::<u32>::read([&hot, &hot]);
            assert_eq!(hot.frequency(), 2);

            for key in 2..=11 {
                h.add(key);
            }

            assert_eq!(h.evicted_keys(), vec![2]);
            assert!(hot.is_main());
            assert_eq!(hot.frequency(), 0);
            h.check();
        }

        #[test]
        fn single_read_is_not_enough_for_promotion() {
            let mut h = Harness::new(10);
            let warm = h.add(1);
            warm.increment_frequency();
            for key in 2..=11 {
                h.add(key);
            }
            assert_eq!(h.evicted_keys(), vec![1]);
        }

        #[test]
        fn dead_and_expired_nodes_are_evicted_first() {
            let mut h = Harness::new(10);
            let dead = h.add(1);
            dead.increment_frequency();
            dead.increment_frequency();
            dead.die();
            for key in 2..=11 {
                h.add(key);
            }
            assert_eq!(h.evicted_keys(), vec![1]);
            assert_eq!(h.policy.ghost_len(), 0);

            let mut h = Harness::new(10);
            let stale = h.add_with(1, 1, 0);
            stale.increment_frequency();
            stale.increment_frequency();
            for key in 2..=11 {
                h.add(key);
            }
            assert_eq!(h.evicted_keys(), vec![1]);
        }

        #[test]
        fn costly_entries_evict_several() {
            let mut h = Harness::new(10);
            for key in 1..=5 {
                h.add_with(key, 2, NEVER_EXPIRES);
            }
            assert!(h.evicted.is_empty());
            h.add_with(6, 1, NEVER_EXPIRES);
            assert_eq!(h.evicted_keys(), vec![1]);
            assert!(h.policy.cost() <= 10);
            h.check();
        }

        #[test]
        fn main_reinsertions_are_bounded() {
            let mut h = Harness::new(100);
            let nodes: Vec<_> = (0..50)
                .map(|key| {
                    let node = h.manager.create(key, key, NEVER_EXPIRES, 1);
                    node.set_slot(Some(h.slab.insert(node.clone())));
                    node.mark_main();
                    h.policy.main.push(&node, &h.slab);
                    for _ in 0..3 {
                        node.increment_frequency();
                    }
                    node
                })
                .collect();

            let mut evicted = Vec::new();
            assert!(h.policy.evict_main(0, &h.slab, &mut evicted));

            // Nineteen heads got a second chance; the twentieth was forced out.
            assert_eq!(evicted.len(), 1);
            assert_eq!(*evicted[0].key(), (MAX_REINSERTIONS - 1) as u32);
            assert_eq!(h.policy.main_len(), 49);
            let decremented = nodes.iter().filter(|n| n.frequency() == 2).count();
            assert_eq!(decremented, MAX_REINSERTIONS - 1);
        }
    }

    mod delete_and_clear {
        use super::*;

        #[test]
        fn delete_unlinks_and_is_idempotent() {
            let mut h = Harness::new(10);
            let a = h.add(1);
            let b = h.add(2);
            h.policy.delete(&a, &h.slab);
            assert_eq!(a.queue(), QueueTag::Unqueued);
            assert_eq!(h.policy.len(), 1);
            assert_eq!(h.policy.cost(), 1);

            h.policy.delete(&a, &h.slab);
            assert_eq!(h.policy.len(), 1);
            assert!(b.is_small());
            h.check();
        }

        #[test]
        fn clear_resets_all_queues() {
            let mut h = Harness::new(10);
            let nodes: Vec<_> = (1..=15).map(|k| h.add(k)).collect();
            h.policy.clear(&h.slab);
            assert!(h.policy.is_empty());
            assert_eq!(h.policy.cost(), 0);
            assert_eq!(h.policy.ghost_len(), 0);
            assert!(nodes.iter().all(|n| n.queue() == QueueTag::Unqueued));
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Add(u32, u32),
            Read(u32),
            Delete(u32),
        }

        fn op_strategy() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u32..60, 1u32..4).prop_map(|(k, c)| Op::Add(k, c)),
                (0u32..60).prop_map(Op::Read),
                (0u32..60).prop_map(Op::Delete),
            ]
        }

        proptest! {
            #[cfg_attr(miri, ignore)]
            #[test]
            fn prop_cost_never_exceeds_capacity(
                capacity in 10u64..60,
                ops in prop::collection::vec(op_strategy(), 0..200)
            ) {
                let mut h = Harness::new(capacity);
                let mut live: std::collections::HashMap<u32, NodeRef<u32, u32>> =
                    std::collections::HashMap::new();
                for op in ops {
                    match op {
                        Op::Add(key, cost) => {
                            if let Some(old) = live.remove(&key) {
                                h.policy.delete(&old, &h.slab);
                                if let Some(id) = old.slot() {
                                    h.slab.remove(id);
                                    old.set_slot(None);
                                }
                            }
                            h.evicted.clear();
                            let node = h.add_with(key, cost, NEVER_EXPIRES);
                            for gone in &h.evicted {
                                live.remove(gone.key());
                            }
                            if node.slot().is_some() {
                                live.insert(key, node);
                            }
                        },
                        Op::Read(key) => {
                            if let Some(node) = live.get(&key) {
                                Policy::<u32>::read([node]);
                            }
                        },
                        Op::Delete(key) => {
                            if let Some(old) = live.remove(&key) {
                                h.policy.delete(&old, &h.slab);
                                if let Some(id) = old.slot() {
                                    h.slab.remove(id);
                                    old.set_slot(None);
                                }
                            }
                        },
                    }
                    prop_assert!(h.policy.cost() <= capacity);
                    prop_assert_eq!(h.policy.len(), live.len());
                    #[cfg(debug_assertions)]
                    h.policy.check_invariants(&h.slab).unwrap();
                }
            }
        }
    }
}
