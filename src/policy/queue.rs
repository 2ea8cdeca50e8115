//! Cost-tracking FIFO over slab-linked nodes.
//!
//! Small and Main are both instances of [`Queue`]. Nodes are linked through
//! the `prev`/`next` slots in their header; the queue only stores the two
//! endpoints plus running length and cost.
//!
//! ```text
//!   head ──► [a] ◄──► [b] ◄──► [c] ◄── tail
//!   (oldest, popped first)     (newest, pushed here)
//! ```

use crate::ds::SlotId;
use crate::node::{NodeRef, Slab};

#[derive(Debug)]
pub struct Queue {
    head: Option<SlotId>,
    tail: Option<SlotId>,
    len: usize,
    cost: u64,
    max_cost: u64,
}

impl Queue {
    pub fn new(max_cost: u64) -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            cost: 0,
            max_cost,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn cost(&self) -> u64 {
        self.cost
    }

    #[inline]
    pub fn max_cost(&self) -> u64 {
        self.max_cost
    }

    /// `true` while the queue holds more cost than its budget.
    #[inline]
    pub fn is_over_budget(&self) -> bool {
        self.cost > self.max_cost
    }

    #[cfg(test)]
    pub fn head(&self) -> Option<SlotId> {
        self.head
    }

    /// Appends `node` at the tail. The node must already own a slab slot.
    pub fn push<K, V>(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        let Some(id) = node.slot() else {
            debug_assert!(false, "queued node has no slot");
            return;
        };
        node.set_prev(self.tail);
        node.set_next(None);
        match self.tail.and_then(|tail| slab.get(tail)) {
            Some(tail) => tail.set_next(Some(id)),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
        self.cost += u64::from(node.cost());
    }

    /// Detaches and returns the oldest node.
    pub fn pop<K, V>(&mut self, slab: &Slab<K, V>) -> Option<NodeRef<K, V>> {
        let node = slab.get(self.head?)?.clone();
        self.unlink(&node, slab);
        Some(node)
    }

    /// Splices `node` out using its own links.
    pub fn unlink<K, V>(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        let prev = node.prev();
        let next = node.next();
        match prev.and_then(|id| slab.get(id)) {
            Some(prev) => prev.set_next(next),
            None => self.head = next,
        }
        match next.and_then(|id| slab.get(id)) {
            Some(next) => next.set_prev(prev),
            None => self.tail = prev,
        }
        node.set_prev(None);
        node.set_next(None);
        self.len -= 1;
        self.cost -= u64::from(node.cost());
    }

    /// Unlinks every node and resets the counters.
    pub fn clear<K, V>(&mut self, slab: &Slab<K, V>) {
        while let Some(node) = self.pop(slab) {
            node.unmark();
        }
        self.head = None;
        self.tail = None;
        self.len = 0;
        self.cost = 0;
    }

    /// Walks the queue from head to tail.
    #[cfg(test)]
    pub fn iter<'a, K, V>(&self, slab: &'a Slab<K, V>) -> impl Iterator<Item = &'a NodeRef<K, V>> {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = slab.get(cursor?)?;
            cursor = node.next();
            Some(node)
        })
    }
}
