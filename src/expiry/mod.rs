//! Expiration queues.
//!
//! Every cache carries one [`ExpiryQueue`], picked at build time:
//!
//! | Configuration        | Queue        | Ordering                         |
//! |----------------------|--------------|----------------------------------|
//! | no TTL               | [`Disabled`] | none; every call is a no-op      |
//! | fixed TTL            | [`Fixed`]    | insertion order == expiry order  |
//! | per-entry TTL        | [`Variable`] | hierarchical timer wheel         |
//!
//! Queues are owned by the maintenance loop and link nodes through their
//! expiration links, so they never allocate per entry. Deleting a node that
//! is not linked is a silent no-op: removal can be requested from several
//! paths (explicit delete, replacement, eviction) for the same node.

mod fixed;
mod list;
mod variable;

pub use fixed::Fixed;
pub use variable::Variable;

use crate::node::{NodeRef, Slab};

/// Contract shared by the expiration queues.
pub trait ExpiryQueue<K, V>: Send {
    /// Starts tracking `node`. The node must own a slab slot.
    fn add(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>);

    /// Stops tracking `node`; no-op if it is not tracked.
    fn delete(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>);

    /// Unlinks every node that has expired at `now` and appends it to
    /// `expired`.
    fn delete_expired(&mut self, now: u32, slab: &Slab<K, V>, expired: &mut Vec<NodeRef<K, V>>);

    /// Unlinks everything.
    fn clear(&mut self, slab: &Slab<K, V>);

    /// Number of tracked nodes.
    fn len(&self) -> usize;

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Queue for caches without expiration.
#[derive(Debug, Default, Clone, Copy)]
pub struct Disabled;

impl<K, V> ExpiryQueue<K, V> for Disabled {
    #[inline]
    fn add(&mut self, _node: &NodeRef<K, V>, _slab: &Slab<K, V>) {}

    #[inline]
    fn delete(&mut self, _node: &NodeRef<K, V>, _slab: &Slab<K, V>) {}

    #[inline]
    fn delete_expired(&mut self, _now: u32, _slab: &Slab<K, V>, _expired: &mut Vec<NodeRef<K, V>>) {}

    #[inline]
    fn clear(&mut self, _slab: &Slab<K, V>) {}

    #[inline]
    fn len(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::SlotArena;
    use crate::node::{NEVER_EXPIRES, NodeManager};

    #[test]
    fn disabled_ignores_everything() {
        let mut slab: Slab<u32, u32> = SlotArena::new();
        let node = NodeManager::new(false, false).create(1, 1, NEVER_EXPIRES, 1);
        node.set_slot(Some(slab.insert(node.clone())));

        let mut queue = Disabled;
        let mut expired = Vec::new();
        ExpiryQueue::add(&mut queue, &node, &slab);
        queue.delete_expired(u32::MAX - 1, &slab, &mut expired);
        assert!(expired.is_empty());
        ExpiryQueue::<u32, u32>::delete(&mut queue, &node, &slab);
        assert!(ExpiryQueue::<u32, u32>::is_empty(&queue));
    }
}
