//! Rooted doubly-linked lists threaded through the nodes' expiration links.
//!
//! A queue owns one or more lists, each identified by a root index. The first
//! node's `prev_exp` and the last node's `next_exp` point at the root instead
//! of being empty, so a node can find and fix up its own list endpoints when
//! it is spliced out, and "both links empty" always means "not queued".
//!
//! ```text
//!   roots[r] { head, tail }
//!      │                         │
//!      ▼                         ▼
//!    Root(r) ◄── [a] ◄──► [b] ◄──► [c] ──► Root(r)
//! ```

use crate::ds::SlotId;
use crate::node::{Link, NodeRef, Slab};

#[derive(Debug, Default, Clone, Copy)]
struct Root {
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

#[derive(Debug)]
pub struct ExpLists {
    roots: Vec<Root>,
    len: usize,
}

impl ExpLists {
    pub fn new(count: usize) -> Self {
        Self {
            roots: vec![Root::default(); count],
            len: 0,
        }
    }

    /// Nodes linked across all lists.
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self, root: usize) -> Option<SlotId> {
        self.roots[root].head
    }

    /// Appends `node` to list `root`.
    pub fn push_back<K, V>(&mut self, root: usize, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        let Some(id) = node.slot() else {
            debug_assert!(false, "expiring node has no slot");
            return;
        };
        let root_link = Link::Root(root as u32);
        let list = &mut self.roots[root];
        match list.tail {
            Some(tail_id) => {
                if let Some(tail) = slab.get(tail_id) {
                    tail.set_next_exp(Some(Link::Node(id)));
                }
                node.set_prev_exp(Some(Link::Node(tail_id)));
            },
            None => {
                list.head = Some(id);
                node.set_prev_exp(Some(root_link));
            },
        }
        node.set_next_exp(Some(root_link));
        list.tail = Some(id);
        self.len += 1;
    }

    /// Splices `node` out of whichever list holds it. Returns `false` if it
    /// was not linked.
    pub fn unlink<K, V>(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) -> bool {
        let (Some(prev), Some(next)) = (node.prev_exp(), node.next_exp()) else {
            return false;
        };
        match prev {
            Link::Root(root) => self.roots[root as usize].head = slot_of(next),
            Link::Node(id) => {
                if let Some(prev_node) = slab.get(id) {
                    prev_node.set_next_exp(Some(next));
                }
            },
        }
        match next {
            Link::Root(root) => self.roots[root as usize].tail = slot_of(prev),
            Link::Node(id) => {
                if let Some(next_node) = slab.get(id) {
                    next_node.set_prev_exp(Some(prev));
                }
            },
        }
        node.set_prev_exp(None);
        node.set_next_exp(None);
        self.len -= 1;
        true
    }

    /// Detaches and returns the first node of list `root`.
    pub fn pop_front<K, V>(&mut self, root: usize, slab: &Slab<K, V>) -> Option<NodeRef<K, V>> {
        let node = slab.get(self.roots[root].head?)?.clone();
        self.unlink(&node, slab);
        Some(node)
    }

    /// Unlinks every node of every list.
    pub fn clear<K, V>(&mut self, slab: &Slab<K, V>) {
        for root in 0..self.roots.len() {
            while self.pop_front(root, slab).is_some() {}
        }
        self.roots.fill(Root::default());
        self.len = 0;
    }
}

#[inline]
fn slot_of(link: Link) -> Option<SlotId> {
    match link {
        Link::Node(id) => Some(id),
        Link::Root(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ds::SlotArena;
    use crate::node::NodeManager;

    fn node(slab: &mut Slab<u32, u32>, key: u32) -> NodeRef<u32, u32> {
        let node = NodeManager::new(true, false).create(key, key, key, 1);
        node.set_slot(Some(slab.insert(node.clone())));
        node
    }

    fn drain(lists: &mut ExpLists, root: usize, slab: &Slab<u32, u32>) -> Vec<u32> {
        std::iter::from_fn(|| lists.pop_front(root, slab))
            .map(|n| *n.key())
            .collect()
    }

    #[test]
    fn single_node_is_linked_to_root_both_ways() {
        let mut slab = SlotArena::new();
        let mut lists = ExpLists::new(2);
        let a = node(&mut slab, 1);
        lists.push_back(1, &a, &slab);
        assert_eq!(a.prev_exp(), Some(Link::Root(1)));
        assert_eq!(a.next_exp(), Some(Link::Root(1)));

        assert!(lists.unlink(&a, &slab));
        assert!(lists.head(1).is_none());
        assert!(lists.is_empty());
        assert!(!lists.unlink(&a, &slab));
    }

    #[test]
    fn unlink_from_any_position() {
        let mut slab = SlotArena::new();
        let mut lists = ExpLists::new(1);
        let nodes: Vec<_> = (1..=5).map(|k| node(&mut slab, k)).collect();
        for n in &nodes {
            lists.push_back(0, n, &slab);
        }
        lists.unlink(&nodes[0], &slab);
        lists.unlink(&nodes[2], &slab);
        lists.unlink(&nodes[4], &slab);
        assert_eq!(lists.len(), 2);
        assert_eq!(drain(&mut lists, 0, &slab), vec![2, 4]);
    }

    #[test]
    fn lists_are_independent() {
        let mut slab = SlotArena::new();
        let mut lists = ExpLists::new(3);
        for key in 0..9 {
            let n = node(&mut slab, key);
            lists.push_back(key as usize % 3, &n, &slab);
        }
        assert_eq!(drain(&mut lists, 1, &slab), vec![1, 4, 7]);
        assert_eq!(lists.len(), 6);
        lists.clear(&slab);
        assert!(lists.is_empty());
        assert!(lists.head(0).is_none() && lists.head(2).is_none());
    }
}
