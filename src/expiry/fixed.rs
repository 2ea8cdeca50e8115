//! FIFO expiration for caches with one cache-wide TTL.
//!
//! With a uniform TTL, insertion order is expiration order, so the head of a
//! single list is always the next entry to expire and a sweep stops at the
//! first live head.

use super::ExpiryQueue;
use super::list::ExpLists;
use crate::node::{NodeRef, Slab};

const ROOT: usize = 0;

#[derive(Debug)]
pub struct Fixed {
    list: ExpLists,
}

impl Fixed {
    pub fn new() -> Self {
        Self {
            list: ExpLists::new(1),
        }
    }
}

impl Default for Fixed {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> ExpiryQueue<K, V> for Fixed {
    fn add(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        self.list.push_back(ROOT, node, slab);
    }

    fn delete(&mut self, node: &NodeRef<K, V>, slab: &Slab<K, V>) {
        self.list.unlink(node, slab);
    }

    fn delete_expired(&mut self, now: u32, slab: &Slab<K, V>, expired: &mut Vec<NodeRef<K, V>>) {
        while let Some(head) = self.list.head(ROOT).and_then(|id| slab.get(id)) {
            if !head.has_expired(now) {
                break;
            }
            let head = head.clone();
            self.list.unlink(&head, slab);
            expired.push(head);
        }
    }

    fn clear(&mut self, slab: &Slab<K, V>) {
        self.list.clear(slab);
    }

    fn len(&self) -> usize {
        self.list.len()
    }
}
