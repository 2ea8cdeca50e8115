//! Membership-only record of keys recently evicted from Small.
//!
//! Stores key hashes, never nodes. Insertion order is kept in a ring so the
//! oldest record is dropped first once the bound is reached; the bound is
//! passed per call because it tracks the live size of Small + Main.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

#[derive(Debug, Default)]
pub struct Ghost {
    order: VecDeque<u64>,
    members: FxHashSet<u64>,
}

impl Ghost {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn contains(&self, hash: u64) -> bool {
        self.members.contains(&hash)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Records `hash`, dropping the oldest records so at most `limit` remain.
    /// A hash that is already recorded keeps its original position.
    pub fn record(&mut self, hash: u64, limit: usize) {
        if limit == 0 || self.members.contains(&hash) {
            return;
        }
        while self.order.len() >= limit {
            match self.order.pop_front() {
                Some(old) => {
                    self.members.remove(&old);
                },
                None => break,
            }
        }
        self.order.push_back(hash);
        self.members.insert(hash);
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }

    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        self.order.len() == self.members.len()
            && self.order.iter().all(|hash| self.members.contains(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_drops_oldest() {
        let mut ghost = Ghost::new();
        ghost.record(1, 2);
        ghost.record(2, 2);
        assert!(ghost.contains(1) && ghost.contains(2));

        ghost.record(3, 2);
        assert!(!ghost.contains(1));
        assert!(ghost.contains(2) && ghost.contains(3));
        assert_eq!(ghost.len(), 2);
        assert!(ghost.is_consistent());
    }

    #[test]
    fn shrinking_limit_trims_to_fit() {
        let mut ghost = Ghost::new();
        for hash in 0..5 {
            ghost.record(hash, 5);
        }
        ghost.record(9, 2);
        assert_eq!(ghost.len(), 2);
        assert!(ghost.contains(4) && ghost.contains(9));
        assert!(ghost.is_consistent());
    }

    #[test]
    fn duplicate_is_ignored() {
        let mut ghost = Ghost::new();
        ghost.record(7, 3);
        ghost.record(7, 3);
        assert_eq!(ghost.len(), 1);
    }

    #[test]
    fn zero_limit_is_noop() {
        let mut ghost = Ghost::new();
        ghost.record(1, 0);
        assert!(ghost.is_empty());
    }

    #[test]
    fn clear_resets() {
        let mut ghost = Ghost::new();
        ghost.record(1, 4);
        ghost.record(2, 4);
        ghost.clear();
        assert!(ghost.is_empty());
        assert!(!ghost.contains(1));
    }
}
