//! Hit, miss and eviction counters.
//!
//! [`StatsCounters`] is the live, lock-free side updated from every thread;
//! [`Stats`] is the immutable snapshot handed to callers. Counters are
//! signed so an overflow shows up as a negative value, which the snapshot
//! clamps to `i64::MAX` instead of letting it wrap.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Default)]
pub struct StatsCounters {
    hits: AtomicI64,
    misses: AtomicI64,
    rejected_sets: AtomicI64,
    evicted_count: AtomicI64,
    evicted_cost: AtomicI64,
}

impl StatsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_hits(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_misses(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rejected_sets(&self) {
        self.rejected_sets.fetch_add(1, Ordering::Relaxed);
    }

    /// Accounts one removed entry of the given cost.
    #[inline]
    pub fn record_eviction(&self, cost: u32) {
        self.evicted_count.fetch_add(1, Ordering::Relaxed);
        self.evicted_cost.fetch_add(i64::from(cost), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            hits: normalize(self.hits.load(Ordering::Relaxed)),
            misses: normalize(self.misses.load(Ordering::Relaxed)),
            rejected_sets: normalize(self.rejected_sets.load(Ordering::Relaxed)),
            evicted_count: normalize(self.evicted_count.load(Ordering::Relaxed)),
            evicted_cost: normalize(self.evicted_cost.load(Ordering::Relaxed)),
        }
    }

    #[cfg(test)]
    fn force(&self, hits: i64) {
        self.hits.store(hits, Ordering::Relaxed);
    }
}

#[inline]
fn normalize(value: i64) -> i64 {
    if value < 0 { i64::MAX } else { value }
}

/// Point-in-time copy of a cache's counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    hits: i64,
    misses: i64,
    rejected_sets: i64,
    evicted_count: i64,
    evicted_cost: i64,
}

impl Stats {
    pub fn hits(&self) -> i64 {
        self.hits
    }

    pub fn misses(&self) -> i64 {
        self.misses
    }

    /// Number of `set` calls refused because the entry's cost exceeded the
    /// admissible maximum.
    pub fn rejected_sets(&self) -> i64 {
        self.rejected_sets
    }

    /// Entries removed by eviction, expiration or explicit deletion.
    pub fn evicted_count(&self) -> i64 {
        self.evicted_count
    }

    /// Summed cost of the entries counted by [`evicted_count`](Self::evicted_count).
    pub fn evicted_cost(&self) -> i64 {
        self.evicted_cost
    }

    /// `hits / (hits + misses)`, or 0 before the first lookup.
    pub fn ratio(&self) -> f64 {
        let requests = self.hits.saturating_add(self.misses);
        if requests == 0 {
            return 0.0;
        }
        self.hits as f64 / requests as f64
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, ratio: {:.2}%, rejected_sets: {}, evicted_count: {}, evicted_cost: {} }}",
            self.hits,
            self.misses,
            self.ratio() * 100.0,
            self.rejected_sets,
            self.evicted_count,
            self.evicted_cost
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_copies_counters() {
        let counters = StatsCounters::new();
        counters.inc_hits();
        counters.inc_hits();
        counters.inc_misses();
        counters.inc_rejected_sets();
        counters.record_eviction(3);
        counters.record_eviction(1);

        let stats = counters.snapshot();
        assert_eq!(stats.hits(), 2);
        assert_eq!(stats.misses(), 1);
        assert_eq!(stats.rejected_sets(), 1);
        assert_eq!(stats.evicted_count(), 2);
        assert_eq!(stats.evicted_cost(), 4);

        counters.inc_hits();
        assert_eq!(stats.hits(), 2);
    }

    #[test]
    fn ratio_handles_empty_and_mixed() {
        assert_eq!(Stats::default().ratio(), 0.0);
        let counters = StatsCounters::new();
        for _ in 0..3 {
            counters.inc_hits();
        }
        counters.inc_misses();
        assert!((counters.snapshot().ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn overflowed_counter_is_clamped() {
        let counters = StatsCounters::new();
        counters.force(i64::MAX);
        counters.inc_hits();
        assert_eq!(counters.snapshot().hits(), i64::MAX);
    }

    #[test]
    fn display_mentions_ratio() {
        let counters = StatsCounters::new();
        counters.inc_hits();
        let text = counters.snapshot().to_string();
        assert!(text.contains("ratio: 100.00%"));
    }
}
