//! The single writer of policy and expiry state.
//!
//! One thread per cache drains the write buffer and applies each [`Task`]
//! to the S3-FIFO policy, the expiry queue and the node slab, none of which
//! are touched by any other thread. Between tasks, and at least once per
//! second while idle, it sweeps entries whose expiration has passed.
//!
//! ```text
//!   Cache::set/delete ──► table (bucket lock) ──► WriteBuffer<Task> ──┐
//!                                                                      ▼
//!                                       ┌──────────── maintenance thread ─────────────┐
//!                                       │ Add     → slab + expiry.add + policy.add     │
//!                                       │ Update  → retire(old) + Add(new)             │
//!                                       │ Delete  → retire + stats + listener          │
//!                                       │ Expired → retire + stats + listener          │
//!                                       │ Clear   → drop cleared nodes, reset queues   │
//!                                       │ Close   → drop all, close buffer, exit       │
//!                                       │ Barrier → release waiter                     │
//!                                       └──────────────────────────────────────────────┘
//! ```
//!
//! Nodes evicted by the policy or reaped by the expiry sweep are removed
//! from the table by identity, so a newer node stored under the same key is
//! never touched.

use std::hash::Hash;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::cache::{Core, DeletionCause, DeletionListener};
use crate::clock::Clock;
use crate::ds::SlotArena;
use crate::expiry::ExpiryQueue;
use crate::node::{NEVER_EXPIRES, NodeRef, Slab};
use crate::policy::Policy;
use crate::task::Task;

/// Longest the loop idles before checking the clock for expired entries.
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Slab slots reserved up front; it grows past this on demand.
const INITIAL_SLOTS: u64 = 1024;

pub(crate) struct Maintenance<K, V> {
    core: Arc<Core<K, V>>,
    policy: Policy<K>,
    expiry: Box<dyn ExpiryQueue<K, V>>,
    slab: Slab<K, V>,
    clock: Clock,
    listener: Option<DeletionListener<K, V>>,
    last_sweep: u32,
    scratch: Vec<NodeRef<K, V>>,
}

impl<K, V> Maintenance<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    pub fn new(
        core: Arc<Core<K, V>>,
        policy: Policy<K>,
        expiry: Box<dyn ExpiryQueue<K, V>>,
        clock: Clock,
        listener: Option<DeletionListener<K, V>>,
    ) -> Self {
        let last_sweep = clock.now();
        let slots = policy.capacity().min(INITIAL_SLOTS) as usize;
        Self {
            core,
            policy,
            expiry,
            slab: SlotArena::with_capacity(slots),
            clock,
            listener,
            last_sweep,
            scratch: Vec::new(),
        }
    }

    /// Runs until a `Close` task is applied. Consumes `self` so the clock
    /// handle is released on exit.
    pub fn run(mut self) {
        debug!(capacity = self.policy.capacity(), "maintenance loop started");
        loop {
            let task = self.core.buffer.pop_timeout(SWEEP_INTERVAL);
            self.sweep_if_due();
            if let Some(task) = task
                && !self.apply(task)
            {
                break;
            }
        }
        debug!("maintenance loop stopped");
    }

    /// Applies one task; returns `false` once the loop must stop.
    fn apply(&mut self, task: Task<K, V>) -> bool {
        match task {
            Task::Add(node) => self.admit(node),
            Task::Update { node, old } => {
                self.retire(&old);
                self.notify(&old, DeletionCause::Replaced);
                self.admit(node);
            },
            Task::Delete(node) => {
                self.retire(&node);
                self.core.stats.record_eviction(node.cost());
                self.notify(&node, DeletionCause::Explicit);
            },
            Task::Expired(node) => {
                self.retire(&node);
                self.core.stats.record_eviction(node.cost());
                self.notify(&node, DeletionCause::Expired);
            },
            Task::Clear(latch) => {
                self.clear();
                latch.release();
            },
            Task::Barrier(latch) => latch.release(),
            Task::Close => {
                self.close();
                self.core.buffer.close();
                // Wake anyone who queued a gate behind the close.
                while let Some(task) = self.core.buffer.pop() {
                    if let Task::Clear(latch) | Task::Barrier(latch) = task {
                        latch.release();
                    }
                }
                debug!("cache closed");
                return false;
            },
        }
        true
    }

    fn admit(&mut self, node: NodeRef<K, V>) {
        // Deleted or replaced before its Add was applied.
        if !node.is_alive() {
            return;
        }
        node.set_slot(Some(self.slab.insert(node.clone())));
        if node.expiration() != NEVER_EXPIRES {
            self.expiry.add(&node, &self.slab);
        }
        let now = self.clock.now();
        self.policy
            .add(&node, now, &self.slab, &mut self.scratch);
        self.remove_pending(now, None);
    }

    /// Unlinks `node` from the policy and expiry queue and frees its slot.
    /// Every step is a no-op for a node that was never admitted.
    fn retire(&mut self, node: &NodeRef<K, V>) {
        self.policy.delete(node, &self.slab);
        self.expiry.delete(node, &self.slab);
        if let Some(id) = node.slot() {
            self.slab.remove(id);
            node.set_slot(None);
        }
    }

    /// Drops the nodes collected in `scratch` from the cache. Nodes that
    /// are no longer in the table were deleted by a caller whose own task
    /// accounts for them.
    fn remove_pending(&mut self, now: u32, cause: Option<DeletionCause>) {
        if self.scratch.is_empty() {
            return;
        }
        let mut pending = std::mem::take(&mut self.scratch);
        let mut removed = 0usize;
        for node in pending.drain(..) {
            self.retire(&node);
            let hash = self.core.hasher.hash(node.key());
            if !self.core.table.delete_node(hash, &node) {
                continue;
            }
            node.die();
            self.core.stats.record_eviction(node.cost());
            let cause = cause.unwrap_or(if node.has_expired(now) {
                DeletionCause::Expired
            } else {
                DeletionCause::Size
            });
            self.notify(&node, cause);
            removed += 1;
        }
        self.scratch = pending;
        if removed > 0 {
            trace!(removed, cost = self.policy.cost(), "entries removed by maintenance");
        }
    }

    fn sweep_if_due(&mut self) {
        let now = self.clock.now();
        if now == self.last_sweep {
            return;
        }
        self.last_sweep = now;
        self.expiry
            .delete_expired(now, &self.slab, &mut self.scratch);
        if !self.scratch.is_empty() {
            trace!(
                now,
                found = self.scratch.len(),
                tracked = self.expiry.len(),
                "expired entries swept"
            );
        }
        self.remove_pending(now, Some(DeletionCause::Expired));
    }

    /// Drops the nodes `Cache::clear` took out of the table. A node still
    /// alive here was written after the table was emptied and its Add
    /// overtook the Clear, so it is admitted again.
    fn clear(&mut self) {
        let live: Vec<_> = self
            .slab
            .iter()
            .map(|(_, node)| node)
            .filter(|node| node.is_alive())
            .cloned()
            .collect();
        let entries = self.slab.len() - live.len();
        self.reset();
        for node in live {
            self.admit(node);
        }
        debug!(entries, "cache state cleared");
    }

    /// Drops every node from the table and the queues.
    fn close(&mut self) {
        debug!(
            entries = self.policy.len(),
            small = self.policy.small_len(),
            main = self.policy.main_len(),
            ghost = self.policy.ghost_len(),
            "releasing cache state"
        );
        for (_, node) in self.slab.iter() {
            let hash = self.core.hasher.hash(node.key());
            self.core.table.delete_node(hash, node);
            node.die();
        }
        self.reset();
    }

    fn reset(&mut self) {
        self.policy.clear(&self.slab);
        self.expiry.clear(&self.slab);
        for (_, node) in self.slab.iter() {
            node.set_slot(None);
        }
        self.slab.clear();
    }

    fn notify(&self, node: &NodeRef<K, V>, cause: DeletionCause) {
        let Some(listener) = &self.listener else {
            return;
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| listener(node.key(), node.value(), cause)));
        if outcome.is_err() {
            warn!(?cause, "deletion listener panicked");
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) -> Result<(), crate::error::InvariantError>
    where
        K: std::fmt::Debug,
    {
        use crate::error::InvariantError;

        #[cfg(debug_assertions)]
        self.policy.check_invariants(&self.slab)?;
        if self.policy.len() != self.slab.len() {
            return Err(InvariantError::new(format!(
                "policy holds {} nodes but slab holds {}",
                self.policy.len(),
                self.slab.len()
            )));
        }
        if self.expiry.len() > self.slab.len() {
            return Err(InvariantError::new(format!(
                "expiry queue holds {} nodes but slab holds {}",
                self.expiry.len(),
                self.slab.len()
            )));
        }
        Ok(())
    }
}
