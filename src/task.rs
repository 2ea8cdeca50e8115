//! Messages from the cache façade to the maintenance loop.
//!
//! Every table mutation is followed by exactly one [`Task`] pushed onto the
//! write buffer; the loop applies them in FIFO order. Control tasks carry a
//! [`Latch`] the caller blocks on until the loop has reached them.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::node::NodeRef;

/// Why a task was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Add,
    Delete,
    Update,
    Expired,
    Clear,
    Close,
    Barrier,
}

pub enum Task<K, V> {
    /// A new node was inserted into the table.
    Add(NodeRef<K, V>),
    /// `old` was replaced by `node` under the same key.
    Update {
        node: NodeRef<K, V>,
        old: NodeRef<K, V>,
    },
    /// The node was removed from the table by an explicit delete.
    Delete(NodeRef<K, V>),
    /// The node was found expired on the read path and removed.
    Expired(NodeRef<K, V>),
    /// The table was emptied; reset policy and expiry state.
    Clear(Arc<Latch>),
    /// Clear and stop the loop.
    Close,
    /// Released once every earlier task has been applied.
    Barrier(Arc<Latch>),
}

impl<K, V> Task<K, V> {
    pub fn reason(&self) -> Reason {
        match self {
            Task::Add(_) => Reason::Add,
            Task::Update { .. } => Reason::Update,
            Task::Delete(_) => Reason::Delete,
            Task::Expired(_) => Reason::Expired,
            Task::Clear(_) => Reason::Clear,
            Task::Close => Reason::Close,
            Task::Barrier(_) => Reason::Barrier,
        }
    }
}

impl<K, V> fmt::Debug for Task<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Task").field(&self.reason()).finish()
    }
}

/// One-shot gate: `wait` blocks until `release` has been called.
#[derive(Debug, Default)]
pub struct Latch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn release(&self) {
        *self.released.lock() = true;
        self.cond.notify_all();
    }

    pub fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.cond.wait(&mut released);
        }
    }
}
