//! Cache entry records.
//!
//! A node carries the key, the value and the per-entry policy metadata. Four
//! memory layouts exist so a cache only pays for what it was configured with:
//!
//! ```text
//!   layout            │ header │ cost │ expiration + exp links
//!   ──────────────────┼────────┼──────┼───────────────────────
//!   Base              │   x    │      │
//!   Cost              │   x    │  x   │
//!   Expiration        │   x    │      │   x
//!   ExpirationCost    │   x    │  x   │   x
//! ```
//!
//! All layouts implement [`Node`]; the cache stores them as [`NodeRef`]
//! (`Arc<dyn Node>`), shared by the striped table and the maintenance loop.
//! Node identity is address identity, see [`same_node`].
//!
//! Intrusive links are slot indices into the maintenance loop's
//! [`SlotArena`](crate::ds::SlotArena), packed into relaxed atomics. Only the
//! maintenance thread writes them; readers on other threads only touch the
//! frequency counter and the liveness flag.

mod layouts;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

pub use layouts::{BaseNode, CostNode, ExpirationCostNode, ExpirationNode};

use crate::ds::{SlotArena, SlotId};

/// Expiration value of a node that never expires.
pub const NEVER_EXPIRES: u32 = u32::MAX;

/// Frequency counters saturate here (2 bits).
pub const MAX_FREQUENCY: u8 = 3;

/// Shared handle to a node of any layout.
pub type NodeRef<K, V> = Arc<dyn Node<K, V>>;

/// Maintenance-owned slab holding every node admitted to the policy.
pub type Slab<K, V> = SlotArena<NodeRef<K, V>>;

/// Returns `true` if both handles point at the same node.
#[inline]
pub fn same_node<K, V>(a: &NodeRef<K, V>, b: &NodeRef<K, V>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

const NIL: u32 = u32::MAX;
const ROOT_FLAG: u32 = 1 << 31;

/// Target of an intrusive link: another node's slot, or the root of a
/// circular list owned by an expiry queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Link {
    Node(SlotId),
    Root(u32),
}

impl Link {
    #[inline]
    fn pack(link: Option<Link>) -> u32 {
        match link {
            None => NIL,
            Some(Link::Node(id)) => id.0,
            Some(Link::Root(root)) => {
                debug_assert!(root < ROOT_FLAG - 1);
                ROOT_FLAG | root
            },
        }
    }

    #[inline]
    fn unpack(raw: u32) -> Option<Link> {
        if raw == NIL {
            None
        } else if raw & ROOT_FLAG != 0 {
            Some(Link::Root(raw & !ROOT_FLAG))
        } else {
            Some(Link::Node(SlotId(raw)))
        }
    }
}

/// One packed link.
#[derive(Debug)]
pub struct LinkCell(AtomicU32);

impl LinkCell {
    #[inline]
    pub fn empty() -> Self {
        Self(AtomicU32::new(NIL))
    }

    #[inline]
    pub fn get(&self) -> Option<Link> {
        Link::unpack(self.0.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, link: Option<Link>) {
        self.0.store(Link::pack(link), Ordering::Relaxed);
    }

    #[inline]
    fn get_slot(&self) -> Option<SlotId> {
        match self.get() {
            Some(Link::Node(id)) => Some(id),
            _ => None,
        }
    }

    #[inline]
    fn set_slot(&self, id: Option<SlotId>) {
        self.set(id.map(Link::Node));
    }
}

/// Expiration-queue links, present only in expiration-capable layouts.
#[derive(Debug)]
pub struct ExpLinks {
    prev: LinkCell,
    next: LinkCell,
}

impl ExpLinks {
    pub fn new() -> Self {
        Self {
            prev: LinkCell::empty(),
            next: LinkCell::empty(),
        }
    }
}

// ---------------------------------------------------------------------------
// Header
// ---------------------------------------------------------------------------

/// Which eviction sub-queue a node sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueTag {
    Unqueued,
    Small,
    Main,
}

const TAG_UNQUEUED: u8 = 0;
const TAG_SMALL: u8 = 1;
const TAG_MAIN: u8 = 2;

/// Metadata common to every layout.
#[derive(Debug)]
pub struct Header {
    slot: LinkCell,
    prev: LinkCell,
    next: LinkCell,
    alive: AtomicBool,
    queue: AtomicU8,
    frequency: AtomicU8,
}

impl Header {
    pub fn new() -> Self {
        Self {
            slot: LinkCell::empty(),
            prev: LinkCell::empty(),
            next: LinkCell::empty(),
            alive: AtomicBool::new(true),
            queue: AtomicU8::new(TAG_UNQUEUED),
            frequency: AtomicU8::new(0),
        }
    }
}

#[cold]
#[inline(never)]
fn expiration_unsupported() -> ! {
    panic!("expiration links are not supported by this node layout")
}

// ---------------------------------------------------------------------------
// Node contract
// ---------------------------------------------------------------------------

/// Contract shared by all node layouts.
///
/// Layouts provide storage accessors; everything else is derived from the
/// [`Header`] and, for expiration-capable layouts, [`ExpLinks`].
pub trait Node<K, V>: Send + Sync {
    fn key(&self) -> &K;

    fn value(&self) -> &V;

    fn header(&self) -> &Header;

    /// Seconds since clock start at which the entry expires.
    fn expiration(&self) -> u32 {
        NEVER_EXPIRES
    }

    fn cost(&self) -> u32 {
        1
    }

    fn exp_links(&self) -> Option<&ExpLinks> {
        None
    }

    /// Slot the node occupies in the maintenance slab.
    #[inline]
    fn slot(&self) -> Option<SlotId> {
        self.header().slot.get_slot()
    }

    #[inline]
    fn set_slot(&self, slot: Option<SlotId>) {
        self.header().slot.set_slot(slot);
    }

    #[inline]
    fn prev(&self) -> Option<SlotId> {
        self.header().prev.get_slot()
    }

    #[inline]
    fn set_prev(&self, prev: Option<SlotId>) {
        self.header().prev.set_slot(prev);
    }

    #[inline]
    fn next(&self) -> Option<SlotId> {
        self.header().next.get_slot()
    }

    #[inline]
    fn set_next(&self, next: Option<SlotId>) {
        self.header().next.set_slot(next);
    }

    /// # Panics
    ///
    /// Panics on layouts without expiration support.
    #[inline]
    fn prev_exp(&self) -> Option<Link> {
        match self.exp_links() {
            Some(links) => links.prev.get(),
            None => expiration_unsupported(),
        }
    }

    /// # Panics
    ///
    /// Panics on layouts without expiration support.
    #[inline]
    fn set_prev_exp(&self, prev: Option<Link>) {
        match self.exp_links() {
            Some(links) => links.prev.set(prev),
            None => expiration_unsupported(),
        }
    }

    /// # Panics
    ///
    /// Panics on layouts without expiration support.
    #[inline]
    fn next_exp(&self) -> Option<Link> {
        match self.exp_links() {
            Some(links) => links.next.get(),
            None => expiration_unsupported(),
        }
    }

    /// # Panics
    ///
    /// Panics on layouts without expiration support.
    #[inline]
    fn set_next_exp(&self, next: Option<Link>) {
        match self.exp_links() {
            Some(links) => links.next.set(next),
            None => expiration_unsupported(),
        }
    }

    /// `true` once `now` has reached the expiration second.
    #[inline]
    fn has_expired(&self, now: u32) -> bool {
        let expiration = self.expiration();
        expiration != NEVER_EXPIRES && expiration <= now
    }

    #[inline]
    fn is_alive(&self) -> bool {
        self.header().alive.load(Ordering::Acquire)
    }

    #[inline]
    fn die(&self) {
        self.header().alive.store(false, Ordering::Release);
    }

    #[inline]
    fn frequency(&self) -> u8 {
        self.header().frequency.load(Ordering::Relaxed)
    }

    /// Saturating increment; safe from any thread.
    #[inline]
    fn increment_frequency(&self) {
        let _ = self
            .header()
            .frequency
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |f| {
                if f < MAX_FREQUENCY { Some(f + 1) } else { None }
            });
    }

    /// Unchecked at zero: eviction only decrements nodes with frequency > 0.
    #[inline]
    fn decrement_frequency(&self) {
        self.header().frequency.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    fn reset_frequency(&self) {
        self.header().frequency.store(0, Ordering::Relaxed);
    }

    #[inline]
    fn mark_small(&self) {
        self.header().queue.store(TAG_SMALL, Ordering::Relaxed);
    }

    #[inline]
    fn mark_main(&self) {
        self.header().queue.store(TAG_MAIN, Ordering::Relaxed);
    }

    #[inline]
    fn unmark(&self) {
        self.header().queue.store(TAG_UNQUEUED, Ordering::Relaxed);
    }

    #[inline]
    fn is_small(&self) -> bool {
        self.header().queue.load(Ordering::Relaxed) == TAG_SMALL
    }

    #[inline]
    fn is_main(&self) -> bool {
        self.header().queue.load(Ordering::Relaxed) == TAG_MAIN
    }

    #[inline]
    fn queue(&self) -> QueueTag {
        match self.header().queue.load(Ordering::Relaxed) {
            TAG_SMALL => QueueTag::Small,
            TAG_MAIN => QueueTag::Main,
            _ => QueueTag::Unqueued,
        }
    }
}

// ---------------------------------------------------------------------------
// Manager
// ---------------------------------------------------------------------------

/// Concrete layout chosen for a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Base,
    Cost,
    Expiration,
    ExpirationCost,
}

/// Creates nodes of the layout selected at cache construction.
#[derive(Debug, Clone, Copy)]
pub struct NodeManager {
    layout: Layout,
}

impl NodeManager {
    pub fn new(with_expiration: bool, with_cost: bool) -> Self {
        let layout = match (with_expiration, with_cost) {
            (false, false) => Layout::Base,
            (false, true) => Layout::Cost,
            (true, false) => Layout::Expiration,
            (true, true) => Layout::ExpirationCost,
        };
        Self { layout }
    }

    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Builds a node. `expiration` and `cost` are dropped by layouts that
    /// do not store them.
    pub fn create<K, V>(&self, key: K, value: V, expiration: u32, cost: u32) -> NodeRef<K, V>
    where
        K: Send + Sync + 'static,
        V: Send + Sync + 'static,
    {
        match self.layout {
            Layout::Base => Arc::new(BaseNode::new(key, value)),
            Layout::Cost => Arc::new(CostNode::new(key, value, cost)),
            Layout::Expiration => Arc::new(ExpirationNode::new(key, value, expiration)),
            Layout::ExpirationCost => {
                Arc::new(ExpirationCostNode::new(key, value, expiration, cost))
            },
        }
    }
}
