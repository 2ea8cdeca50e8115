//! Slab of live nodes owned by the maintenance loop.
//!
//! Every node admitted into the eviction policy gets a [`SlotId`] here. The
//! intrusive queues link nodes by slot index instead of pointers, and the
//! free list hands released slots back out, so node bookkeeping never
//! allocates once the slab has warmed up.
//!
//! ```text
//!   slots: Vec<Option<T>>                 free_list: Vec<u32>
//!   ┌─────┬──────────────┐                ┌───┬───┐
//!   │  0  │ Some(node a) │                │ 1 │ 3 │  (LIFO reuse)
//!   │  1  │ None         │◄───────────────┘   │   │
//!   │  2  │ Some(node c) │                    │   │
//!   │  3  │ None         │◄───────────────────┘   │
//!   └─────┴──────────────┘
//! ```
//!
//! Slot indices are 31-bit: the top bit of a packed link is reserved for
//! list roots (see [`Link`](crate::node::Link)).

/// Largest slot index a link can address.
pub(crate) const MAX_SLOTS: usize = (1 << 31) - 1;

/// Stable handle to a slot in a [`SlotArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub(crate) u32);

impl SlotId {
    /// Returns the slot index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Vec-backed slab with slot reuse.
#[derive(Debug)]
pub struct SlotArena<T> {
    slots: Vec<Option<T>>,
    free_list: Vec<u32>,
    len: usize,
}

impl<T> SlotArena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            len: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free_list: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value` and returns its slot.
    ///
    /// # Panics
    ///
    /// Panics if the arena already addresses [`MAX_SLOTS`] slots.
    pub fn insert(&mut self, value: T) -> SlotId {
        let idx = if let Some(idx) = self.free_list.pop() {
            self.slots[idx as usize] = Some(value);
            idx
        } else {
            assert!(self.slots.len() < MAX_SLOTS, "slot arena exhausted");
            self.slots.push(Some(value));
            (self.slots.len() - 1) as u32
        };
        self.len += 1;
        SlotId(idx)
    }

    /// Frees the slot and returns its value; `None` if it was already free.
    pub fn remove(&mut self, id: SlotId) -> Option<T> {
        let value = self.slots.get_mut(id.index())?.take()?;
        self.free_list.push(id.0);
        self.len -= 1;
        Some(value)
    }

    #[inline]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drops every value and forgets all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.free_list.clear();
        self.len = 0;
    }

    /// Iterates occupied slots in index order.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|value| (SlotId(idx as u32), value)))
    }
}

impl<T> Default for SlotArena<T> {
    fn default() -> Self {
        Self::new()
    }
}
