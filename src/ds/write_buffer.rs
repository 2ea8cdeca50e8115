//! Bounded, blocking, growable FIFO used as the cache's write buffer.
//!
//! Many producers, one consumer. The ring starts at `min_capacity` slots and
//! doubles on demand up to `max_capacity`; once it holds `max_capacity`
//! items, producers block until the consumer catches up. It shrinks back by
//! halves when it drains below a quarter of its current size.
//!
//! ```text
//!   producers ──push──► [ t0 | t1 | t2 | .. ]  ──pop──► maintenance loop
//!                         ▲                  ▲
//!                       grows x2          blocks at max
//! ```
//!
//! Closing the buffer wakes everyone: pending and later pushes are refused,
//! pops return `None` once the remaining items are drained.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    capacity: usize,
    closed: bool,
}

#[derive(Debug)]
pub struct WriteBuffer<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    min_capacity: usize,
    max_capacity: usize,
}

impl<T> WriteBuffer<T> {
    /// Both bounds are clamped to at least 1 and `max >= min`.
    pub fn new(min_capacity: usize, max_capacity: usize) -> Self {
        let min_capacity = min_capacity.max(1);
        let max_capacity = max_capacity.max(min_capacity);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(min_capacity),
                capacity: min_capacity,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            min_capacity,
            max_capacity,
        }
    }

    /// Appends `item`, blocking while the buffer is at its maximum size.
    ///
    /// Returns the item back if the buffer has been closed.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut state = self.state.lock();
        while !state.closed && state.items.len() >= self.max_capacity {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(item);
        }
        if state.items.len() == state.capacity {
            state.capacity = (state.capacity * 2).min(self.max_capacity);
            let additional = state.capacity - state.items.len();
            state.items.reserve(additional);
        }
        state.items.push_back(item);
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Removes the oldest item, blocking while empty. `None` once closed and
    /// drained.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.take_front(&mut state) {
                return Some(item);
            }
            if state.closed {
                return None;
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(item) = self.take_front(&mut state) {
                return Some(item);
            }
            if state.closed || self.not_empty.wait_until(&mut state, deadline).timed_out() {
                return self.take_front(&mut state);
            }
        }
    }

    /// Refuses further pushes and wakes all waiters.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current ring size (between the configured bounds).
    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    fn take_front(&self, state: &mut State<T>) -> Option<T> {
        let item = state.items.pop_front()?;
        if state.capacity > self.min_capacity && state.items.len() < state.capacity / 4 {
            state.capacity = (state.capacity / 2).max(self.min_capacity);
            let capacity = state.capacity;
            state.items.shrink_to(capacity);
        }
        self.not_full.notify_one();
        Some(item)
    }
}
