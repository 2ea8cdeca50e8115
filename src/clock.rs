//! Coarse, reference-counted clock.
//!
//! Expiration only needs second granularity, so instead of reading the system
//! clock on every `get` the cache reads an atomic that a background ticker
//! refreshes once per second.
//!
//! ```text
//!   Clock (counted handle) ──┐
//!   Clock (counted handle) ──┼──► Inner { start, now: AtomicU32 } ◄── ticker thread
//!   ClockReader (uncounted) ─┘                                         (1 Hz)
//! ```
//!
//! Caches built without an explicit clock take a handle to the process-wide
//! clock from [`Clock::shared`], so one ticker serves all of them. The
//! ticker stops and is joined when the last counted handle is dropped; a
//! cache releases its handle when its maintenance loop exits on close. The
//! next [`Clock::shared`] call then starts a fresh one.
//!
//! [`Clock::manual`] builds a clock without a ticker that only moves through
//! [`Clock::advance`], for deterministic tests.

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::{Condvar, Mutex};
use tracing::debug;

const TICK: Duration = Duration::from_secs(1);

static SHARED: Mutex<Weak<Inner>> = Mutex::new(Weak::new());

struct Inner {
    start: Instant,
    start_wall: SystemTime,
    now: AtomicU32,
    handles: AtomicUsize,
    stopped: Mutex<bool>,
    wakeup: Condvar,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            start_wall: SystemTime::now(),
            now: AtomicU32::new(0),
            handles: AtomicUsize::new(1),
            stopped: Mutex::new(false),
            wakeup: Condvar::new(),
            ticker: Mutex::new(None),
        }
    }

    fn refresh(&self) {
        let elapsed = self.start.elapsed().as_secs().min(u64::from(u32::MAX - 1));
        self.now.store(elapsed as u32, Ordering::Release);
    }

    fn run(&self) {
        let mut stopped = self.stopped.lock();
        while !*stopped {
            self.wakeup.wait_for(&mut stopped, TICK);
            self.refresh();
        }
    }

    fn stop(&self) {
        *self.stopped.lock() = true;
        self.wakeup.notify_all();
        if let Some(handle) = self.ticker.lock().take() {
            let _ = handle.join();
            debug!("clock ticker stopped");
        }
    }
}

/// Counted handle to a coarse clock.
pub struct Clock {
    inner: Arc<Inner>,
}

impl Clock {
    /// Starts a clock with its own 1 Hz ticker thread.
    pub fn new() -> Self {
        let inner = Arc::new(Inner::new());
        let ticker = Arc::clone(&inner);
        let spawned = std::thread::Builder::new()
            .name("s3cache-clock".into())
            .spawn(move || ticker.run());
        match spawned {
            Ok(handle) => {
                *inner.ticker.lock() = Some(handle);
                debug!("clock ticker started");
            },
            // Without a ticker the clock still answers; it just never advances
            // on its own, which only delays expiration.
            Err(err) => debug!(error = %err, "clock ticker could not be spawned"),
        }
        Self { inner }
    }

    /// Returns a handle to the process-wide clock, starting its ticker if
    /// no counted handle to it is alive.
    pub fn shared() -> Self {
        let mut shared = SHARED.lock();
        if let Some(inner) = shared.upgrade() {
            // A count of zero means the ticker is stopping; never revive it.
            let revived = inner
                .handles
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                    (n > 0).then_some(n + 1)
                })
                .is_ok();
            if revived {
                return Self { inner };
            }
        }
        let clock = Self::new();
        *shared = Arc::downgrade(&clock.inner);
        clock
    }

    /// Returns `true` if both handles point at the same clock.
    pub fn ptr_eq(&self, other: &Clock) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Builds a clock that only advances through [`advance`](Self::advance).
    pub fn manual() -> Self {
        Self {
            inner: Arc::new(Inner::new()),
        }
    }

    /// Moves a manual clock forward. On a ticking clock the next tick
    /// overwrites the value with real elapsed time.
    pub fn advance(&self, by: Duration) {
        let secs = by.as_secs().min(u64::from(u32::MAX)) as u32;
        let _ = self
            .inner
            .now
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |now| {
                Some(now.saturating_add(secs).min(u32::MAX - 1))
            });
    }

    /// Seconds since the clock started.
    #[inline]
    pub fn now(&self) -> u32 {
        self.inner.now.load(Ordering::Acquire)
    }

    /// Wall-clock time at which the clock started.
    pub fn start_time(&self) -> SystemTime {
        self.inner.start_wall
    }

    /// Returns `true` while the background ticker thread is alive.
    pub fn is_ticking(&self) -> bool {
        self.inner.ticker.lock().is_some()
    }

    /// Number of counted handles sharing this clock.
    pub fn handle_count(&self) -> usize {
        self.inner.handles.load(Ordering::Acquire)
    }

    /// Uncounted view for hot-path reads.
    pub(crate) fn reader(&self) -> ClockReader {
        ClockReader {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::shared()
    }
}

impl Clone for Clock {
    fn clone(&self) -> Self {
        self.inner.handles.fetch_add(1, Ordering::AcqRel);
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        if self.inner.handles.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.stop();
        }
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Clock")
            .field("now", &self.now())
            .field("handles", &self.handle_count())
            .finish_non_exhaustive()
    }
}

/// Read-only view of a [`Clock`] that does not keep the ticker alive.
#[derive(Clone)]
pub(crate) struct ClockReader {
    inner: Arc<Inner>,
}

impl ClockReader {
    #[inline]
    pub fn now(&self) -> u32 {
        self.inner.now.load(Ordering::Acquire)
    }

    /// Converts a relative expiration second to wall-clock time.
    pub fn to_system_time(&self, secs: u32) -> SystemTime {
        self.inner.start_wall + Duration::from_secs(u64::from(secs))
    }
}

impl fmt::Debug for ClockReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockReader")
            .field("now", &self.now())
            .finish_non_exhaustive()
    }
}
