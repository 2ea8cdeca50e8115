//! Cache construction.
//!
//! [`Builder`] collects the options, validates them, and picks the node
//! layout and expiry queue the configuration needs:
//!
//! ```text
//!   ttl / variable_ttl ──► expiry queue   Disabled │ Fixed (FIFO) │ Variable (wheel)
//!   ttl or cost        ──► node layout    Base │ Cost │ Expiration │ ExpirationCost
//! ```
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//!
//! use s3cache::Builder;
//!
//! let cache = Builder::<String, Vec<u8>>::new(1 << 20)
//!     .cost(|_, v: &Vec<u8>| v.len() as u32)
//!     .ttl(Duration::from_secs(60))
//!     .build();
//! assert!(cache.set("blob".to_string(), vec![0; 512]));
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use tracing::debug;

use crate::cache::{Cache, CostFn, Core, DeletionCause, DeletionListener};
use crate::clock::Clock;
use crate::ds::{ShardedTable, WriteBuffer};
use crate::error::ConfigError;
use crate::expiry::{Disabled, ExpiryQueue, Fixed, Variable};
use crate::hasher::Hasher;
use crate::maintenance::Maintenance;
use crate::node::NodeManager;
use crate::policy::Policy;
use crate::stats::StatsCounters;

const DEFAULT_BUFFER_MIN: usize = 4;

fn default_buffer_max() -> usize {
    let parallelism = std::thread::available_parallelism().map_or(4, |n| n.get());
    (128 * parallelism).next_power_of_two()
}

/// Configures and builds a [`Cache`].
pub struct Builder<K, V> {
    capacity: u64,
    initial_capacity: Option<usize>,
    ttl: Option<Duration>,
    variable_ttl: bool,
    cost: Option<CostFn<K, V>>,
    listener: Option<DeletionListener<K, V>>,
    clock: Option<Clock>,
    buffer_min: usize,
    buffer_max: usize,
}

impl<K, V> Builder<K, V>
where
    K: Hash + Eq + Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    /// `capacity` is the maximum total cost; with unit costs, the entry count.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            initial_capacity: None,
            ttl: None,
            variable_ttl: false,
            cost: None,
            listener: None,
            clock: None,
            buffer_min: DEFAULT_BUFFER_MIN,
            buffer_max: default_buffer_max(),
        }
    }

    /// Expected number of entries, used to size the striped table.
    pub fn initial_capacity(mut self, entries: usize) -> Self {
        self.initial_capacity = Some(entries);
        self
    }

    /// Cache-wide time-to-live, rounded up to whole seconds. With
    /// [`variable_ttl`](Self::variable_ttl) it is the default for plain
    /// `set` calls.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Enables per-entry TTLs through [`Cache::set_with_ttl`].
    pub fn variable_ttl(mut self) -> Self {
        self.variable_ttl = true;
        self
    }

    /// Enables per-entry cost. Without it every entry costs 1.
    pub fn cost(mut self, cost: impl Fn(&K, &V) -> u32 + Send + Sync + 'static) -> Self {
        self.cost = Some(Arc::new(cost));
        self
    }

    /// Called from the maintenance thread for every entry that leaves the
    /// cache. See [`DeletionListener`] for the restrictions.
    pub fn deletion_listener(
        mut self,
        listener: impl Fn(&K, &V, DeletionCause) + Send + 'static,
    ) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    /// Uses `clock` instead of the process-wide [`Clock::shared`] one.
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Initial and maximum number of queued writes before `set` blocks.
    pub fn write_buffer(mut self, min: usize, max: usize) -> Self {
        self.buffer_min = min;
        self.buffer_max = max;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::new("capacity must be greater than zero"));
        }
        if self.ttl.is_some_and(|ttl| ttl.is_zero()) {
            return Err(ConfigError::new("ttl must be greater than zero"));
        }
        if self.buffer_min == 0 {
            return Err(ConfigError::new("write buffer minimum must be greater than zero"));
        }
        if self.buffer_max < self.buffer_min {
            return Err(ConfigError::new(format!(
                "write buffer maximum {} is below its minimum {}",
                self.buffer_max, self.buffer_min
            )));
        }
        if self.initial_capacity == Some(0) {
            return Err(ConfigError::new("initial_capacity must be greater than zero"));
        }
        Ok(())
    }

    /// Validates and assembles the shared core and the maintenance loop
    /// without starting its thread.
    pub(crate) fn into_parts(self) -> Result<(Arc<Core<K, V>>, Maintenance<K, V>), ConfigError> {
        self.validate()?;

        let clock = self.clock.unwrap_or_else(Clock::shared);
        let hasher = Hasher::new();
        let policy = Policy::new(self.capacity, hasher.clone());
        let with_expiration = self.variable_ttl || self.ttl.is_some();
        let expiry: Box<dyn ExpiryQueue<K, V>> = if self.variable_ttl {
            Box::new(Variable::new(clock.now()))
        } else if self.ttl.is_some() {
            Box::new(Fixed::new())
        } else {
            Box::new(Disabled)
        };
        let expected = self
            .initial_capacity
            .unwrap_or_else(|| usize::try_from(self.capacity).unwrap_or(usize::MAX));

        let core = Arc::new(Core {
            table: ShardedTable::new(expected),
            hasher,
            buffer: WriteBuffer::new(self.buffer_min, self.buffer_max),
            stats: StatsCounters::new(),
            clock: clock.reader(),
            nodes: NodeManager::new(with_expiration, self.cost.is_some()),
            capacity: self.capacity,
            max_entry_cost: policy.max_available_cost(),
            ttl: self.ttl,
            variable_ttl: self.variable_ttl,
            cost: self.cost,
            closed: AtomicBool::new(false),
        });
        let maintenance = Maintenance::new(Arc::clone(&core), policy, expiry, clock, self.listener);
        Ok((core, maintenance))
    }

    /// Builds the cache and starts its maintenance thread.
    pub fn try_build(self) -> Result<Cache<K, V>, ConfigError> {
        let (core, maintenance) = self.into_parts()?;
        let worker = std::thread::Builder::new()
            .name("s3cache-maintenance".into())
            .spawn(move || maintenance.run())
            .map_err(|err| ConfigError::new(format!("cannot spawn maintenance thread: {err}")))?;
        debug!(
            capacity = core.capacity,
            max_entry_cost = core.max_entry_cost,
            layout = ?core.nodes.layout(),
            "cache built"
        );
        Ok(Cache::from_parts(core, worker))
    }

    /// Like [`try_build`](Self::try_build).
    ///
    /// # Panics
    ///
    /// Panics on an invalid configuration.
    pub fn build(self) -> Cache<K, V> {
        match self.try_build() {
            Ok(cache) => cache,
            Err(err) => panic!("{err}"),
        }
    }
}

impl<K, V> fmt::Debug for Builder<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builder")
            .field("capacity", &self.capacity)
            .field("initial_capacity", &self.initial_capacity)
            .field("ttl", &self.ttl)
            .field("variable_ttl", &self.variable_ttl)
            .field("cost", &self.cost.is_some())
            .field("listener", &self.listener.is_some())
            .field("buffer", &(self.buffer_min, self.buffer_max))
            .finish_non_exhaustive()
    }
}
