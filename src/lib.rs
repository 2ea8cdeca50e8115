//! s3cache: a concurrent, bounded, in-process cache with S3-FIFO eviction.
//!
//! Reads go straight to a striped hash table; writes update the table and
//! queue a task for a per-cache maintenance thread that owns the eviction
//! policy (Small/Main/Ghost queues) and the expiration queue. Entries carry
//! an optional cost and an optional time-to-live at one-second granularity.
//!
//! ```
//! use std::time::Duration;
//!
//! use s3cache::{Builder, DeletionCause};
//!
//! let cache = Builder::<u64, String>::new(1_000)
//!     .ttl(Duration::from_secs(300))
//!     .deletion_listener(|key, _, cause| {
//!         if cause == DeletionCause::Size {
//!             eprintln!("evicted {key}");
//!         }
//!     })
//!     .build();
//!
//! cache.set(1, "one".to_string());
//! assert_eq!(cache.get(&1).as_deref(), Some("one"));
//! println!("{}", cache.stats());
//! ```

pub mod builder;
pub mod cache;
pub mod clock;
pub mod error;
pub mod extension;
pub mod prelude;
pub mod stats;

mod ds;
mod expiry;
mod hasher;
mod maintenance;
mod node;
mod policy;
mod task;

pub use crate::builder::Builder;
pub use crate::cache::{Cache, CostFn, DeletionCause, DeletionListener};
pub use crate::clock::Clock;
pub use crate::error::{ConfigError, InvariantError};
pub use crate::extension::{Entry, Extension, PolicyInfo};
pub use crate::node::QueueTag;
pub use crate::stats::Stats;
