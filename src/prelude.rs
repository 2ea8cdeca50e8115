pub use crate::builder::Builder;
pub use crate::cache::{Cache, DeletionCause};
pub use crate::clock::Clock;
pub use crate::error::ConfigError;
pub use crate::extension::{Entry, PolicyInfo};
pub use crate::node::QueueTag;
pub use crate::stats::Stats;
