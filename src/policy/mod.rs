//! Eviction policy.
//!
//! Only S3-FIFO is implemented. [`Policy`] is owned by the maintenance loop;
//! [`queue`] and [`ghost`] are its building blocks.

pub mod ghost;
pub mod queue;
pub mod s3_fifo;

pub use s3_fifo::Policy;
