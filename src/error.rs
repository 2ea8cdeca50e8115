//! Error types.
//!
//! - [`ConfigError`]: a [`Builder`](crate::Builder) was given settings the
//!   cache cannot run with. Returned by
//!   [`Builder::try_build`](crate::Builder::try_build); `build` panics with
//!   the same message.
//! - [`InvariantError`]: internal policy or expiry bookkeeping disagrees with
//!   itself. Only produced by the debug-build `check_invariants` hooks.
//!
//! Rejected writes are not errors: [`Cache::set`](crate::Cache::set) reports
//! them through its `bool` return and the `rejected_sets` counter.
//!
//! ```
//! use s3cache::Builder;
//!
//! let err = Builder::<u64, u64>::new(0).try_build().unwrap_err();
//! assert!(err.message().contains("capacity"));
//! ```

use std::fmt;

/// Internal bookkeeping is inconsistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violated: {}", self.0)
    }
}

impl std::error::Error for InvariantError {}

/// Invalid cache configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Human-readable description of the rejected setting.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid cache configuration: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_kind() {
        let err = ConfigError::new("capacity must be greater than zero");
        assert_eq!(
            err.to_string(),
            "invalid cache configuration: capacity must be greater than zero"
        );
        assert_eq!(err.message(), "capacity must be greater than zero");

        let err = InvariantError::new("Small queue: counted 3 but len = 2");
        assert!(err.to_string().starts_with("invariant violated: "));
    }

    #[test]
    fn both_are_std_errors() {
        fn boxed<E: std::error::Error + Send + Sync + 'static>(e: E) -> Box<dyn std::error::Error> {
            Box::new(e)
        }
        assert!(boxed(ConfigError::new("x")).to_string().contains('x'));
        assert!(boxed(InvariantError::new("y")).to_string().contains('y'));
    }
}
