//! Error types produced by the runtime itself.
//!
//! Effects carry their own, user-chosen error type in the `Left` channel.
//! The types here cover what the kernel adds on top: release failures from
//! the run scope, panics caught by [`catch_all`](crate::effect::catch_all),
//! and runtime construction problems.

use std::fmt;

use thiserror::Error;

/// Boxed error used on the release side, where handles of different types
/// (and with different error types) share one registry.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A single release action that failed when a run scope closed.
#[derive(Debug, Error)]
#[error("failed to release `{resource}`: {source}")]
pub struct ReleaseFailure {
    /// Label of the resource whose release failed
    pub resource: String,
    /// What went wrong
    #[source]
    pub source: BoxError,
}

/// Every release failure collected while closing one run scope.
///
/// Releases keep going after a failure, so a scope can report several.
/// The list is in release order (reverse acquisition order).
#[derive(Debug, Default)]
pub struct ReleaseErrors(Vec<ReleaseFailure>);

impl ReleaseErrors {
    pub(crate) fn push(&mut self, failure: ReleaseFailure) {
        self.0.push(failure);
    }

    /// Returns `true` if every release succeeded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failed releases.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over the failures in release order.
    pub fn iter(&self) -> std::slice::Iter<'_, ReleaseFailure> {
        self.0.iter()
    }

    /// Consume into the underlying list.
    pub fn into_vec(self) -> Vec<ReleaseFailure> {
        self.0
    }
}

impl fmt::Display for ReleaseErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} release(s) failed", self.0.len())?;
        for failure in &self.0 {
            write!(f, "\n  - {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ReleaseErrors {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0
            .first()
            .map(|failure| failure as &(dyn std::error::Error + 'static))
    }
}

impl IntoIterator for ReleaseErrors {
    type Item = ReleaseFailure;
    type IntoIter = std::vec::IntoIter<ReleaseFailure>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// A panic converted into a typed failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("panicked: {message}")]
pub struct Panicked {
    /// The panic message, or a placeholder for non-string payloads
    pub message: String,
}

impl Panicked {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        Self::from_payload_ref(payload.as_ref())
    }

    pub(crate) fn from_payload_ref(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&'static str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        Panicked { message }
    }
}

/// Errors raised while building or configuring a [`Runtime`](crate::Runtime).
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The underlying tokio runtime could not be built
    #[error("failed to build runtime: {0}")]
    Build(#[from] std::io::Error),

    /// A configuration value is out of range
    #[error("invalid runtime configuration `{field}`: {message}")]
    InvalidConfig {
        /// Name of the offending field
        field: String,
        /// Why the value was rejected
        message: String,
    },
}
