//! # Millrace
//!
//! A lazy, composable effect runtime kernel.
//!
//! An [`Effect<R, E, A>`](Effect) is a description of a computation that reads
//! an environment `R`, may fail with `E`, and succeeds with `A`. Building and
//! combining effects performs no work; [`Effect::run`] evaluates one against
//! an environment inside a fresh run scope.
//!
//! ## Pieces
//!
//! - [`Either`]: the right-biased success/failure value effects produce.
//! - [`Trampoline`]: the stack-safe step machine every effect evaluates to,
//!   so chains of any length run in constant stack.
//! - [`RuntimeContext`]: the environment plus the run's
//!   [`ScopedReleaseRegistry`], drained in reverse order when the run ends.
//! - [`Resource`]: a lazily acquired handle, memoized per run and released at
//!   run end.
//! - [`Ref`]: a lock-guarded mutable cell.
//! - [`Runtime`]: blocking execution on a configured tokio runtime.
//!
//! ## Quick Example
//!
//! ```rust
//! use millrace::effect::prelude::*;
//!
//! struct Env {
//!     threshold: u32,
//! }
//!
//! fn check(value: u32) -> Effect<Env, String, u32> {
//!     asks(|env: &Env| env.threshold).and_then(move |limit| {
//!         if value <= limit {
//!             pure(value)
//!         } else {
//!             fail(format!("{} exceeds {}", value, limit))
//!         }
//!     })
//! }
//!
//! # tokio_test::block_on(async {
//! let effect: Effect<Env, String, u32> = check(12).map(|v| v * 2).recover(|_| pure(0));
//! assert_eq!(effect.run(Env { threshold: 20 }).await, Ok(24));
//! assert_eq!(effect.run(Env { threshold: 5 }).await, Ok(0));
//! # });
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]

mod defer;

pub mod context;
pub mod effect;
pub mod either;
pub mod error;
pub mod refs;
pub mod resource;
pub mod runtime;
pub mod testing;
pub mod trampoline;

// Re-exports
pub use context::{RunId, RuntimeContext, ScopedReleaseRegistry};
pub use effect::{BoxFuture, BracketError, Effect, Never, RunOutcome};
pub use either::Either;
pub use error::{BoxError, Panicked, ReleaseErrors, ReleaseFailure, RuntimeError};
pub use refs::Ref;
pub use resource::Resource;
pub use runtime::{Runtime, RuntimeConfig};
pub use trampoline::Trampoline;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::effect::prelude::*;
    pub use crate::error::{ReleaseErrors, RuntimeError};
    pub use crate::runtime::{Runtime, RuntimeConfig};
    pub use crate::trampoline::Trampoline;
}
