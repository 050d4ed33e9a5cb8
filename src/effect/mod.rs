//! The effect kernel.
//!
//! An [`Effect<R, E, A>`] is a deferred description of a computation that
//! needs an environment `R` and eventually yields either a typed failure `E`
//! or a value `A`. Building and composing effects performs no work; only
//! [`Effect::run`] does.
//!
//! # Evaluation model
//!
//! Evaluating an effect against a [`RuntimeContext`] produces a
//! [`Trampoline`] of an [`Either`]. Every combinator in this module threads
//! its continuation through [`Trampoline::and_then`] and reaches nested
//! effects through a `Call` step, so the driver loop, not the call stack,
//! absorbs composition depth. Asynchronous work (timers, I/O, lock waits)
//! enters the loop as a `Suspend` step.
//!
//! ```rust
//! use millrace::effect::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let mut effect = pure::<(), String, u64>(0);
//! for _ in 0..10_000 {
//!     effect = effect.and_then(|n| pure(n + 1));
//! }
//! assert_eq!(effect.run(()).await, Ok(10_000));
//! # });
//! ```
//!
//! # Error channels
//!
//! Typed failures travel in `Left` and are handled with
//! [`recover`](Effect::recover), [`either`](Effect::either) and
//! [`map_err`](Effect::map_err). There are no union error types, so
//! [`and_then`](Effect::and_then) keeps the error type fixed; convert with
//! `map_err` first, or lift an `Effect<R, Never, A>` with
//! [`widen`](Effect::widen).
//!
//! A panic inside an effect is an unchecked fault: combinators do not see it,
//! [`run`](Effect::run) releases the run's resources and then resumes the
//! unwind. Use [`catch`](constructors::catch) or
//! [`catch_all`](constructors::catch_all) at the boundary of code that may
//! panic on expected conditions.

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::Arc;

use futures::FutureExt;

use crate::context::RuntimeContext;
use crate::defer::Deferred;
use crate::either::Either;
use crate::error::{Panicked, ReleaseErrors};
use crate::trampoline::Trampoline;

pub mod bracket;
pub mod combinators;
pub mod constructors;
pub mod parallel;
pub mod prelude;
pub mod tracing;

pub use bracket::{bracket, bracket_full, BracketError};
pub use constructors::{
    asks, catch, catch_all, environment, error, fail, from_async, from_fn, from_result, pure,
    sleep, success, suspend,
};
pub use parallel::{filter_m, map_m, race, sequence, timeout};

/// A boxed, sendable future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The error type of an effect that cannot fail.
pub type Never = std::convert::Infallible;

type RunFn<R, E, A> =
    dyn Fn(&RuntimeContext<R>) -> Trampoline<Either<E, A>> + Send + Sync + 'static;

/// A deferred computation needing an `R`, failing with `E` or producing `A`.
///
/// Effects are immutable and cheap to clone; every combinator returns a new
/// effect. The same effect may be run any number of times.
pub struct Effect<R: 'static, E: 'static, A: 'static> {
    run_fn: Deferred<Arc<RunFn<R, E, A>>>,
    label: Option<Cow<'static, str>>,
}

impl<R: 'static, E: 'static, A: 'static> Clone for Effect<R, E, A> {
    fn clone(&self) -> Self {
        Effect {
            run_fn: Deferred::new(Arc::clone(self.run_fn.get())),
            label: self.label.clone(),
        }
    }
}

impl<R: 'static, E: 'static, A: 'static> fmt::Debug for Effect<R, E, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("label", &self.label)
            .field("run_fn", &"<function>")
            .finish()
    }
}

/// Result of [`Effect::run_detailed`].
#[derive(Debug)]
pub struct RunOutcome<E, A> {
    /// What the effect produced
    pub result: Result<A, E>,
    /// Release actions that failed while the run scope closed
    pub release_errors: ReleaseErrors,
}

impl<R, E, A> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Build an effect from its evaluation function.
    ///
    /// This is the primitive every constructor is built on. The function is
    /// called once per evaluation and must only describe work: anything
    /// expensive belongs in the returned trampoline.
    pub fn new<F>(run_fn: F) -> Self
    where
        F: Fn(&RuntimeContext<R>) -> Trampoline<Either<E, A>> + Send + Sync + 'static,
    {
        Effect {
            run_fn: Deferred::new(Arc::new(run_fn)),
            label: None,
        }
    }

    /// Attach a diagnostic label, reported in logs.
    pub fn named(mut self, label: impl Into<Cow<'static, str>>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// The diagnostic label, if any.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Evaluate one level: call the effect's function.
    pub fn step(&self, ctx: &RuntimeContext<R>) -> Trampoline<Either<E, A>> {
        (self.run_fn.get())(ctx)
    }

    /// A trampoline that evaluates this effect when the driver reaches it.
    pub(crate) fn deferred(self, ctx: &RuntimeContext<R>) -> Trampoline<Either<E, A>> {
        let ctx = ctx.clone();
        Trampoline::call(move || self.step(&ctx))
    }

    pub(crate) fn deferred_step(&self, ctx: &RuntimeContext<R>) -> Trampoline<Either<E, A>> {
        self.clone().deferred(ctx)
    }

    /// Drive the effect to an `Either` inside an existing run scope.
    pub async fn evaluate(&self, ctx: &RuntimeContext<R>) -> Either<E, A> {
        self.step(ctx).resolve().await
    }

    /// Run the effect with `environment`.
    ///
    /// Opens a fresh run scope, evaluates the effect, releases every resource
    /// acquired during the run in reverse order, then returns the outcome.
    /// Release failures are logged; use [`run_detailed`](Effect::run_detailed)
    /// to inspect them.
    ///
    /// # Panics
    ///
    /// A panic raised while evaluating the effect is resumed after the
    /// releases have completed.
    pub async fn run(&self, environment: R) -> Result<A, E> {
        self.run_detailed(environment).await.result
    }

    /// Like [`run`](Effect::run), but also reports release failures.
    pub async fn run_detailed(&self, environment: R) -> RunOutcome<E, A> {
        let ctx = RuntimeContext::new(environment);
        let run_id = ctx.run_id();
        let label = self.label().unwrap_or("<anonymous>");
        ::tracing::debug!(%run_id, effect = label, "run started");

        let outcome = AssertUnwindSafe(self.evaluate(&ctx)).catch_unwind().await;
        let release_errors = ctx.close().await;

        match outcome {
            Ok(either) => {
                ::tracing::debug!(
                    %run_id,
                    effect = label,
                    succeeded = either.is_right(),
                    release_failures = release_errors.len(),
                    "run finished"
                );
                RunOutcome {
                    result: either.into_result(),
                    release_errors,
                }
            }
            Err(payload) => {
                let message = Panicked::from_payload_ref(payload.as_ref());
                ::tracing::error!(%run_id, effect = label, panic = %message, "run aborted by panic");
                std::panic::resume_unwind(payload)
            }
        }
    }
}

#[cfg(test)]
mod tests;
