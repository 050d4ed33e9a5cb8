//! Bracket pattern for acquire/use/release.
//!
//! - [`bracket`] - release runs after use on both channels; release cannot fail
//! - [`bracket_full`] - release may fail; every failure is kept in a [`BracketError`]
//!
//! Brackets release as soon as the use phase finishes. For handles that
//! should live for the rest of the run and be shared between call sites,
//! use a [`Resource`](crate::Resource) instead.
//!
//! # Example
//!
//! ```rust
//! use millrace::effect::prelude::*;
//! use std::sync::{Arc, Mutex};
//!
//! # tokio_test::block_on(async {
//! let log = Arc::new(Mutex::new(Vec::new()));
//! let (open_log, close_log) = (Arc::clone(&log), Arc::clone(&log));
//!
//! let effect = bracket(
//!     from_fn::<(), String, _, _>(move |_| {
//!         open_log.lock().unwrap().push("open");
//!         Ok("conn-1")
//!     }),
//!     move |conn| {
//!         let close_log = Arc::clone(&close_log);
//!         from_fn(move |_| {
//!             close_log.lock().unwrap().push("close");
//!             let _ = conn;
//!             Ok(())
//!         })
//!     },
//!     |conn| pure(conn.len()),
//! );
//!
//! assert_eq!(effect.run(()).await, Ok(6));
//! assert_eq!(*log.lock().unwrap(), vec!["open", "close"]);
//! # });
//! ```

use std::fmt;
use std::sync::Arc;

use crate::effect::{Effect, Never};
use crate::either::Either;
use crate::trampoline::Trampoline;

/// Failure of a bracket or [`ensure_full`](Effect::ensure_full), tagged
/// with the stage that produced it.
///
/// A failed acquisition stops everything. Once the body has run, its
/// finalizer always runs too, so body and finalizer failures can arrive
/// together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BracketError<E> {
    /// Nothing was acquired.
    Acquire(E),
    /// The body failed; its finalizer completed.
    Body(E),
    /// The body completed but its finalizer did not.
    Finalizer(E),
    /// Body and finalizer both failed.
    BodyAndFinalizer {
        /// What the body failed with
        body: E,
        /// What the finalizer failed with afterwards
        finalizer: E,
    },
}

impl<E> BracketError<E> {
    /// The acquisition failure, if that is where things stopped.
    pub fn acquire_failure(&self) -> Option<&E> {
        match self {
            BracketError::Acquire(e) => Some(e),
            _ => None,
        }
    }

    /// The body's failure, including when the finalizer failed as well.
    pub fn body_failure(&self) -> Option<&E> {
        match self {
            BracketError::Body(e) | BracketError::BodyAndFinalizer { body: e, .. } => Some(e),
            _ => None,
        }
    }

    /// The finalizer's failure, including when the body failed as well.
    pub fn finalizer_failure(&self) -> Option<&E> {
        match self {
            BracketError::Finalizer(e) | BracketError::BodyAndFinalizer { finalizer: e, .. } => {
                Some(e)
            }
            _ => None,
        }
    }

    /// Convert every carried failure with `f`.
    pub fn map<F, E2>(self, f: F) -> BracketError<E2>
    where
        F: Fn(E) -> E2,
    {
        match self {
            BracketError::Acquire(e) => BracketError::Acquire(f(e)),
            BracketError::Body(e) => BracketError::Body(f(e)),
            BracketError::Finalizer(e) => BracketError::Finalizer(f(e)),
            BracketError::BodyAndFinalizer { body, finalizer } => BracketError::BodyAndFinalizer {
                body: f(body),
                finalizer: f(finalizer),
            },
        }
    }
}

impl<E: fmt::Display> fmt::Display for BracketError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketError::Acquire(e) => write!(f, "could not acquire: {}", e),
            BracketError::Body(e) => write!(f, "{}", e),
            BracketError::Finalizer(e) => write!(f, "finalizer failed: {}", e),
            BracketError::BodyAndFinalizer { body, finalizer } => {
                write!(f, "{} (finalizer also failed: {})", body, finalizer)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for BracketError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BracketError::Acquire(e)
            | BracketError::Body(e)
            | BracketError::Finalizer(e)
            | BracketError::BodyAndFinalizer { body: e, .. } => Some(e),
        }
    }
}

/// Merge a primary outcome with its finalizer's outcome.
pub(crate) fn combine<E, A, B>(
    outcome: Either<E, A>,
    cleanup: Either<E, B>,
) -> Either<BracketError<E>, A> {
    match (outcome, cleanup) {
        (Either::Right(value), Either::Right(_)) => Either::Right(value),
        (Either::Right(_), Either::Left(finalizer)) => Either::Left(BracketError::Finalizer(finalizer)),
        (Either::Left(body), Either::Right(_)) => Either::Left(BracketError::Body(body)),
        (Either::Left(body), Either::Left(finalizer)) => {
            Either::Left(BracketError::BodyAndFinalizer { body, finalizer })
        }
    }
}

/// Acquire a value, use it, then release it whatever the use phase did.
///
/// `release` receives the acquired value by move once `use_fn` has finished.
/// If `acquire` fails, neither `use_fn` nor `release` runs.
pub fn bracket<R, E, T, B, Rel, Use>(
    acquire: Effect<R, E, T>,
    release: Rel,
    use_fn: Use,
) -> Effect<R, E, B>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    T: Send + 'static,
    B: Send + 'static,
    Rel: Fn(T) -> Effect<R, Never, ()> + Send + Sync + 'static,
    Use: Fn(&T) -> Effect<R, E, B> + Send + Sync + 'static,
{
    let release = Arc::new(release);
    let use_fn = Arc::new(use_fn);
    Effect::new(move |ctx| {
        let (release, use_fn) = (Arc::clone(&release), Arc::clone(&use_fn));
        let ctx_next = ctx.clone();
        acquire.deferred_step(ctx).and_then(move |acquired| match acquired {
            Either::Left(err) => Trampoline::done(Either::Left(err)),
            Either::Right(resource) => {
                let ctx_release = ctx_next.clone();
                use_fn(&resource).deferred(&ctx_next).and_then(move |outcome| {
                    release(resource)
                        .deferred(&ctx_release)
                        .map(move |_| outcome)
                })
            }
        })
    })
}

/// [`bracket`] with a fallible release.
///
/// Acquisition failures become [`BracketError::Acquire`]; use and release failures
/// combine as in [`ensure_full`](Effect::ensure_full).
pub fn bracket_full<R, E, T, B, Rel, Use>(
    acquire: Effect<R, E, T>,
    release: Rel,
    use_fn: Use,
) -> Effect<R, BracketError<E>, B>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    T: Send + 'static,
    B: Send + 'static,
    Rel: Fn(T) -> Effect<R, E, ()> + Send + Sync + 'static,
    Use: Fn(&T) -> Effect<R, E, B> + Send + Sync + 'static,
{
    let release = Arc::new(release);
    let use_fn = Arc::new(use_fn);
    Effect::new(move |ctx| {
        let (release, use_fn) = (Arc::clone(&release), Arc::clone(&use_fn));
        let ctx_next = ctx.clone();
        acquire.deferred_step(ctx).and_then(move |acquired| match acquired {
            Either::Left(err) => Trampoline::done(Either::Left(BracketError::Acquire(err))),
            Either::Right(resource) => {
                let ctx_release = ctx_next.clone();
                use_fn(&resource).deferred(&ctx_next).and_then(move |outcome| {
                    release(resource)
                        .deferred(&ctx_release)
                        .map(move |cleanup| combine(outcome, cleanup))
                })
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::constructors::{fail, from_fn, pure};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counted_release(count: &Arc<AtomicUsize>) -> impl Fn(u32) -> Effect<(), Never, ()> {
        let count = Arc::clone(count);
        move |_| {
            let count = Arc::clone(&count);
            from_fn(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    #[tokio::test]
    async fn test_release_after_success() {
        let released = Arc::new(AtomicUsize::new(0));
        let effect = bracket(
            pure::<(), String, _>(41u32),
            counted_release(&released),
            |n| pure(n + 1),
        );
        assert_eq!(effect.run(()).await, Ok(42));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_after_use_failure() {
        let released = Arc::new(AtomicUsize::new(0));
        let effect = bracket(
            pure::<(), String, _>(1u32),
            counted_release(&released),
            |_| fail::<(), _, ()>("use failed".to_string()),
        );
        assert_eq!(effect.run(()).await, Err("use failed".to_string()));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_release_when_acquire_fails() {
        let released = Arc::new(AtomicUsize::new(0));
        let effect = bracket(
            fail::<(), _, u32>("no connection".to_string()),
            counted_release(&released),
            |n| pure(*n),
        );
        assert_eq!(effect.run(()).await, Err("no connection".to_string()));
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_bracket_full_phases() {
        let acquire_failed = bracket_full(
            fail::<(), _, u32>("acquire"),
            |_| pure(()),
            |n| pure(*n),
        );
        assert_eq!(
            acquire_failed.run(()).await,
            Err(BracketError::Acquire("acquire"))
        );

        let both = bracket_full(
            pure::<(), &str, _>(1u32),
            |_| fail("release"),
            |_| fail::<(), _, u32>("use"),
        );
        let err = both.run(()).await.unwrap_err();
        assert_eq!(err.body_failure(), Some(&"use"));
        assert_eq!(err.finalizer_failure(), Some(&"release"));
        assert_eq!(err.acquire_failure(), None);
        assert_eq!(err.to_string(), "use (finalizer also failed: release)");
    }

    #[test]
    fn test_bracket_error_map() {
        let err: BracketError<&str> = BracketError::Finalizer("io");
        assert_eq!(err.map(str::len), BracketError::Finalizer(2));
    }

    #[test]
    fn test_bracket_error_messages() {
        assert_eq!(
            BracketError::Acquire("pool exhausted").to_string(),
            "could not acquire: pool exhausted"
        );
        assert_eq!(BracketError::Body("timeout").to_string(), "timeout");
        assert_eq!(
            BracketError::Finalizer("flush").to_string(),
            "finalizer failed: flush"
        );
    }
}
