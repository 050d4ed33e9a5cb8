//! Constructor functions for effects.
//!
//! These are the leaves of every effect tree. All of them are lazy: the
//! closure or value handed in is only touched when the effect is evaluated.
//!
//! ```rust
//! use millrace::effect::prelude::*;
//!
//! # tokio_test::block_on(async {
//! let effect = asks::<u32, String, _, _>(|base| base * 2)
//!     .and_then(|doubled| from_result(if doubled > 10 { Ok(doubled) } else { Err("too small".into()) }));
//!
//! assert_eq!(effect.run(21).await, Ok(42));
//! assert_eq!(effect.run(2).await, Err("too small".to_string()));
//! # });
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::effect::Effect;
use crate::either::Either;
use crate::error::Panicked;
use crate::trampoline::Trampoline;

/// An effect that succeeds with `value`.
///
/// The value is cloned for every run.
pub fn pure<R, E, A>(value: A) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Clone + Send + Sync + 'static,
{
    Effect::new(move |_| Trampoline::done(Either::Right(value.clone())))
}

/// Alias of [`pure`].
pub fn success<R, E, A>(value: A) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Clone + Send + Sync + 'static,
{
    pure(value)
}

/// An effect that fails with `error`.
pub fn fail<R, E, A>(error: E) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    Effect::new(move |_| Trampoline::done(Either::Left(error.clone())))
}

/// Alias of [`fail`].
pub fn error<R, E, A>(error: E) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    fail(error)
}

/// An effect computed synchronously from the environment.
pub fn from_fn<R, E, A, F>(f: F) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
    F: Fn(&R) -> Result<A, E> + Send + Sync + 'static,
{
    Effect::new(move |ctx| Trampoline::done(Either::from(f(ctx.environment()))))
}

/// An effect that replays a fixed `Result`.
pub fn from_result<R, E, A>(result: Result<A, E>) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    A: Clone + Send + Sync + 'static,
{
    Effect::new(move |_| Trampoline::done(Either::from(result.clone())))
}

/// An effect driven by a future built from the environment.
///
/// `f` receives a shared handle to the environment so the future can own it.
///
/// ```rust
/// use millrace::effect::prelude::*;
/// use std::sync::Arc;
///
/// struct Env {
///     greeting: String,
/// }
///
/// # tokio_test::block_on(async {
/// let effect = from_async(|env: Arc<Env>| async move {
///     tokio::task::yield_now().await;
///     Ok::<_, String>(format!("{}, world", env.greeting))
/// });
///
/// let result = effect.run(Env { greeting: "hello".into() }).await;
/// assert_eq!(result, Ok("hello, world".to_string()));
/// # });
/// ```
pub fn from_async<R, E, A, F, Fut>(f: F) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
    F: Fn(Arc<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<A, E>> + Send + 'static,
{
    Effect::new(move |ctx| {
        let pending = f(ctx.shared_environment());
        Trampoline::suspend(async move { Trampoline::done(Either::from(pending.await)) })
    })
}

/// Build the effect to run lazily, at evaluation time.
///
/// Useful for recursive definitions, where constructing the effect eagerly
/// would never terminate.
///
/// ```rust
/// use millrace::effect::prelude::*;
///
/// fn count_down(n: u64) -> Effect<(), Never, u64> {
///     if n == 0 {
///         pure(0)
///     } else {
///         suspend(move || count_down(n - 1)).map(|x| x + 1)
///     }
/// }
///
/// # tokio_test::block_on(async {
/// assert_eq!(count_down(5_000).run(()).await, Ok(5_000));
/// # });
/// ```
pub fn suspend<R, E, A, F>(f: F) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
    F: Fn() -> Effect<R, E, A> + Send + Sync + 'static,
{
    Effect::new(move |ctx| f().deferred(ctx))
}

/// Read a value out of the environment.
pub fn asks<R, E, A, F>(f: F) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
    F: Fn(&R) -> A + Send + Sync + 'static,
{
    Effect::new(move |ctx| Trampoline::done(Either::Right(f(ctx.environment()))))
}

/// The environment itself, as a shared handle.
pub fn environment<R, E>() -> Effect<R, E, Arc<R>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
{
    Effect::new(|ctx| Trampoline::done(Either::Right(ctx.shared_environment())))
}

/// Run a synchronous thunk, turning a panic whose payload is an `X` into a
/// typed failure.
///
/// Panics carrying any other payload keep unwinding. Raise a matching panic
/// with [`std::panic::panic_any`].
///
/// ```rust
/// use millrace::effect::prelude::*;
///
/// #[derive(Debug, PartialEq)]
/// struct ParseFailure(String);
///
/// fn parse(input: &'static str) -> i32 {
///     input
///         .parse()
///         .unwrap_or_else(|_| std::panic::panic_any(ParseFailure(input.to_string())))
/// }
///
/// # tokio_test::block_on(async {
/// let effect: Effect<(), ParseFailure, i32> = catch(|| parse("12x"));
/// assert_eq!(effect.run(()).await, Err(ParseFailure("12x".into())));
/// # });
/// ```
pub fn catch<X, R, A, F>(thunk: F) -> Effect<R, X, A>
where
    X: Any + Send + 'static,
    R: Send + Sync + 'static,
    A: Send + 'static,
    F: Fn() -> A + Send + Sync + 'static,
{
    Effect::new(move |_| {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(&thunk)) {
            Ok(value) => Either::Right(value),
            Err(payload) => match payload.downcast::<X>() {
                Ok(caught) => Either::Left(*caught),
                Err(other) => panic::resume_unwind(other),
            },
        };
        Trampoline::done(outcome)
    })
}

/// Run a synchronous thunk, turning any panic into [`Panicked`].
pub fn catch_all<R, A, F>(thunk: F) -> Effect<R, Panicked, A>
where
    R: Send + Sync + 'static,
    A: Send + 'static,
    F: Fn() -> A + Send + Sync + 'static,
{
    Effect::new(move |_| {
        let outcome = match panic::catch_unwind(AssertUnwindSafe(&thunk)) {
            Ok(value) => Either::Right(value),
            Err(payload) => Either::Left(Panicked::from_payload(payload)),
        };
        Trampoline::done(outcome)
    })
}

/// Suspend for `duration` without blocking a worker thread.
///
/// Requires a tokio runtime with the time driver enabled.
pub fn sleep<R, E>(duration: Duration) -> Effect<R, E, ()>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
{
    Effect::new(move |_| {
        Trampoline::suspend(async move {
            tokio::time::sleep(duration).await;
            Trampoline::done(Either::Right(()))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Never;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, PartialEq)]
    struct Timeout;

    #[derive(Debug)]
    struct Unrelated;

    #[tokio::test]
    async fn test_construction_is_lazy() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let effect = from_fn::<(), String, _, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        });
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        effect.run(()).await.unwrap();
        effect.run(()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_from_result_and_aliases() {
        assert_eq!(from_result::<(), String, _>(Ok(1)).run(()).await, Ok(1));
        assert_eq!(
            from_result::<(), _, i32>(Err("x".to_string())).run(()).await,
            Err("x".to_string())
        );
        assert_eq!(success::<(), String, _>(2).run(()).await, Ok(2));
        assert_eq!(error::<(), _, ()>(3u8).run(()).await, Err(3));
    }

    #[tokio::test]
    async fn test_environment_is_shared() {
        let effect = environment::<String, Never>().map(|env| env.len());
        assert_eq!(effect.run("abc".to_string()).await, Ok(3));
    }

    #[tokio::test]
    async fn test_catch_matching_payload() {
        let effect: Effect<(), Timeout, i32> = catch(|| std::panic::panic_any(Timeout));
        assert_eq!(effect.run(()).await, Err(Timeout));
    }

    #[tokio::test]
    async fn test_catch_passes_value_through() {
        let effect: Effect<(), Timeout, i32> = catch(|| 5);
        assert_eq!(effect.run(()).await, Ok(5));
    }

    #[test]
    fn test_catch_lets_other_panics_escape() {
        let effect: Effect<(), Timeout, i32> = catch(|| std::panic::panic_any(Unrelated));
        let escaped = std::panic::catch_unwind(AssertUnwindSafe(|| {
            tokio_test::block_on(effect.run(()))
        }));

        let payload = escaped.expect_err("unrelated panic must not be absorbed");
        assert!(payload.downcast_ref::<Unrelated>().is_some());
    }

    #[tokio::test]
    async fn test_catch_all_converts_any_panic() {
        let effect = catch_all::<(), i32, _>(|| panic!("disk on fire"));
        assert_eq!(
            effect.run(()).await,
            Err(Panicked {
                message: "disk on fire".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_sleep_suspends() {
        let started = tokio::time::Instant::now();
        sleep::<(), Never>(Duration::from_millis(5))
            .run(())
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(5));
    }
}
