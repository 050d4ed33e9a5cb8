//! Map combinators - transform the success or error channel.

use std::future::Future;
use std::sync::Arc;

use crate::effect::Effect;
use crate::either::Either;
use crate::trampoline::Trampoline;

impl<R, E, A> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Transform the success value.
    ///
    /// Failures pass through untouched and `f` is not called.
    ///
    /// # Example
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    ///
    /// # tokio_test::block_on(async {
    /// let effect = pure::<(), String, _>(21).map(|x| x * 2);
    /// assert_eq!(effect.run(()).await, Ok(42));
    /// # });
    /// ```
    pub fn map<B, F>(self, f: F) -> Effect<R, E, B>
    where
        B: Send + 'static,
        F: Fn(A) -> B + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            self.deferred_step(ctx)
                .map(move |outcome| outcome.map(|value| f(value)))
        })
    }

    /// Transform the success value with an asynchronous function.
    ///
    /// The evaluation suspends only while `f`'s future is pending.
    pub fn map_async<B, F, Fut>(self, f: F) -> Effect<R, E, B>
    where
        B: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = B> + Send + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            self.deferred_step(ctx).and_then(move |outcome| match outcome {
                Either::Left(err) => Trampoline::done(Either::Left(err)),
                Either::Right(value) => {
                    let pending = f(value);
                    Trampoline::suspend(async move { Trampoline::done(Either::Right(pending.await)) })
                }
            })
        })
    }

    /// Transform the error value.
    ///
    /// This is how effects with different error types are brought together
    /// before sequencing them.
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    ///
    /// #[derive(Debug, PartialEq)]
    /// enum AppError {
    ///     Parse(String),
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// let effect = fail::<(), _, i32>("bad digit".to_string()).map_err(AppError::Parse);
    /// assert_eq!(effect.run(()).await, Err(AppError::Parse("bad digit".into())));
    /// # });
    /// ```
    pub fn map_err<E2, F>(self, f: F) -> Effect<R, E2, A>
    where
        E2: Send + 'static,
        F: Fn(E) -> E2 + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            self.deferred_step(ctx)
                .map(move |outcome| outcome.map_left(|err| f(err)))
        })
    }
}
