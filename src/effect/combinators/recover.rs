//! Error-channel combinators: recovery and reification.

use std::sync::Arc;

use crate::effect::{Effect, Never};
use crate::either::Either;
use crate::trampoline::Trampoline;

impl<R, E, A> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Handle a failure with another effect.
    ///
    /// The mirror of [`and_then`](Effect::and_then): `f` sees only `Left`
    /// values, and a success passes through without calling it.
    ///
    /// # Example
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    ///
    /// # tokio_test::block_on(async {
    /// let cached = fail::<(), _, &str>("cache miss")
    ///     .recover(|_| pure::<(), String, _>("from database"));
    /// assert_eq!(cached.run(()).await, Ok("from database"));
    /// # });
    /// ```
    pub fn recover<E2, F>(self, f: F) -> Effect<R, E2, A>
    where
        E2: Send + 'static,
        F: Fn(E) -> Effect<R, E2, A> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |outcome| match outcome {
                Either::Left(err) => f(err).deferred(&ctx_next),
                Either::Right(value) => Trampoline::done(Either::Right(value)),
            })
        })
    }

    /// Move a failure into the success channel.
    ///
    /// The resulting effect never fails; inspect the `Either` to decide what
    /// to do without short-circuiting the surrounding chain.
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    /// use millrace::Either;
    ///
    /// # tokio_test::block_on(async {
    /// let outcome = fail::<(), _, i32>("boom").either().run(()).await;
    /// assert_eq!(outcome, Ok(Either::left("boom")));
    /// # });
    /// ```
    pub fn either(self) -> Effect<R, Never, Either<E, A>> {
        Effect::new(move |ctx| self.deferred_step(ctx).map(Either::Right))
    }
}

impl<R, E, A> Effect<R, Never, Either<E, A>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Move a reified failure back into the error channel.
    ///
    /// Inverse of [`either`](Effect::either).
    pub fn absolve(self) -> Effect<R, E, A> {
        Effect::new(move |ctx| {
            self.deferred_step(ctx).map(|outcome| match outcome {
                Either::Left(never) => match never {},
                Either::Right(inner) => inner,
            })
        })
    }
}

impl<R, A> Effect<R, Never, A>
where
    R: Send + Sync + 'static,
    A: Send + 'static,
{
    /// Use a never-failing effect where some error type is expected.
    pub fn widen<E>(self) -> Effect<R, E, A>
    where
        E: Send + 'static,
    {
        Effect::new(move |ctx| {
            self.deferred_step(ctx)
                .map(|outcome| outcome.map_left(|never| match never {}))
        })
    }
}
