//! Sequencing combinators.

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
    /// Chain a dependent effect.
    ///
    /// `f` runs only if this effect succeeds; a failure short-circuits the
    /// rest of the chain. The next effect is entered through a trampoline
    /// step, so chains of any length run in constant stack.
    ///
    /// # Example
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    ///
    /// fn halve(n: i32) -> Effect<(), String, i32> {
    ///     if n % 2 == 0 {
    ///         pure(n / 2)
    ///     } else {
    ///         fail(format!("{} is odd", n))
    ///     }
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// assert_eq!(pure(8).and_then(halve).and_then(halve).run(()).await, Ok(2));
    /// assert_eq!(pure(6).and_then(halve).and_then(halve).run(()).await, Err("3 is odd".into()));
    /// # });
    /// ```
    pub fn and_then<B, F>(self, f: F) -> Effect<R, E, B>
    where
        B: Send + 'static,
        F: Fn(A) -> Effect<R, E, B> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |outcome| match outcome {
                Either::Left(err) => Trampoline::done(Either::Left(err)),
                Either::Right(value) => f(value).deferred(&ctx_next),
            })
        })
    }

    /// Chain an effect produced by an asynchronous function.
    ///
    /// The future returned by `f` is awaited before the effect it yields runs.
    pub fn and_then_async<B, F, Fut>(self, f: F) -> Effect<R, E, B>
    where
        B: Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Effect<R, E, B>> + Send + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |outcome| match outcome {
                Either::Left(err) => Trampoline::done(Either::Left(err)),
                Either::Right(value) => {
                    let pending = f(value);
                    Trampoline::suspend(async move { pending.await.deferred(&ctx_next) })
                }
            })
        })
    }

    /// Run `next` after this effect, discarding this effect's value.
    pub fn discard_and_then<B>(self, next: Effect<R, E, B>) -> Effect<R, E, B>
    where
        B: Send + 'static,
    {
        self.and_then(move |_| next.clone())
    }

    /// Run `other` after this effect and pair both values.
    ///
    /// The two effects run in order; see [`sequence`](crate::effect::sequence)
    /// for concurrent evaluation.
    pub fn zip<B>(self, other: Effect<R, E, B>) -> Effect<R, E, (A, B)>
    where
        B: Send + 'static,
    {
        Effect::new(move |ctx| {
            let other = other.clone();
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |first| match first {
                Either::Left(err) => Trampoline::done(Either::Left(err)),
                Either::Right(a) => other
                    .deferred(&ctx_next)
                    .map(move |second| second.map(|b| (a, b))),
            })
        })
    }
}
