//! Finalizers that run on both channels.

use crate::effect::bracket::{combine, BracketError};
use crate::effect::{Effect, Never};

impl<R, E, A> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Run `finalizer` after this effect, whether it succeeded or failed.
    ///
    /// The finalizer's value is discarded and the original outcome is kept.
    /// It cannot fail; use [`ensure_full`](Effect::ensure_full) for a
    /// finalizer with its own error channel.
    ///
    /// A panic inside this effect skips the finalizer. Resources that must be
    /// released even then belong in a [`Resource`](crate::Resource), whose
    /// release is owned by the run scope.
    ///
    /// # Example
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use std::sync::Arc;
    ///
    /// # tokio_test::block_on(async {
    /// let closed = Arc::new(AtomicUsize::new(0));
    /// let counter = Arc::clone(&closed);
    /// let close = from_fn::<(), Never, _, _>(move |_| {
    ///     counter.fetch_add(1, Ordering::SeqCst);
    ///     Ok(())
    /// });
    ///
    /// let effect = fail::<(), _, i32>("query failed").ensure(close);
    /// assert_eq!(effect.run(()).await, Err("query failed"));
    /// assert_eq!(closed.load(Ordering::SeqCst), 1);
    /// # });
    /// ```
    pub fn ensure<B>(self, finalizer: Effect<R, Never, B>) -> Effect<R, E, A>
    where
        B: Send + 'static,
    {
        Effect::new(move |ctx| {
            let finalizer = finalizer.clone();
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |outcome| {
                finalizer.deferred(&ctx_next).map(move |_| outcome)
            })
        })
    }

    /// Run a fallible `finalizer` after this effect, keeping both failures.
    ///
    /// | effect | finalizer | result |
    /// |--------|-----------|--------|
    /// | `Ok(a)` | ok | `Ok(a)` |
    /// | `Ok(_)` | `Err(c)` | `Err(Finalizer(c))` |
    /// | `Err(e)` | ok | `Err(Body(e))` |
    /// | `Err(e)` | `Err(c)` | `Err(BodyAndFinalizer { body: e, finalizer: c })` |
    pub fn ensure_full<B>(self, finalizer: Effect<R, E, B>) -> Effect<R, BracketError<E>, A>
    where
        B: Send + 'static,
    {
        Effect::new(move |ctx| {
            let finalizer = finalizer.clone();
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |outcome| {
                finalizer
                    .deferred(&ctx_next)
                    .map(move |cleanup| combine(outcome, cleanup))
            })
        })
    }
}
