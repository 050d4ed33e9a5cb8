//! Tracing spans around effects.
//!
//! [`Effect::instrument`] evaluates an effect inside a `tracing::Span`. The
//! span becomes part of the effect's trampoline, so it is entered for every
//! step the effect takes, including the resumptions after each suspension,
//! and wrapping thousands of nested effects in spans stays stack-safe.

use crate::effect::Effect;

impl<R, E, A> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Wrap this effect in a tracing span.
    ///
    /// # Example
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    /// use tracing::debug_span;
    ///
    /// fn fetch_order(order_id: u64) -> Effect<(), String, u64> {
    ///     pure(order_id).instrument(debug_span!("fetch_order", order_id))
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// assert_eq!(fetch_order(7).run(()).await, Ok(7));
    /// # });
    /// ```
    pub fn instrument(self, span: tracing::Span) -> Effect<R, E, A> {
        Effect::new(move |ctx| self.deferred_step(ctx).in_span(span.clone()))
    }
}
