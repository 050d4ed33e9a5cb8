//! Tap combinator - run a side effect and keep the original value.

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
    /// Run the effect returned by `f` on success, then yield the original value.
    ///
    /// A failure from the tapped effect fails the whole chain.
    pub fn tap<B, F>(self, f: F) -> Effect<R, E, A>
    where
        B: Send + 'static,
        F: Fn(&A) -> Effect<R, E, B> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx| {
            let f = Arc::clone(&f);
            let ctx_next = ctx.clone();
            self.deferred_step(ctx).and_then(move |outcome| match outcome {
                Either::Left(err) => Trampoline::done(Either::Left(err)),
                Either::Right(value) => f(&value)
                    .deferred(&ctx_next)
                    .map(move |tapped| tapped.map(|_| value)),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::effect::prelude::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn test_tap_keeps_value() {
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let effect = pure::<(), String, _>(42).tap(move |value| {
            let value = *value;
            let sink = Arc::clone(&sink);
            from_fn(move |_| {
                *sink.lock().unwrap() = Some(value);
                Ok(())
            })
        });

        assert_eq!(effect.run(()).await, Ok(42));
        assert_eq!(*seen.lock().unwrap(), Some(42));
    }

    #[tokio::test]
    async fn test_tap_failure_propagates() {
        let effect = pure::<(), _, _>(1).tap(|_| fail::<(), _, ()>("audit log unavailable"));
        assert_eq!(effect.run(()).await, Err("audit log unavailable"));
    }
}
