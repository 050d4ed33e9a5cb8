//! Environment adaptation.

use std::sync::Arc;

use crate::context::RuntimeContext;
use crate::effect::Effect;

impl<R, E, A> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    /// Run this effect inside a larger environment `R2`.
    ///
    /// `f` derives this effect's environment from the caller's. The derived
    /// run shares the caller's run scope, so resources acquired inside are
    /// memoized and released with the rest of the run.
    ///
    /// # Example
    ///
    /// ```rust
    /// use millrace::effect::prelude::*;
    ///
    /// struct AppEnv {
    ///     database_url: String,
    /// }
    ///
    /// fn url_length() -> Effect<String, Never, usize> {
    ///     asks(|url: &String| url.len())
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// let effect = url_length().local(|env: &AppEnv| env.database_url.clone());
    /// let env = AppEnv { database_url: "postgres://db".into() };
    /// assert_eq!(effect.run(env).await, Ok(13));
    /// # });
    /// ```
    pub fn local<R2, F>(self, f: F) -> Effect<R2, E, A>
    where
        R2: Send + Sync + 'static,
        F: Fn(&R2) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Effect::new(move |ctx: &RuntimeContext<R2>| {
            let inner = ctx.with_environment(f(ctx.environment()));
            self.deferred_step(&inner)
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::effect::prelude::*;
    use crate::Resource;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug)]
    struct Outer {
        port: u16,
    }

    #[tokio::test]
    async fn test_local_derives_environment() {
        let effect = asks::<u16, String, _, _>(|port| u32::from(*port) + 1)
            .local(|outer: &Outer| outer.port);
        assert_eq!(effect.run(Outer { port: 8080 }).await, Ok(8081));
    }

    #[tokio::test]
    async fn test_local_shares_the_run_scope() {
        let acquired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&acquired);
        let pool = Resource::sync(
            "pool",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(7u8)
            },
            |_| Ok::<(), String>(()),
        );

        let inner = pool.get::<u16>().map(|handle| *handle);
        let effect = pool
            .get::<Outer>()
            .zip(inner.local(|outer: &Outer| outer.port));

        let (outer_handle, inner_value) = effect.run(Outer { port: 1 }).await.unwrap();
        assert_eq!(*outer_handle, 7);
        assert_eq!(inner_value, 7);
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
    }
}
