//! Lazily acquired, run-scoped, memoized handles.
//!
//! A [`Resource`] describes how to open an external handle (a connection, a
//! session, a pool) and how to close it. The description is long-lived and
//! can sit in a static or a struct field; the handle it opens lives for one
//! run only.
//!
//! [`Resource::get`] is itself an effect. The first `get` in a run invokes
//! the factory, registers the release with the run scope, and caches the
//! handle in that run's scope. Every later `get` in the same run (sequential
//! or concurrent) returns the same `Arc`. When the run ends the release
//! runs, the cache entry is dropped, and the next run acquires afresh.
//!
//! ```rust
//! use millrace::effect::prelude::*;
//! use std::sync::Arc;
//!
//! #[derive(Debug)]
//! struct Session {
//!     id: u32,
//! }
//!
//! let sessions = Resource::new(
//!     "session",
//!     || async { Ok::<_, String>(Session { id: 1 }) },
//!     |session: Arc<Session>| async move {
//!         println!("closing session {}", session.id);
//!         Ok::<(), String>(())
//!     },
//! );
//!
//! # tokio_test::block_on(async {
//! let both = sessions.get::<()>().zip(sessions.get());
//! let (a, b) = both.run(()).await.unwrap();
//! assert!(Arc::ptr_eq(&a, &b));
//! # });
//! ```

use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::RuntimeContext;
use crate::effect::{BoxFuture, Effect};
use crate::either::Either;
use crate::error::BoxError;
use crate::trampoline::Trampoline;

static NEXT_RESOURCE_ID: AtomicU64 = AtomicU64::new(1);

type AcquireFn<E, C> = dyn Fn() -> BoxFuture<'static, Result<C, E>> + Send + Sync;
type ReleaseFn<C> = dyn Fn(Arc<C>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync;

struct ResourceInner<E, C> {
    id: u64,
    label: Cow<'static, str>,
    acquire: Box<AcquireFn<E, C>>,
    release: Option<Arc<ReleaseFn<C>>>,
}

/// A run-scoped handle factory with guaranteed release.
pub struct Resource<E, C> {
    inner: Arc<ResourceInner<E, C>>,
}

impl<E, C> Clone for Resource<E, C> {
    fn clone(&self) -> Self {
        Resource {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, C> fmt::Debug for Resource<E, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource")
            .field("label", &self.inner.label)
            .field("managed", &self.inner.release.is_some())
            .finish()
    }
}

impl<E, C> Resource<E, C>
where
    E: Send + 'static,
    C: Send + Sync + 'static,
{
    fn from_parts(
        label: Cow<'static, str>,
        acquire: Box<AcquireFn<E, C>>,
        release: Option<Arc<ReleaseFn<C>>>,
    ) -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                id: NEXT_RESOURCE_ID.fetch_add(1, Ordering::Relaxed),
                label,
                acquire,
                release,
            }),
        }
    }

    /// A resource with an asynchronous factory and release.
    pub fn new<A, AFut, Rel, RFut, RE>(
        label: impl Into<Cow<'static, str>>,
        acquire: A,
        release: Rel,
    ) -> Self
    where
        A: Fn() -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<C, E>> + Send + 'static,
        Rel: Fn(Arc<C>) -> RFut + Send + Sync + 'static,
        RFut: Future<Output = Result<(), RE>> + Send + 'static,
        RE: Into<BoxError> + 'static,
    {
        let release: Arc<ReleaseFn<C>> = Arc::new(move |handle: Arc<C>| {
            let pending = release(handle);
            Box::pin(async move { pending.await.map_err(Into::into) })
                as BoxFuture<'static, Result<(), BoxError>>
        });
        Self::from_parts(
            label.into(),
            Box::new(move || Box::pin(acquire()) as BoxFuture<'static, Result<C, E>>),
            Some(release),
        )
    }

    /// A resource whose factory and release are plain functions.
    pub fn sync<A, Rel, RE>(label: impl Into<Cow<'static, str>>, acquire: A, release: Rel) -> Self
    where
        A: Fn() -> Result<C, E> + Send + Sync + 'static,
        Rel: Fn(&C) -> Result<(), RE> + Send + Sync + 'static,
        RE: Into<BoxError> + 'static,
    {
        let release: Arc<ReleaseFn<C>> = Arc::new(move |handle: Arc<C>| {
            let outcome: Result<(), BoxError> = release(&handle).map_err(Into::into);
            Box::pin(futures::future::ready(outcome)) as BoxFuture<'static, Result<(), BoxError>>
        });
        let acquire = Arc::new(acquire);
        Self::from_parts(
            label.into(),
            Box::new(move || {
                let acquire = Arc::clone(&acquire);
                Box::pin(async move { acquire() }) as BoxFuture<'static, Result<C, E>>
            }),
            Some(release),
        )
    }

    /// A memoized resource with nothing to release.
    pub fn unmanaged<A, AFut>(label: impl Into<Cow<'static, str>>, acquire: A) -> Self
    where
        A: Fn() -> AFut + Send + Sync + 'static,
        AFut: Future<Output = Result<C, E>> + Send + 'static,
    {
        Self::from_parts(
            label.into(),
            Box::new(move || Box::pin(acquire()) as BoxFuture<'static, Result<C, E>>),
            None,
        )
    }

    /// The label used in logs and release failures.
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The handle for the current run, acquiring it on first use.
    ///
    /// A failed acquisition is returned as a failure and leaves nothing
    /// cached or registered, so a later `get` in the same run tries again.
    pub fn get<R>(&self) -> Effect<R, E, Arc<C>>
    where
        R: Send + Sync + 'static,
    {
        let resource = self.clone();
        Effect::new(move |ctx: &RuntimeContext<R>| {
            let resource = resource.clone();
            let ctx = ctx.clone();
            Trampoline::suspend(async move { Trampoline::done(resource.acquire_in(&ctx).await) })
        })
        .named(format!("get {}", self.inner.label))
    }

    async fn acquire_in<R>(&self, ctx: &RuntimeContext<R>) -> Either<E, Arc<C>> {
        let inner = &self.inner;
        let cell = ctx.memo_cell::<Arc<C>>(inner.id);
        let acquired = cell
            .get_or_try_init(|| async {
                tracing::trace!(resource = %inner.label, run_id = %ctx.run_id(), "acquiring");
                let handle = match (inner.acquire)().await {
                    Ok(handle) => Arc::new(handle),
                    Err(err) => return Err(err),
                };
                if let Some(release) = inner.release.clone() {
                    let owned = Arc::clone(&handle);
                    ctx.resources()
                        .register(inner.label.to_string(), move || release(owned));
                }
                tracing::trace!(resource = %inner.label, run_id = %ctx.run_id(), "acquired");
                Ok(handle)
            })
            .await;

        match acquired {
            Ok(handle) => Either::Right(Arc::clone(handle)),
            Err(err) => {
                tracing::trace!(resource = %inner.label, run_id = %ctx.run_id(), "acquisition failed");
                Either::Left(err)
            }
        }
    }
}
