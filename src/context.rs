//! Per-run state: the caller's environment plus a scoped release registry.
//!
//! Every top-level [`Effect::run`](crate::Effect::run) creates exactly one
//! [`RuntimeContext`]. It is cheap to clone (all state sits behind `Arc`s) and
//! every clone refers to the same run scope, so branches spawned by parallel
//! combinators register their resources with the run that started them.
//!
//! # Release guarantees
//!
//! The [`ScopedReleaseRegistry`] owns a release action for every resource
//! acquired during the run and drains them in reverse acquisition order when
//! the run ends:
//!
//! - on success and on typed failure, `run` awaits the drain before returning
//! - when a panic escapes the effect, `run` drains before resuming the unwind
//! - when the run future itself is dropped mid-flight, the registry's `Drop`
//!   hands the remaining releases to the ambient tokio runtime (or blocks on
//!   them when there is none)
//! - if that runtime shuts down before the spawned releases finish, the ones
//!   not yet started run on the thread that drops them, with a warning
//!
//! A failing release never stops the ones after it; failures are collected
//! into [`ReleaseErrors`].

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use futures::FutureExt;
use tokio::sync::OnceCell;

use crate::effect::BoxFuture;
use crate::error::{BoxError, Panicked, ReleaseErrors, ReleaseFailure};

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one top-level run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(u64);

impl RunId {
    fn next() -> Self {
        RunId(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The numeric id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>;

struct Releaser {
    label: String,
    release: ReleaseFn,
}

/// Owns the release actions registered during one run.
pub struct ScopedReleaseRegistry {
    entries: Mutex<Vec<Releaser>>,
}

impl fmt::Debug for ScopedReleaseRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedReleaseRegistry")
            .field("pending", &self.len())
            .finish()
    }
}

impl ScopedReleaseRegistry {
    fn new() -> Self {
        ScopedReleaseRegistry {
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a release action to run when the scope closes.
    ///
    /// Actions run in reverse registration order.
    pub fn register<F, Fut, E>(&self, label: impl Into<String>, release: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError> + 'static,
    {
        let label = label.into();
        tracing::trace!(resource = %label, "release registered");
        let release: ReleaseFn = Box::new(move || {
            Box::pin(async move { release().await.map_err(Into::into) })
                as BoxFuture<'static, Result<(), BoxError>>
        });
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Releaser { label, release });
    }

    /// Number of release actions still pending.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if nothing is waiting to be released.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn pop(&self) -> Option<Releaser> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    /// Run every pending release, newest first, collecting failures.
    ///
    /// A release that returns an error or panics is recorded and the drain
    /// continues with the next one.
    pub async fn release_all(&self) -> ReleaseErrors {
        let mut errors = ReleaseErrors::default();
        while let Some(releaser) = self.pop() {
            if let Err(failure) = releaser.run().await {
                errors.push(failure);
            }
        }
        errors
    }
}

impl Releaser {
    async fn run(self) -> Result<(), ReleaseFailure> {
        let Releaser { label, release } = self;
        let outcome = AssertUnwindSafe(async move { release().await })
            .catch_unwind()
            .await;
        let source: BoxError = match outcome {
            Ok(Ok(())) => {
                tracing::trace!(resource = %label, "released");
                return Ok(());
            }
            Ok(Err(err)) => err,
            Err(payload) => Box::new(Panicked::from_payload(payload)),
        };
        tracing::warn!(resource = %label, error = %source, "resource release failed");
        Err(ReleaseFailure {
            resource: label,
            source,
        })
    }
}

/// Releases taken out of a registry that was dropped before closing.
///
/// Anything still pending when this is dropped, for instance because the
/// task draining it was discarded by a runtime shutdown, runs synchronously
/// on the dropping thread.
struct PendingReleases(Vec<Releaser>);

impl PendingReleases {
    async fn drain(mut self) {
        while let Some(releaser) = self.0.pop() {
            // Failures are already logged by `Releaser::run`.
            let _ = releaser.run().await;
        }
    }
}

impl Drop for PendingReleases {
    fn drop(&mut self) {
        if self.0.is_empty() {
            return;
        }
        tracing::warn!(
            pending = self.0.len(),
            "release task dropped before finishing; releasing on the dropping thread"
        );
        while let Some(releaser) = self.0.pop() {
            let _ = futures::executor::block_on(releaser.run());
        }
    }
}

impl Drop for ScopedReleaseRegistry {
    fn drop(&mut self) {
        let entries = std::mem::take(
            self.entries
                .get_mut()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if entries.is_empty() {
            return;
        }

        tracing::debug!(
            pending = entries.len(),
            "run scope dropped before closing; releasing remaining resources"
        );
        let pending = PendingReleases(entries);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(pending.drain());
            }
            Err(_) => futures::executor::block_on(pending.drain()),
        }
    }
}

/// State shared by every clone of a run's context.
struct RunScope {
    id: RunId,
    registry: ScopedReleaseRegistry,
    memo: RwLock<HashMap<u64, Arc<dyn Any + Send + Sync>>>,
}

/// The per-run context handed to every effect as it is evaluated.
///
/// Holds the caller-supplied environment and the run scope. Clones share both.
pub struct RuntimeContext<R> {
    environment: Arc<R>,
    scope: Arc<RunScope>,
}

impl<R> Clone for RuntimeContext<R> {
    fn clone(&self) -> Self {
        RuntimeContext {
            environment: Arc::clone(&self.environment),
            scope: Arc::clone(&self.scope),
        }
    }
}

impl<R> fmt::Debug for RuntimeContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("run_id", &self.scope.id)
            .field("environment", &std::any::type_name::<R>())
            .field("resources", &self.scope.registry)
            .finish()
    }
}

impl<R> RuntimeContext<R> {
    /// Open a fresh run scope around `environment`.
    pub fn new(environment: R) -> Self {
        RuntimeContext {
            environment: Arc::new(environment),
            scope: Arc::new(RunScope {
                id: RunId::next(),
                registry: ScopedReleaseRegistry::new(),
                memo: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// The caller-supplied environment.
    pub fn environment(&self) -> &R {
        &self.environment
    }

    /// A shared handle to the environment, for moving into futures.
    pub fn shared_environment(&self) -> Arc<R> {
        Arc::clone(&self.environment)
    }

    /// Id of the run this context belongs to.
    pub fn run_id(&self) -> RunId {
        self.scope.id
    }

    /// The run's release registry.
    pub fn resources(&self) -> &ScopedReleaseRegistry {
        &self.scope.registry
    }

    /// Same run scope, different environment.
    pub(crate) fn with_environment<R2>(&self, environment: R2) -> RuntimeContext<R2> {
        RuntimeContext {
            environment: Arc::new(environment),
            scope: Arc::clone(&self.scope),
        }
    }

    /// The at-most-once cell memoizing a value under `key` for this run.
    ///
    /// Finding an existing cell takes only a shared read lock, so lookups
    /// from concurrent branches do not queue behind each other. The write
    /// lock is taken once per key, when the cell is first created.
    pub(crate) fn memo_cell<T>(&self, key: u64) -> Arc<OnceCell<T>>
    where
        T: Send + Sync + 'static,
    {
        let cached = self
            .scope
            .memo
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned();
        let slot = match cached {
            Some(slot) => slot,
            None => {
                let mut memo = self
                    .scope
                    .memo
                    .write()
                    .unwrap_or_else(PoisonError::into_inner);
                Arc::clone(memo.entry(key).or_insert_with(|| {
                    Arc::new(OnceCell::<T>::new()) as Arc<dyn Any + Send + Sync>
                }))
            }
        };
        match slot.downcast::<OnceCell<T>>() {
            Ok(cell) => cell,
            Err(_) => unreachable!("memo key {} reused for a different handle type", key),
        }
    }

    /// Release everything registered in this run and forget memoized handles.
    pub async fn close(&self) -> ReleaseErrors {
        let errors = self.scope.registry.release_all().await;
        self.scope
            .memo
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        errors
    }
}
