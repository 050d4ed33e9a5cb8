//! Shared mutable cells accessed only through effects.
//!
//! A [`Ref`] serializes every read-modify-write behind an async mutex, so
//! concurrent effects never lose updates and waiting for the lock suspends
//! the task instead of blocking a worker thread. The lock is held only for
//! the duration of the read or write itself.

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::effect::Effect;
use crate::either::Either;
use crate::trampoline::Trampoline;

/// A lock-guarded mutable cell.
///
/// Cloning a `Ref` shares the cell.
///
/// ```rust
/// use millrace::effect::prelude::*;
///
/// # tokio_test::block_on(async {
/// let counter = Ref::new(0u32);
/// let bumps = (0..10).map(|_| counter.modify::<(), Never, _>(|n| n + 1)).collect();
///
/// sequence(bumps).run(()).await.unwrap();
/// assert_eq!(counter.get::<(), Never>().run(()).await, Ok(10));
/// # });
/// ```
pub struct Ref<A> {
    cell: Arc<Mutex<A>>,
}

impl<A> Clone for Ref<A> {
    fn clone(&self) -> Self {
        Ref {
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<A> fmt::Debug for Ref<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ref")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}

impl<A> Ref<A>
where
    A: Send + 'static,
{
    /// A new cell holding `value`.
    pub fn new(value: A) -> Self {
        Ref {
            cell: Arc::new(Mutex::new(value)),
        }
    }

    fn locked<R, E, B, F>(&self, action: F) -> Effect<R, E, B>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        B: Send + 'static,
        F: Fn(&mut A) -> Either<E, B> + Send + Sync + 'static,
    {
        let cell = Arc::clone(&self.cell);
        let action = Arc::new(action);
        Effect::new(move |_| {
            let cell = Arc::clone(&cell);
            let action = Arc::clone(&action);
            Trampoline::suspend(async move {
                let mut guard = cell.lock().await;
                Trampoline::done(action(&mut guard))
            })
        })
    }

    /// Read the current value.
    pub fn get<R, E>(&self) -> Effect<R, E, A>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        A: Clone,
    {
        self.locked(|value| Either::Right(value.clone()))
    }

    /// Replace the value.
    pub fn put<R, E>(&self, value: A) -> Effect<R, E, ()>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        A: Clone + Sync,
    {
        self.locked(move |slot| {
            *slot = value.clone();
            Either::Right(())
        })
    }

    /// Apply `f` to the value and store the result, returning the new value.
    pub fn modify<R, E, F>(&self, f: F) -> Effect<R, E, A>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        A: Clone,
        F: Fn(&A) -> A + Send + Sync + 'static,
    {
        self.locked(move |slot| {
            let next = f(slot);
            *slot = next.clone();
            Either::Right(next)
        })
    }

    /// Like [`modify`](Ref::modify), but `f` may refuse.
    ///
    /// The new value is stored only when `f` returns `Right`; on `Left` the
    /// cell is left unchanged and the effect fails with the error.
    pub fn try_modify<R, E, F>(&self, f: F) -> Effect<R, E, A>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        A: Clone,
        F: Fn(&A) -> Either<E, A> + Send + Sync + 'static,
    {
        self.locked(move |slot| {
            f(slot).map(|next| {
                *slot = next.clone();
                next
            })
        })
    }
}
