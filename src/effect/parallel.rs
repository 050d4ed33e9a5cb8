//! Concurrent evaluation of effects.
//!
//! - [`sequence`] - run effects concurrently, collect results in input order
//! - [`map_m`] / [`filter_m`] - per-element effects over a collection
//! - [`race`] - first of two effects to finish wins
//! - [`timeout`] - race an effect against a timer
//!
//! When a tokio runtime is available, [`sequence`] and [`race`] spawn one
//! task per branch, so branches make progress on every worker thread and
//! nesting races does not nest their polls. Outside tokio, branches are
//! polled concurrently on the current task. All branches share the run scope
//! and the current tracing span of the effect that started them.

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, Either as Winner};
use tokio::task::JoinHandle;
use tracing::Instrument as _;

use crate::context::RuntimeContext;
use crate::effect::constructors::{fail, sleep};
use crate::effect::Effect;
use crate::either::Either;
use crate::trampoline::Trampoline;

/// Aborts the spawned branch if the aggregate is dropped first.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> T {
        match (&mut self.0).await {
            Ok(value) => value,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => std::panic::resume_unwind(Box::new(format!(
                "concurrent branch did not complete: {}",
                err
            ))),
        }
    }
}

async fn settle_all<R, E, A>(
    branches: Vec<Effect<R, E, A>>,
    ctx: RuntimeContext<R>,
) -> Vec<Either<E, A>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            let tasks: Vec<_> = branches
                .into_iter()
                .map(|branch| spawn_branch(&handle, branch, ctx.clone()))
                .collect();

            let mut settled = Vec::with_capacity(tasks.len());
            for task in tasks {
                settled.push(task.join().await);
            }
            settled
        }
        Err(_) => future::join_all(branches.iter().map(|branch| branch.evaluate(&ctx))).await,
    }
}

/// Run every effect concurrently and collect their values in input order.
///
/// All branches settle before the aggregate decides. If any failed, the
/// aggregate fails with the first failure found while collecting, which is
/// not necessarily the first to happen.
///
/// # Example
///
/// ```rust
/// use millrace::effect::prelude::*;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let effects = vec![
///     sleep::<(), String>(Duration::from_millis(20)).map(|_| 0),
///     sleep(Duration::from_millis(5)).map(|_| 1),
///     pure(2),
/// ];
/// assert_eq!(sequence(effects).run(()).await, Ok(vec![0, 1, 2]));
/// # });
/// ```
pub fn sequence<R, E, A>(effects: Vec<Effect<R, E, A>>) -> Effect<R, E, Vec<A>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    Effect::new(move |ctx| {
        let branches = effects.clone();
        let ctx = ctx.clone();
        Trampoline::suspend(async move {
            let settled = settle_all(branches, ctx).await;
            let mut values = Vec::with_capacity(settled.len());
            for outcome in settled {
                match outcome {
                    Either::Left(err) => return Trampoline::done(Either::Left(err)),
                    Either::Right(value) => values.push(value),
                }
            }
            Trampoline::done(Either::Right(values))
        })
    })
}

/// Apply an effectful function to every item, concurrently.
pub fn map_m<R, E, T, B, F>(items: Vec<T>, f: F) -> Effect<R, E, Vec<B>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    B: Send + 'static,
    F: Fn(T) -> Effect<R, E, B>,
{
    sequence(items.into_iter().map(f).collect())
}

/// Keep the items whose effectful predicate yields `true`, in input order.
///
/// The predicates run concurrently.
pub fn filter_m<R, E, T, F>(items: Vec<T>, predicate: F) -> Effect<R, E, Vec<T>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    T: Clone + Send + Sync + 'static,
    F: Fn(&T) -> Effect<R, E, bool>,
{
    let checks = items.iter().map(predicate).collect();
    let items = Arc::new(items);
    sequence(checks).map(move |keep: Vec<bool>| {
        items
            .iter()
            .zip(keep)
            .filter_map(|(item, keep)| keep.then(|| item.clone()))
            .collect()
    })
}

fn spawn_branch<R, E, A>(
    handle: &tokio::runtime::Handle,
    branch: Effect<R, E, A>,
    ctx: RuntimeContext<R>,
) -> AbortOnDrop<Either<E, A>>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    AbortOnDrop(handle.spawn(async move { branch.evaluate(&ctx).await }.in_current_span()))
}

/// Evaluate two effects concurrently; the first to finish decides.
///
/// The loser is dropped, which aborts its task. Anything it registered with
/// the run scope is still released when the run ends.
pub fn race<R, E, A>(first: Effect<R, E, A>, second: Effect<R, E, A>) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Send + 'static,
    A: Send + 'static,
{
    Effect::new(move |ctx| {
        let (first, second) = (first.clone(), second.clone());
        let ctx = ctx.clone();
        Trampoline::suspend(async move {
            let outcome = match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let left = spawn_branch(&handle, first, ctx.clone());
                    let right = spawn_branch(&handle, second, ctx);
                    let left = left.join();
                    let right = right.join();
                    futures::pin_mut!(left, right);
                    match future::select(left, right).await {
                        Winner::Left((outcome, _)) | Winner::Right((outcome, _)) => outcome,
                    }
                }
                Err(_) => {
                    let left = first.evaluate(&ctx);
                    let right = second.evaluate(&ctx);
                    futures::pin_mut!(left, right);
                    match future::select(left, right).await {
                        Winner::Left((outcome, _)) | Winner::Right((outcome, _)) => outcome,
                    }
                }
            };
            Trampoline::done(outcome)
        })
    })
}

/// Fail with `error` if `effect` has not finished within `duration`.
pub fn timeout<R, E, A>(effect: Effect<R, E, A>, duration: Duration, error: E) -> Effect<R, E, A>
where
    R: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
    A: Send + 'static,
{
    let timer = sleep(duration).and_then(move |_| fail(error.clone()));
    race(effect, timer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::constructors::{from_async, pure};
    use crate::effect::Never;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn delayed(ms: u64, value: i32) -> Effect<(), String, i32> {
        sleep(Duration::from_millis(ms)).map(move |_| value)
    }

    #[tokio::test]
    async fn test_sequence_keeps_input_order() {
        let effects = vec![delayed(30, 0), delayed(10, 1), delayed(0, 2)];
        assert_eq!(sequence(effects).run(()).await, Ok(vec![0, 1, 2]));
    }

    #[tokio::test]
    async fn test_sequence_of_nothing() {
        let effects: Vec<Effect<(), String, i32>> = Vec::new();
        assert_eq!(sequence(effects).run(()).await, Ok(vec![]));
    }

    #[tokio::test]
    async fn test_sequence_waits_for_every_branch_before_failing() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let slow = from_async(move |_: Arc<()>| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            }
        });
        let effects = vec![fail("fast failure".to_string()), slow];

        assert_eq!(sequence(effects).run(()).await, Err("fast failure".to_string()));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sequence_branches_overlap() {
        let started = tokio::time::Instant::now();
        let effects = (0..8).map(|i| delayed(50, i)).collect();
        assert_eq!(sequence(effects).run(()).await.unwrap().len(), 8);
        assert!(started.elapsed() < Duration::from_millis(300));
    }

    #[test]
    fn test_sequence_without_tokio() {
        let effects = vec![pure::<(), String, _>(1), pure(2)];
        let result = futures::executor::block_on(sequence(effects).run(()));
        assert_eq!(result, Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_map_m_and_filter_m() {
        let doubled = map_m(vec![1, 2, 3], |n| pure::<(), String, _>(n * 2));
        assert_eq!(doubled.run(()).await, Ok(vec![2, 4, 6]));

        let evens = filter_m(vec![1, 2, 3, 4], |n| pure::<(), String, _>(n % 2 == 0));
        assert_eq!(evens.run(()).await, Ok(vec![2, 4]));
    }

    #[tokio::test]
    async fn test_race_picks_the_faster_branch() {
        let effect = race(delayed(50, 1), delayed(1, 2));
        assert_eq!(effect.run(()).await, Ok(2));
    }

    #[tokio::test]
    async fn test_race_loser_task_is_aborted() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let slow = from_async(move |_: Arc<()>| {
            let counter = Arc::clone(&counter);
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(1)
            }
        });

        assert_eq!(race(slow, delayed(1, 2)).run(()).await, Ok(2));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_race_without_tokio() {
        let effect = race(pure::<(), String, _>(1), pure(2));
        assert!(futures::executor::block_on(effect.run(())).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_fires() {
        let slow = sleep::<(), &str>(Duration::from_secs(5)).map(|_| 1);
        let bounded = timeout(slow, Duration::from_millis(5), "timed out");
        assert_eq!(bounded.run(()).await, Err("timed out"));

        let quick = timeout(pure::<(), &str, _>(3), Duration::from_secs(5), "timed out");
        assert_eq!(quick.run(()).await, Ok(3));
    }

    #[tokio::test]
    async fn test_sequence_of_never_failing_effects() {
        let effects = vec![pure::<(), Never, _>('a'), pure('b')];
        assert_eq!(sequence(effects).run(()).await, Ok(vec!['a', 'b']));
    }
}
