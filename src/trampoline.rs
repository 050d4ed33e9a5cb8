//! Stack-safe, resumable computation descriptions.
//!
//! A [`Trampoline`] describes a computation as data. Driving it to completion
//! happens in an explicit loop, so composition depth never turns into call
//! stack depth. Four shapes exist:
//!
//! - `Done(a)` - the computation has finished with `a`
//! - `Call(thunk)` - one unit of pending work producing the next trampoline
//! - `AndThen(sub, cont)` - run `sub`, feed its result to `cont`
//! - `Suspend(future)` - wait for a future that yields the next trampoline
//!
//! `Suspend` is how asynchronous work enters the loop: the driver awaits the
//! future and keeps going with whatever trampoline it produced, instead of
//! nesting one future inside another for every composed step.
//!
//! [`Trampoline::in_span`] adds two markers around a sub-computation. The
//! driver keeps a stack of open `tracing` spans and enters the innermost one
//! around every step and every awaited suspension, so nesting spans costs
//! heap, not call stack.
//!
//! # Re-association
//!
//! [`Trampoline::and_then`] never nests work eagerly. The driver rewrites a
//! left-nested `AndThen(AndThen(x, f), g)` into `AndThen(x, v -> AndThen(f(v), g))`
//! one step at a time, so a chain of `n` binds costs `n` loop iterations and a
//! constant amount of stack no matter how it was associated.
//!
//! # Example
//!
//! ```rust
//! use millrace::Trampoline;
//!
//! fn count_down(n: u64, acc: u64) -> Trampoline<u64> {
//!     if n == 0 {
//!         Trampoline::done(acc)
//!     } else {
//!         Trampoline::call(move || count_down(n - 1, acc + n))
//!     }
//! }
//!
//! assert_eq!(count_down(100_000, 0).run(), 5_000_050_000);
//! ```

use std::any::Any;
use std::future::Future;
use std::marker::PhantomData;

use tracing::Instrument as _;

use crate::defer::Deferred;
use crate::effect::BoxFuture;

type Payload = Box<dyn Any + Send>;
type Thunk = Box<dyn FnOnce() -> Step + Send>;
type Continuation = Deferred<Box<dyn FnOnce(Payload) -> Step + Send>>;

/// Type-erased trampoline node. The typed wrapper guarantees that every
/// payload reaching a continuation has the type that continuation expects.
enum Step {
    Done(Payload),
    Call(Thunk),
    AndThen(Deferred<Box<Step>>, Continuation),
    Suspend(BoxFuture<'static, Step>),
    Enter(tracing::Span),
    Exit(Payload),
}

/// Outcome of resuming a step by exactly one level.
enum Resumed {
    Finished(Payload),
    Next(Step),
    Pending(BoxFuture<'static, Step>),
    Enter(tracing::Span, Step),
    Exit(Step),
}

fn continuation<F>(f: F) -> Continuation
where
    F: FnOnce(Payload) -> Step + Send + 'static,
{
    Deferred::new(Box::new(f))
}

fn resumed_with(value: Payload, cont: Continuation) -> Step {
    Step::AndThen(Deferred::new(Box::new(Step::Done(value))), cont)
}

fn resume(step: Step) -> Resumed {
    match step {
        Step::Done(value) => Resumed::Finished(value),
        Step::Call(thunk) => Resumed::Next(thunk()),
        Step::Suspend(future) => Resumed::Pending(future),
        Step::Enter(span) => Resumed::Enter(span, Step::Done(Box::new(()))),
        Step::Exit(value) => Resumed::Exit(Step::Done(value)),
        Step::AndThen(sub, cont) => match *sub.into_inner() {
            Step::Done(value) => Resumed::Next((cont.into_inner())(value)),
            Step::Call(thunk) => Resumed::Next(Step::AndThen(Deferred::new(Box::new(thunk())), cont)),
            Step::AndThen(inner, inner_cont) => {
                let rebound = continuation(move |value| {
                    Step::AndThen(
                        Deferred::new(Box::new((inner_cont.into_inner())(value))),
                        cont,
                    )
                });
                Resumed::Next(Step::AndThen(inner, rebound))
            }
            Step::Suspend(future) => Resumed::Pending(Box::pin(async move {
                Step::AndThen(Deferred::new(Box::new(future.await)), cont)
            })),
            // The continuation runs on the next resume, after the driver has
            // updated its span stack.
            Step::Enter(span) => Resumed::Enter(span, resumed_with(Box::new(()), cont)),
            Step::Exit(value) => Resumed::Exit(resumed_with(value, cont)),
        },
    }
}

fn unpack<A: 'static>(payload: Payload) -> A {
    match payload.downcast::<A>() {
        Ok(value) => *value,
        Err(_) => unreachable!("trampoline payload does not match its declared type"),
    }
}

/// A lazily described computation producing an `A`.
///
/// Building a trampoline performs no work beyond allocating its shape;
/// [`run`](Trampoline::run) or [`resolve`](Trampoline::resolve) drive it.
pub struct Trampoline<A> {
    step: Step,
    _marker: PhantomData<fn() -> A>,
}

impl<A> std::fmt::Debug for Trampoline<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shape = match self.step {
            Step::Done(_) => "Done",
            Step::Call(_) => "Call",
            Step::AndThen(..) => "AndThen",
            Step::Suspend(_) => "Suspend",
            Step::Enter(_) => "Enter",
            Step::Exit(_) => "Exit",
        };
        f.debug_tuple("Trampoline").field(&shape).finish()
    }
}

impl<A: Send + 'static> Trampoline<A> {
    fn from_step(step: Step) -> Self {
        Trampoline {
            step,
            _marker: PhantomData,
        }
    }

    /// A finished computation.
    pub fn done(value: A) -> Self {
        Self::from_step(Step::Done(Box::new(value)))
    }

    /// A suspended step; `thunk` runs when the driver reaches it.
    pub fn call<F>(thunk: F) -> Self
    where
        F: FnOnce() -> Trampoline<A> + Send + 'static,
    {
        Self::from_step(Step::Call(Box::new(move || thunk().step)))
    }

    /// A step that waits for `future` and continues with the trampoline it yields.
    pub fn suspend<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Trampoline<A>> + Send + 'static,
    {
        Self::from_step(Step::Suspend(Box::pin(async move { future.await.step })))
    }

    /// Returns `true` if this trampoline has already finished.
    pub fn is_done(&self) -> bool {
        matches!(self.step, Step::Done(_))
    }

    /// Sequence a continuation after this computation.
    ///
    /// A finished trampoline feeds `f` directly; anything else is wrapped in an
    /// `AndThen` node in constant time and re-associated by the driver.
    pub fn and_then<B, F>(self, f: F) -> Trampoline<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> Trampoline<B> + Send + 'static,
    {
        match self.step {
            Step::Done(value) => f(unpack(value)),
            step => Trampoline::from_step(Step::AndThen(
                Deferred::new(Box::new(step)),
                continuation(move |value| f(unpack(value)).step),
            )),
        }
    }

    /// Run this computation inside `span`.
    ///
    /// The span is entered around each step of the computation and around
    /// every future it suspends on, and left once the result is ready.
    pub fn in_span(self, span: tracing::Span) -> Self {
        Trampoline::<()>::from_step(Step::Enter(span))
            .and_then(move |()| self)
            .and_then(|value| Trampoline::from_step(Step::Exit(Box::new(value))))
    }

    /// Transform the eventual result.
    pub fn map<B, F>(self, f: F) -> Trampoline<B>
    where
        B: Send + 'static,
        F: FnOnce(A) -> B + Send + 'static,
    {
        self.and_then(move |value| Trampoline::done(f(value)))
    }

    /// Drive the trampoline to completion on the current thread.
    ///
    /// A `Suspend` step is waited on with `futures::executor::block_on`, so a
    /// trampoline that suspends on runtime-bound futures (tokio timers,
    /// sockets) must be driven with [`resolve`](Trampoline::resolve) instead.
    pub fn run(self) -> A {
        let mut step = self.step;
        let mut spans: Vec<tracing::Span> = Vec::new();
        loop {
            let resumed = {
                let _entered = spans.last().map(tracing::Span::enter);
                resume(step)
            };
            step = match resumed {
                Resumed::Finished(value) => return unpack(value),
                Resumed::Next(next) => next,
                Resumed::Pending(future) => {
                    let _entered = spans.last().map(tracing::Span::enter);
                    futures::executor::block_on(future)
                }
                Resumed::Enter(span, next) => {
                    spans.push(span);
                    next
                }
                Resumed::Exit(next) => {
                    spans.pop();
                    next
                }
            };
        }
    }

    /// Drive the trampoline to completion, awaiting suspensions.
    pub async fn resolve(self) -> A {
        let mut step = self.step;
        let mut spans: Vec<tracing::Span> = Vec::new();
        loop {
            let resumed = {
                let _entered = spans.last().map(tracing::Span::enter);
                resume(step)
            };
            step = match resumed {
                Resumed::Finished(value) => return unpack(value),
                Resumed::Next(next) => next,
                Resumed::Pending(future) => match spans.last() {
                    Some(span) => future.instrument(span.clone()).await,
                    None => future.await,
                },
                Resumed::Enter(span, next) => {
                    spans.push(span);
                    next
                }
                Resumed::Exit(next) => {
                    spans.pop();
                    next
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn on_small_stack<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
        std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(f)
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_done_runs_immediately() {
        assert_eq!(Trampoline::done(5).run(), 5);
    }

    #[test]
    fn test_building_performs_no_work() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let t = Trampoline::call(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Trampoline::done(1)
        })
        .map(|x| x + 1);

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!t.is_done());
        assert_eq!(t.run(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_and_then_on_done_applies_directly() {
        let t = Trampoline::done(20).and_then(|x| Trampoline::done(x + 1));
        assert!(t.is_done());
        assert_eq!(t.run(), 21);
    }

    #[test]
    fn test_left_nested_chain_is_stack_safe() {
        let result = on_small_stack(|| {
            let mut t = Trampoline::call(|| Trampoline::done(0u64));
            for _ in 0..100_000 {
                t = t.and_then(|n| Trampoline::call(move || Trampoline::done(n + 1)));
            }
            t.run()
        });
        assert_eq!(result, 100_000);
    }

    #[test]
    fn test_right_nested_chain_is_stack_safe() {
        fn build(n: u64) -> Trampoline<u64> {
            if n == 0 {
                Trampoline::done(0)
            } else {
                Trampoline::call(move || build(n - 1)).and_then(|x| Trampoline::done(x + 2))
            }
        }

        assert_eq!(on_small_stack(|| build(50_000).run()), 100_000);
    }

    #[test]
    fn test_unrun_chain_drops_without_overflow() {
        on_small_stack(|| {
            let mut t = Trampoline::call(|| Trampoline::done(0u64));
            for _ in 0..100_000 {
                t = t.map(|n| n + 1);
            }
            drop(t);
        });
    }

    #[test]
    fn test_map_changes_type() {
        let t = Trampoline::call(|| Trampoline::done(3)).map(|n: i32| n.to_string());
        assert_eq!(t.run(), "3");
    }

    #[tokio::test]
    async fn test_resolve_awaits_suspensions() {
        let t = Trampoline::suspend(async {
            tokio::task::yield_now().await;
            Trampoline::done(10)
        })
        .and_then(|x| {
            Trampoline::suspend(async move {
                tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                Trampoline::done(x * 2)
            })
        });

        assert_eq!(t.resolve().await, 20);
    }

    #[test]
    fn test_run_blocks_on_plain_futures() {
        let t = Trampoline::suspend(async { Trampoline::done("ready") });
        assert_eq!(t.run(), "ready");
    }

    #[test]
    fn test_nested_spans_are_stack_safe() {
        let result = on_small_stack(|| {
            let mut t = Trampoline::call(|| Trampoline::done(0u64));
            for _ in 0..10_000 {
                t = t.map(|n| n + 1).in_span(tracing::trace_span!("level"));
            }
            t.run()
        });
        assert_eq!(result, 10_000);
    }

    #[test]
    #[traced_test]
    fn test_span_covers_only_the_wrapped_steps() {
        let t = Trampoline::call(|| {
            tracing::info!("inside work");
            Trampoline::done(1)
        })
        .in_span(tracing::info_span!("unit_of_work"))
        .map(|n| {
            tracing::info!("after work");
            n + 1
        });

        assert_eq!(t.run(), 2);
        logs_assert(|lines: &[&str]| {
            let find = |needle: &str| {
                lines
                    .iter()
                    .find(|line| line.contains(needle))
                    .ok_or_else(|| format!("no line containing {:?}", needle))
            };
            let inside = find("inside work")?;
            let after = find("after work")?;
            if !inside.contains("unit_of_work") {
                return Err(format!("event outside its span: {}", inside));
            }
            if after.contains("unit_of_work") {
                return Err(format!("span still open: {}", after));
            }
            Ok(())
        });
    }

    #[tokio::test]
    #[traced_test]
    async fn test_span_stays_entered_across_suspensions() {
        let t = Trampoline::suspend(async {
            tokio::task::yield_now().await;
            tracing::info!("resumed after yield");
            Trampoline::done(3)
        })
        .in_span(tracing::info_span!("suspending_work"));

        assert_eq!(t.resolve().await, 3);
        logs_assert(|lines: &[&str]| {
            match lines.iter().find(|line| line.contains("resumed after yield")) {
                Some(line) if line.contains("suspending_work") => Ok(()),
                Some(line) => Err(format!("event outside its span: {}", line)),
                None => Err("event missing".to_string()),
            }
        });
    }

    #[test]
    fn test_debug_shows_shape() {
        assert_eq!(format!("{:?}", Trampoline::done(1)), "Trampoline(\"Done\")");
        let call = Trampoline::call(|| Trampoline::done(1));
        assert_eq!(format!("{:?}", call), "Trampoline(\"Call\")");
    }
}
