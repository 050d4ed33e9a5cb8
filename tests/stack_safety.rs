//! Long chains must run in constant stack.
//!
//! Every test builds and runs its effect on a thread with a 256 KiB stack,
//! far too small for a recursive evaluation of ten thousand steps.

use millrace::effect::prelude::*;
use millrace::testing::with_stack_size;
use std::time::Duration;

const SMALL_STACK: usize = 256 * 1024;
const DEPTH: u64 = 10_000;

fn block_on<E: Send + 'static, A: Send + 'static>(effect: Effect<(), E, A>) -> Result<A, E> {
    tokio_test::block_on(effect.run(()))
}

#[test]
fn and_then_chain_of_ten_thousand() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = pure::<(), String, u64>(0);
        for _ in 0..DEPTH {
            effect = effect.and_then(|n| pure(n + 1));
        }
        block_on(effect)
    });
    assert_eq!(result, Ok(DEPTH));
}

#[test]
fn recover_chain_of_ten_thousand() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = fail::<(), u64, ()>(0);
        for _ in 0..DEPTH {
            effect = effect.recover(|n| fail(n + 1));
        }
        block_on(effect)
    });
    assert_eq!(result, Err(DEPTH));
}

#[test]
fn either_absolve_chain_of_ten_thousand() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = fail::<(), String, u64>("deep".to_string());
        for _ in 0..DEPTH {
            effect = effect.either().absolve();
        }
        block_on(effect)
    });
    assert_eq!(result, Err("deep".to_string()));
}

#[test]
fn map_and_ensure_chain_of_ten_thousand() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = pure::<(), String, u64>(0);
        for _ in 0..DEPTH {
            effect = effect.map(|n| n + 1).ensure(pure(()));
        }
        block_on(effect)
    });
    assert_eq!(result, Ok(DEPTH));
}

#[test]
fn async_steps_inside_a_long_chain() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = pure::<(), String, u64>(0);
        for i in 0..DEPTH {
            effect = if i % 100 == 0 {
                effect.map_async(|n| async move {
                    tokio::task::yield_now().await;
                    n + 1
                })
            } else {
                effect.and_then(|n| pure(n + 1))
            };
        }
        current_thread_runtime().block_on(effect.run(()))
    });
    assert_eq!(result, Ok(DEPTH));
}

fn current_thread_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

#[test]
fn instrumented_chain_of_ten_thousand() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = pure::<(), String, u64>(0);
        for _ in 0..DEPTH {
            effect = effect
                .map(|n| n + 1)
                .instrument(tracing::trace_span!("step"));
        }
        current_thread_runtime().block_on(effect.run(()))
    });
    assert_eq!(result, Ok(DEPTH));
}

#[test]
fn nested_timeouts_of_ten_thousand() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = pure::<(), String, u64>(0);
        for _ in 0..DEPTH {
            effect = timeout(
                effect.map(|n| n + 1),
                Duration::from_secs(60),
                "timed out".to_string(),
            );
        }
        current_thread_runtime().block_on(effect.run(()))
    });
    assert_eq!(result, Ok(DEPTH));
}

#[test]
fn same_composition_runs_repeatedly() {
    let result = with_stack_size(SMALL_STACK, || {
        let mut effect = pure::<(), String, u64>(1);
        for _ in 0..DEPTH {
            effect = effect.and_then(pure);
        }
        (0..3).map(|_| block_on(effect.clone())).collect::<Vec<_>>()
    });
    assert_eq!(result, vec![Ok(1), Ok(1), Ok(1)]);
}
