//! Tests for the effect kernel as a whole.

use super::prelude::*;
use crate::testing::with_stack_size;
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn run_blocking<A: Send + 'static, E: Send + 'static>(effect: Effect<(), E, A>) -> Result<A, E> {
    tokio_test::block_on(effect.run(()))
}

fn f(x: i32) -> Effect<(), String, i32> {
    if x % 5 == 0 {
        fail(format!("{} is a multiple of five", x))
    } else {
        pure(x.wrapping_mul(2))
    }
}

fn g(x: i32) -> Effect<(), String, i32> {
    pure(x.wrapping_sub(3))
}

proptest! {
    #[test]
    fn prop_left_identity(a in any::<i32>()) {
        prop_assert_eq!(run_blocking(pure(a).and_then(f)), run_blocking(f(a)));
    }

    #[test]
    fn prop_right_identity(a in any::<i32>(), failing in any::<bool>()) {
        let m: Effect<(), String, i32> = if failing { fail(a.to_string()) } else { pure(a) };
        prop_assert_eq!(run_blocking(m.clone().and_then(pure)), run_blocking(m));
    }

    #[test]
    fn prop_associativity(a in any::<i32>()) {
        let m: Effect<(), String, i32> = pure(a);
        let left = m.clone().and_then(f).and_then(g);
        let right = m.and_then(|x| f(x).and_then(g));
        prop_assert_eq!(run_blocking(left), run_blocking(right));
    }

    #[test]
    fn prop_either_then_absolve_is_identity(a in any::<i32>()) {
        prop_assert_eq!(run_blocking(f(a).either().absolve()), run_blocking(f(a)));
    }
}

#[tokio::test]
async fn test_building_performs_no_work() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let effect = from_fn::<(), String, _, _>(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    })
    .map(|x| x + 1)
    .and_then(|x| pure(x * 3))
    .recover(|_| pure(0))
    .ensure(pure(()));

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(effect.run(()).await, Ok::<_, String>(6));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_run_detailed_reports_clean_scope() {
    let outcome = pure::<(), String, _>(1).named("noop").run_detailed(()).await;
    assert_eq!(outcome.result, Ok(1));
    assert!(outcome.release_errors.is_empty());
}

#[test]
fn test_named_and_debug() {
    let effect = pure::<(), String, _>(1).named("load_config");
    assert_eq!(effect.label(), Some("load_config"));
    assert!(format!("{:?}", effect).contains("load_config"));
    assert_eq!(pure::<(), String, _>(1).label(), None);
}

#[test]
fn test_long_and_then_chain_on_small_stack() {
    let result = with_stack_size(256 * 1024, || {
        let mut effect = pure::<(), String, u64>(0);
        for _ in 0..10_000 {
            effect = effect.and_then(|n| pure(n + 1));
        }
        run_blocking(effect)
    });
    assert_eq!(result, Ok(10_000));
}

#[test]
fn test_long_recover_chain_on_small_stack() {
    let result = with_stack_size(256 * 1024, || {
        let mut effect = fail::<(), u64, u64>(0);
        for _ in 0..10_000 {
            effect = effect.recover(|n| fail(n + 1));
        }
        run_blocking(effect)
    });
    assert_eq!(result, Err(10_000));
}

#[test]
fn test_deep_recursion_through_suspend() {
    fn sum_to(n: u64) -> Effect<(), Never, u64> {
        if n == 0 {
            pure(0)
        } else {
            suspend(move || sum_to(n - 1)).map(move |acc| acc + n)
        }
    }

    let result = with_stack_size(256 * 1024, || run_blocking(sum_to(20_000)));
    assert_eq!(result, Ok(200_010_000));
}
