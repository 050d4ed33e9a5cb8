//! Testing utilities for code built on effects.
//!
//! Includes a mock environment builder, assertion macros for [`Either`] and
//! run results, and a helper for running work on a thread with a small stack.
//!
//! # Examples
//!
//! ## MockEnv Builder
//!
//! ```rust
//! use millrace::testing::MockEnv;
//!
//! struct Clock {
//!     now: u64,
//! }
//!
//! let env = MockEnv::new().with(|| Clock { now: 7 }).build();
//! let ((), clock) = env;
//! assert_eq!(clock.now, 7);
//! ```
//!
//! ## Assertion Macros
//!
//! ```rust
//! use millrace::{assert_left, assert_right, Either};
//!
//! let ok: Either<String, i32> = Either::Right(42);
//! assert_eq!(assert_right!(ok), 42);
//!
//! let failed: Result<i32, &str> = Err("boom");
//! assert_eq!(assert_left!(failed), "boom");
//! ```
//!
//! [`Either`]: crate::Either

use std::panic;
use std::thread;

/// Builder for composing test environments.
///
/// Each call to [`with`](MockEnv::with) nests a new component, so the built
/// environment is a left-nested tuple.
///
/// ```rust
/// use millrace::effect::prelude::*;
/// use millrace::testing::MockEnv;
///
/// struct Config {
///     retries: u32,
/// }
///
/// struct Greeter {
///     name: String,
/// }
///
/// let env = MockEnv::new()
///     .with(|| Config { retries: 3 })
///     .with(|| Greeter { name: "mill".to_string() })
///     .build();
///
/// let effect = asks::<_, String, _, _>(|((_, config), greeter): &(((), Config), Greeter)| {
///     format!("{} x{}", greeter.name, config.retries)
/// });
/// # tokio_test::block_on(async {
/// assert_eq!(effect.run(env).await, Ok("mill x3".to_string()));
/// # });
/// ```
#[derive(Debug)]
pub struct MockEnv<Env> {
    env: Env,
}

impl MockEnv<()> {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self { env: () }
    }
}

impl Default for MockEnv<()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Env> MockEnv<Env> {
    /// Add a component produced by `f`.
    pub fn with<F, T>(self, f: F) -> MockEnv<(Env, T)>
    where
        F: FnOnce() -> T,
    {
        MockEnv {
            env: (self.env, f()),
        }
    }

    /// Finish building.
    pub fn build(self) -> Env {
        self.env
    }
}

/// Assert that a value is a success and evaluate to the success value.
///
/// Accepts both [`Either`](crate::Either) (expecting `Right`) and `Result`
/// (expecting `Ok`).
///
/// ```rust
/// use millrace::{assert_right, Either};
///
/// let value = assert_right!(Either::<String, _>::Right(3));
/// assert_eq!(value, 3);
/// ```
#[macro_export]
macro_rules! assert_right {
    ($value:expr) => {
        match $crate::Either::from($value) {
            $crate::Either::Right(value) => value,
            $crate::Either::Left(err) => {
                panic!("Expected success, got failure: {:?}", err);
            }
        }
    };
}

/// Assert that a value is a failure and evaluate to the error.
///
/// Accepts both [`Either`](crate::Either) (expecting `Left`) and `Result`
/// (expecting `Err`).
///
/// ```rust
/// use millrace::assert_left;
///
/// let err = assert_left!(Err::<u8, _>("closed"));
/// assert_eq!(err, "closed");
/// ```
#[macro_export]
macro_rules! assert_left {
    ($value:expr) => {
        match $crate::Either::from($value) {
            $crate::Either::Left(err) => err,
            $crate::Either::Right(value) => {
                panic!("Expected failure, got success: {:?}", value);
            }
        }
    };
}

/// Run `f` on a fresh thread whose stack is `bytes` long and return its result.
///
/// Useful for checking that deep effect chains run in constant stack. A panic
/// inside `f` is resumed on the calling thread.
///
/// ```rust
/// use millrace::testing::with_stack_size;
///
/// assert_eq!(with_stack_size(128 * 1024, || 2 + 2), 4);
/// ```
pub fn with_stack_size<T, F>(bytes: usize, f: F) -> T
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let spawned = thread::Builder::new()
        .name("millrace-small-stack".to_string())
        .stack_size(bytes)
        .spawn(f);
    match spawned {
        Ok(handle) => match handle.join() {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        },
        Err(err) => panic!("failed to spawn test thread: {}", err),
    }
}
