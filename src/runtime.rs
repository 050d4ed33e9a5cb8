//! Blocking execution of effects on a configured tokio runtime.
//!
//! [`Effect::run`](crate::Effect::run) is async and works inside any tokio
//! application. Programs without their own runtime build a [`Runtime`] from
//! an explicit [`RuntimeConfig`] and call [`Runtime::block_on`].
//!
//! # Environment Variables
//!
//! [`RuntimeConfig::from_env`] reads:
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `MILLRACE_WORKER_THREADS` | Number of worker threads | CPU count |
//! | `MILLRACE_THREAD_NAME` | Worker thread name | `millrace-worker` |
//! | `MILLRACE_THREAD_STACK_SIZE` | Worker stack size in bytes | tokio default |
//! | `MILLRACE_MAX_BLOCKING_THREADS` | Blocking pool size limit | tokio default |
//!
//! Invalid values are ignored with a warning.
//!
//! # Example
//!
//! ```rust
//! use millrace::effect::prelude::*;
//! use millrace::{Runtime, RuntimeConfig};
//!
//! let runtime = Runtime::new(RuntimeConfig::default().worker_threads(2)).unwrap();
//! let effect = asks::<u32, String, _, _>(|n| n * 2);
//! assert_eq!(runtime.block_on(&effect, 21), Ok(42));
//! ```

use std::env;
use std::fmt;

use crate::effect::{Effect, RunOutcome};
use crate::error::RuntimeError;

const DEFAULT_THREAD_NAME: &str = "millrace-worker";
const MIN_STACK_SIZE: usize = 64 * 1024;

/// Settings for the runtime behind [`Runtime::block_on`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct RuntimeConfig {
    /// Worker thread count; `None` uses one per CPU
    pub worker_threads: Option<usize>,
    /// Name given to worker threads
    pub thread_name: String,
    /// Worker stack size in bytes; `None` keeps tokio's default
    pub thread_stack_size: Option<usize>,
    /// Upper bound on the blocking thread pool; `None` keeps tokio's default
    pub max_blocking_threads: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            thread_stack_size: None,
            max_blocking_threads: None,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from `MILLRACE_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = parse_env_usize("MILLRACE_WORKER_THREADS") {
            config.worker_threads = Some(n);
        }
        if let Ok(name) = env::var("MILLRACE_THREAD_NAME") {
            if name.trim().is_empty() {
                tracing::warn!(variable = "MILLRACE_THREAD_NAME", "ignoring empty thread name");
            } else {
                config.thread_name = name;
            }
        }
        if let Some(size) = parse_env_usize("MILLRACE_THREAD_STACK_SIZE") {
            config.thread_stack_size = Some(size);
        }
        if let Some(n) = parse_env_usize("MILLRACE_MAX_BLOCKING_THREADS") {
            config.max_blocking_threads = Some(n);
        }
        config
    }

    /// Set the worker thread count.
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.worker_threads = Some(n);
        self
    }

    /// Set the worker thread name.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }

    /// Set the worker stack size in bytes.
    pub fn thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = Some(bytes);
        self
    }

    /// Set the blocking pool limit.
    pub fn max_blocking_threads(mut self, n: usize) -> Self {
        self.max_blocking_threads = Some(n);
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<(), RuntimeError> {
        if self.worker_threads == Some(0) {
            return Err(invalid("worker_threads", "must be at least 1"));
        }
        if self.thread_name.trim().is_empty() {
            return Err(invalid("thread_name", "must not be empty"));
        }
        if let Some(size) = self.thread_stack_size {
            if size < MIN_STACK_SIZE {
                return Err(invalid(
                    "thread_stack_size",
                    &format!("must be at least {} bytes", MIN_STACK_SIZE),
                ));
            }
        }
        if self.max_blocking_threads == Some(0) {
            return Err(invalid("max_blocking_threads", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> RuntimeError {
    RuntimeError::InvalidConfig {
        field: field.to_string(),
        message: message.to_string(),
    }
}

fn parse_env_usize(name: &str) -> Option<usize> {
    let raw = env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(n) => Some(n),
        Err(err) => {
            tracing::warn!(variable = name, value = %raw, error = %err, "ignoring invalid setting");
            None
        }
    }
}

/// A multi-threaded runtime for running effects from synchronous code.
pub struct Runtime {
    runtime: tokio::runtime::Runtime,
    config: RuntimeConfig,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .finish()
    }
}

impl Runtime {
    /// Build a runtime from `config`.
    pub fn new(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        config.validate()?;

        let mut builder = tokio::runtime::Builder::new_multi_thread();
        builder.enable_time().thread_name(config.thread_name.clone());
        if let Some(n) = config.worker_threads {
            builder.worker_threads(n);
        }
        if let Some(bytes) = config.thread_stack_size {
            builder.thread_stack_size(bytes);
        }
        if let Some(n) = config.max_blocking_threads {
            builder.max_blocking_threads(n);
        }
        let runtime = builder.build()?;

        tracing::debug!(?config, "runtime started");
        Ok(Runtime { runtime, config })
    }

    /// Build a runtime with [`RuntimeConfig::default`].
    pub fn with_defaults() -> Result<Self, RuntimeError> {
        Self::new(RuntimeConfig::default())
    }

    /// The configuration this runtime was built with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Run `effect` to completion, blocking the calling thread.
    ///
    /// # Panics
    ///
    /// Panics if called from inside an async context, and resumes any panic
    /// raised by the effect after its resources have been released.
    pub fn block_on<R, E, A>(&self, effect: &Effect<R, E, A>, environment: R) -> Result<A, E>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        A: Send + 'static,
    {
        self.runtime.block_on(effect.run(environment))
    }

    /// Like [`block_on`](Runtime::block_on), but also reports release failures.
    pub fn block_on_detailed<R, E, A>(
        &self,
        effect: &Effect<R, E, A>,
        environment: R,
    ) -> RunOutcome<E, A>
    where
        R: Send + Sync + 'static,
        E: Send + 'static,
        A: Send + 'static,
    {
        self.runtime.block_on(effect.run_detailed(environment))
    }
}
