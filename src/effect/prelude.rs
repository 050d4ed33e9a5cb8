//! Convenient re-exports for effect code.
//!
//! ```rust
//! use millrace::effect::prelude::*;
//! ```

pub use crate::context::RuntimeContext;
pub use crate::effect::bracket::{bracket, bracket_full, BracketError};
pub use crate::effect::constructors::{
    asks, catch, catch_all, environment, error, fail, from_async, from_fn, from_result, pure,
    sleep, success, suspend,
};
pub use crate::effect::parallel::{filter_m, map_m, race, sequence, timeout};
pub use crate::effect::{Effect, Never, RunOutcome};
pub use crate::either::Either;
pub use crate::error::Panicked;
pub use crate::refs::Ref;
pub use crate::resource::Resource;
