//! Combinators on [`Effect`](crate::Effect).
//!
//! Each file adds one family of methods to `Effect` through its own inherent
//! `impl` block. None of them performs work when called: they wrap the inner
//! effect's evaluation function and route the continuation through the
//! trampoline.

mod and_then;
mod ensure;
mod local;
mod map;
mod recover;
mod tap;
