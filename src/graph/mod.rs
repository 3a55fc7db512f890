//! Deferred tile computations.
//!
//! A [`TaskGraph`] hands out [`Delayed`] nodes, one per distinct
//! [`TaskKey`]; [`LazyArray`]s arrange those nodes into arrays; an
//! [`Executor`] evaluates whatever part of an array is asked for and keeps
//! recent tile values in a byte-bounded cache.
//!
//! ```text
//!   Fetch(level, col, row) ──► Mask(level, col, row)
//!            │                         │
//!            ▼                         ▼
//!     raw LazyArray              mask LazyArray
//! ```

mod array;
mod executor;
mod results;
mod task;

pub use array::LazyArray;
pub use executor::Executor;
pub use results::DEFAULT_RESULT_CACHE_CAPACITY;
pub use task::{Delayed, TaskGraph, TaskKey, TaskKind};
