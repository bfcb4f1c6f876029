//! # Tasks, signals and task trees.
//!
//! This module provides the building blocks the middleware schedules work with:
//! - [`AbortSignal`] / [`AbortReason`] - reason-carrying cooperative cancellation
//! - [`TaskStatus`] / [`TaskResult`] - lifecycle state and settled outcome
//! - [`ForkedTask`] / [`ForkApi`] / [`ForkOptions`] - child tasks bounded by their parent

mod fork;
pub(crate) mod scope;
pub(crate) mod signal;
mod status;

pub use fork::{ForkApi, ForkOptions, ForkedTask};
pub use signal::{AbortReason, AbortSignal};
pub use status::{TaskResult, TaskStatus};
