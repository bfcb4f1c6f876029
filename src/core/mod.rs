//! Middleware core: dispatch, registry and task orchestration.
//!
//! The public API from this module is [`ListenerMiddleware`] with its builder, the
//! [`ListenerApi`] handed to effects, the [`Unsubscribe`] handle and the error-hook
//! types.
//!
//! Internal modules:
//! - [`middleware`]: dispatch fan-out, registry operations, control actions;
//! - [`registry`]: ordered listener entries with dedup and running-task tracking;
//! - [`waiters`]: one-shot action waiters behind `take`/`condition`;
//! - [`api`]: the listener effect API;
//! - [`runner`]: start policies and the listener/fork task runners;
//! - [`sink`]: error routing to `on_error` and the event bus;
//! - [`builder`]: middleware construction.

mod api;
mod builder;
mod middleware;
mod registry;
mod runner;
mod sink;
mod waiters;

pub use api::ListenerApi;
pub use builder::ListenerMiddlewareBuilder;
pub use middleware::{ListenerMiddleware, Unsubscribe};
pub use sink::{ErrorContext, ErrorHandler, RaisedBy};
