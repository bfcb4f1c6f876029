//! # listenvisor
//!
//! **Listenvisor** is an action-driven listener middleware for Rust.
//!
//! It sits in front of a host store, forwards every dispatched action unchanged, and
//! then starts the effects of all listeners whose selector matches the action. Effects
//! run as cancellable tokio tasks that can wait for future actions, fork child tasks
//! bounded by their own lifetime, and register or remove listeners.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!      caller                                   effects (via ListenerApi)
//!        │ dispatch(a)                                  │ dispatch / subscribe / fork
//!        ▼                                              ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  ListenerMiddleware (one per store, no globals)                   │
//! │  - Store       (host: get_state / dispatch, always called first)  │
//! │  - Registry    (selector → effect entries, registration order)    │
//! │  - Waiters     (one-shot take/condition predicates)               │
//! │  - Launcher    (StartPolicy: Immediate inline poll / Deferred)    │
//! │  - ErrorSink   (on_error hook + error events)                     │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        ▼                  ▼                  ▼               │
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   │
//!     │ listener task│   │ listener task│   │ listener task│   │
//!     │  (signal)    │   │  (signal)    │   │  (signal)    │   │
//!     └┬─────┬───────┘   └┬─────────────┘   └┬─────────────┘   │
//!      │     └─► forks (child signals)       │                 │
//!      │ Publishes        │ Publishes        │ Publishes       │
//!      │ - TaskStarted    │ - TaskCancelled  │ - TaskFailed    │
//!      │ - ForkStarted    │ - ...            │ - EffectFailed  │
//!      ▼                  ▼                  ▼                 ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                        Bus (broadcast channel)                    │
//! │                    (capacity: Config::bus_capacity)               │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                        forwarder ──► SubscriberSet (per-sub queues)
//!                                   ┌─────────┼─────────┐
//!                                   ▼         ▼         ▼
//!                                worker1   worker2   workerN
//! ```
//!
//! ### Task lifecycle
//! ```text
//! dispatch(a) ─► entry matches ─► TaskScope{ id, signal } ─► run_listener
//!
//!   effect(a, api)
//!     ├─ suspends at condition / take / delay / pause / fork result
//!     │     └─ signal aborted? ─► Err(TaskAbortError) ─► `?` unwinds the effect
//!     └─ returns
//!           ├─ Ok      ─► wait auto-joined forks ─► abort(listener-completed) ─► ok
//!           ├─ Aborted ─► cancelled
//!           └─ Err     ─► rejected ─► ErrorSink
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                         |
//! |-------------------|---------------------------------------------------------------|--------------------------------------------|
//! | **Host contract** | What the middleware wraps.                                    | [`Store`], [`Action`]                      |
//! | **Listeners**     | Selectors, effects, registration and control actions.         | [`Selector`], [`EffectFn`], [`ListenerOptions`] |
//! | **Effect API**    | Waiting, forking, cancelling from inside an effect.           | [`ListenerApi`], [`ForkedTask`]            |
//! | **Cancellation**  | Reason-carrying signals and settled results.                  | [`AbortSignal`], [`TaskResult`]            |
//! | **Subscriber API**| Hook into registry and task events.                           | [`Subscribe`]                              |
//! | **Errors**        | Typed errors for effects and construction.                    | [`ListenerError`], [`RuntimeError`]        |
//! | **Configuration** | Start policies and bus sizing.                                | [`Config`], [`StartPolicy`]                |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use parking_lot::Mutex;
//! use listenvisor::{Action, EffectFn, ListenerApi, ListenerMiddleware, ListenerOptions, Store};
//!
//! #[derive(Clone, Debug)]
//! enum Todo { Add(String), Clear }
//! impl Action for Todo {
//!     fn action_type(&self) -> &str {
//!         match self { Todo::Add(_) => "todos/add", Todo::Clear => "todos/clear" }
//!     }
//! }
//!
//! #[derive(Default)]
//! struct Todos(Mutex<Vec<String>>);
//! impl Store for Todos {
//!     type State = Vec<String>;
//!     type Action = Todo;
//!     type Output = ();
//!     fn get_state(&self) -> Vec<String> { self.0.lock().clone() }
//!     fn dispatch(&self, action: Todo) {
//!         match action {
//!             Todo::Add(t) => self.0.lock().push(t),
//!             Todo::Clear => self.0.lock().clear(),
//!         }
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mw = ListenerMiddleware::builder(Todos::default()).build()?;
//!
//!     // Clear the list if nobody adds another todo within 50ms.
//!     let _unsubscribe = mw.start_listening(ListenerOptions::action_type(
//!         "todos/add",
//!         EffectFn::arc(|_action: Todo, api: ListenerApi<Todos>| async move {
//!             api.cancel_active_listeners();
//!             let more = api
//!                 .condition(|a: &Todo, _: &Vec<String>, _: &Vec<String>| matches!(a, Todo::Add(_)),
//!                            Some(Duration::from_millis(50)))
//!                 .await?;
//!             if !more {
//!                 api.dispatch(Todo::Clear);
//!             }
//!             Ok(())
//!         }),
//!     ));
//!
//!     mw.dispatch(Todo::Add("write docs".into()));
//!     tokio::time::sleep(Duration::from_millis(80)).await;
//!     assert!(mw.get_state().is_empty());
//!     Ok(())
//! }
//! ```
mod config;
mod core;
mod error;
mod events;
mod listeners;
mod store;
mod subscribers;
mod tasks;

#[cfg(test)]
mod testing;

// ---- Public re-exports ----

pub use config::{Config, StartPolicy};
pub use crate::core::{
    ErrorContext, ErrorHandler, ListenerApi, ListenerMiddleware, ListenerMiddlewareBuilder,
    RaisedBy, Unsubscribe,
};
pub use error::{ListenerError, RuntimeError, TaskAbortError, UsageError};
pub use events::{Bus, Event, EventKind};
pub use listeners::{
    ActionCreator, BoxEffectFuture, CreatorFn, Effect, EffectFn, EffectRef, ListenerAction,
    ListenerActionOutcome, ListenerOptions, MatcherFn, PredicateFn, Selector,
    UnsubscribeOptions, add_listener, clear_all_listeners, remove_listener,
};
pub use store::{Action, Store};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{AbortReason, AbortSignal, ForkApi, ForkOptions, ForkedTask, TaskResult, TaskStatus};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
