//! # Host store contract.
//!
//! The middleware does not own state. It wraps a host [`Store`] that knows how to
//! snapshot its state and how to forward an action to the next middleware/reducer.
//!
//! ```text
//! caller ──► ListenerMiddleware::dispatch(a)
//!              ├─► before = store.get_state()
//!              ├─► out    = store.dispatch(a)        (always, unchanged)
//!              ├─► after  = store.get_state()
//!              └─► fan-out to waiters and listeners
//!            ◄── out
//! ```

use std::sync::Arc;

/// A dispatchable action with a string discriminant.
///
/// The discriminant is what [`Selector::Type`](crate::Selector::Type) and
/// [`ActionCreator`](crate::ActionCreator) selectors match against.
pub trait Action: Clone + Send + Sync + 'static {
    /// Returns the action's type string, e.g. `"counter/increment"`.
    fn action_type(&self) -> &str;
}

/// The store-like collaborator wrapped by the middleware.
///
/// `dispatch` is the next link in the middleware chain (ultimately the reducer); the
/// listener middleware calls it for every action before any listener runs.
pub trait Store: Send + Sync + 'static {
    /// State snapshot type.
    type State: Clone + Send + Sync + 'static;
    /// Action type accepted by `dispatch`.
    type Action: Action;
    /// Whatever the next link returns for a dispatched action.
    type Output;

    /// Returns the current state.
    fn get_state(&self) -> Self::State;

    /// Forwards `action` to the next middleware/reducer.
    fn dispatch(&self, action: Self::Action) -> Self::Output;
}

impl<T: Store> Store for Arc<T> {
    type State = T::State;
    type Action = T::Action;
    type Output = T::Output;

    fn get_state(&self) -> Self::State {
        (**self).get_state()
    }

    fn dispatch(&self, action: Self::Action) -> Self::Output {
        (**self).dispatch(action)
    }
}
