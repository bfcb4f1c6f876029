//! # Listener effects.
//!
//! An [`Effect`] is what runs when a listener's selector matches a dispatched action.
//! [`EffectFn`] wraps a closure `Fn(action, api) -> Fut`, producing a fresh future per
//! matched action, and [`EffectRef`] is the shared handle used for registration.
//!
//! Effect identity is the `Arc` allocation: registering the same `EffectRef` twice
//! under the same selector yields one listener.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use listenvisor::{Action, EffectFn, EffectRef, ListenerApi, Store};
//!
//! #[derive(Clone, Debug)]
//! enum Act { Ping }
//! impl Action for Act {
//!     fn action_type(&self) -> &str { "ping" }
//! }
//!
//! struct Host;
//! impl Store for Host {
//!     type State = ();
//!     type Action = Act;
//!     type Output = ();
//!     fn get_state(&self) {}
//!     fn dispatch(&self, _: Act) {}
//! }
//!
//! let effect: EffectRef<Host> = EffectFn::arc(|_action: Act, api: ListenerApi<Host>| async move {
//!     api.ensure_active()?;
//!     Ok(())
//! });
//! # let _ = effect;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::core::ListenerApi;
use crate::error::ListenerError;
use crate::store::Store;

/// Boxed future returned by [`Effect::run`].
pub type BoxEffectFuture = Pin<Box<dyn Future<Output = Result<(), ListenerError>> + Send>>;

/// Shared effect handle (`Arc<dyn Effect>`).
pub type EffectRef<St, X = ()> = Arc<dyn Effect<St, X>>;

/// # Asynchronous reaction to a matched action.
///
/// `run` is called once per matched action and must only *create* the future; the
/// middleware decides when it is polled (see [`StartPolicy`](crate::StartPolicy)).
pub trait Effect<St: Store, X = ()>: Send + Sync + 'static {
    /// Creates the effect future for one matched action.
    fn run(&self, action: St::Action, api: ListenerApi<St, X>) -> BoxEffectFuture;
}

/// Function-backed effect.
pub struct EffectFn<F> {
    f: F,
}

impl<F> EffectFn<F> {
    /// Wraps `f` and returns it as a shared [`EffectRef`].
    ///
    /// The `Fn` bound here lets closure arguments be inferred from the store type.
    pub fn arc<St, X, Fut>(f: F) -> EffectRef<St, X>
    where
        St: Store,
        X: Send + Sync + 'static,
        F: Fn(St::Action, ListenerApi<St, X>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
    {
        Arc::new(Self { f })
    }
}

impl<St, X, F, Fut> Effect<St, X> for EffectFn<F>
where
    St: Store,
    X: Send + Sync + 'static,
    F: Fn(St::Action, ListenerApi<St, X>) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    fn run(&self, action: St::Action, api: ListenerApi<St, X>) -> BoxEffectFuture {
        Box::pin((self.f)(action, api))
    }
}
