//! # Listener declarations.
//!
//! Everything needed to describe a listener before it is registered:
//! - [`Selector`] and [`ActionCreator`] / [`CreatorFn`] - which actions match
//! - [`Effect`], [`EffectFn`], [`EffectRef`] - what runs on a match
//! - [`ListenerOptions`], [`UnsubscribeOptions`] - registration and removal
//! - [`ListenerAction`] and its creators - the dispatchable control actions

mod effect;
mod options;
mod selector;

pub use effect::{BoxEffectFuture, Effect, EffectFn, EffectRef};
pub use options::{
    ListenerAction, ListenerActionOutcome, ListenerOptions, UnsubscribeOptions, add_listener,
    clear_all_listeners, remove_listener,
};
pub use selector::{ActionCreator, CreatorFn, MatcherFn, PredicateFn, Selector};
