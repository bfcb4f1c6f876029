//! Observable middleware events.
//!
//! [`Event`] and [`EventKind`] describe registry changes, task lifecycles and reported
//! failures; [`Bus`] carries them to receivers and subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
