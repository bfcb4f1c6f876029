//! # Event subscribers.
//!
//! [`Subscribe`] implementations registered on the builder are driven by a
//! [`SubscriberSet`]: a forwarder task reads the [`Bus`](crate::events::Bus) and hands
//! each event to the subscribers' lanes.
//!
//! ```text
//! Bus ──► forwarder ──► SubscriberSet ──┬─► LogWriter
//!                                       ├─► metrics exporter
//!                                       └─► ...
//! ```
//!
//! The `logging` feature exports [`LogWriter`], a stdout printer.

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
