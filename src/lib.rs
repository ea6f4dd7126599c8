//! # Slot Signals
//!
//! A lock-free publish/subscribe primitive for in-process events.
//!
//! ## Features
//!
//! - **Fixed slot tables**: every signal owns a fixed number of callback slots that
//!   never move, so subscriptions can point straight at them
//! - **RAII subscriptions**: dropping a [`Subscription`] detaches its callback
//! - **Safe teardown races**: cancelling while the callback runs, from inside the
//!   callback, or after the publisher was dropped is always safe
//! - **No locks**: each slot coordinates through a single atomic state
//! - **Async bridge**: forward a signal into a `futures` channel and consume it as a stream
//!
//! ## Example
//!
//! ```rust,no_run
//! use slot_signals::prelude::*;
//! use std::sync::Arc;
//!
//! struct Thermometer {
//!     this: PublisherHandle<Thermometer>,
//!     temperature_changed: Signal<f64>,
//! }
//!
//! impl Thermometer {
//!     fn new() -> Arc<Self> {
//!         PublisherHandle::new_cyclic(|this| Self {
//!             this,
//!             temperature_changed: Signal::new(),
//!         })
//!     }
//!
//!     fn on_temperature_changed(
//!         &self,
//!         callback: impl FnMut(&f64) + Send + 'static,
//!     ) -> Result<Subscription, SignalError> {
//!         self.this.subscribe(|t| &t.temperature_changed, callback)
//!     }
//! }
//!
//! let thermometer = Thermometer::new();
//! let subscription = thermometer
//!     .on_temperature_changed(|celsius| println!("{celsius}"))
//!     .unwrap();
//! thermometer.temperature_changed.emit(40.0);
//! drop(subscription);
//! thermometer.temperature_changed.emit(20.0); // nobody listening
//! ```

mod bridge;
mod channel;
mod error;
mod publisher;
mod signal;
mod slot;
mod subscription;

pub use error::SignalError;
pub use publisher::PublisherHandle;
pub use signal::{Signal, DEFAULT_CAPACITY};
pub use slot::SlotState;
pub use subscription::Subscription;

// Re-export the prelude
pub mod prelude {
    pub use crate::{PublisherHandle, Signal, SignalError, Subscription};
}
