//! Errors surfaced to callers of [`Signal::subscribe`](crate::Signal::subscribe).
//!
//! Everything else that can go wrong (a panicking callback, cancelling after the
//! publisher is gone, cancelling twice) is absorbed inside the slot state machine
//! and never reaches the caller.

use thiserror::Error;

/// Errors produced when attaching a subscriber.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalError {
    /// Every slot of the signal was occupied when the table was scanned.
    ///
    /// Not retried internally; subscribing again after another subscription
    /// has been released may succeed.
    #[error("signal is full: all {capacity} slots are occupied")]
    OutOfCapacity {
        /// The fixed slot count of the signal.
        capacity: usize,
    },

    /// The publisher's self-handle no longer upgrades (it is being destroyed).
    #[error("publisher has already been dropped")]
    PublisherDropped,
}

impl SignalError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SignalError::OutOfCapacity { .. } => "signal_out_of_capacity",
            SignalError::PublisherDropped => "signal_publisher_dropped",
        }
    }
}
