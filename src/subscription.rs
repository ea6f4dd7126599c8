//! RAII handle that keeps a subscriber attached to a signal.

use crate::bridge::SlotRef;
use std::fmt;
use tracing::trace;

/// A subscriber's claim on one slot of a [`Signal`](crate::Signal).
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// detaches the callback. The handle is move-only: moving it transfers the duty
/// of releasing the slot, and assigning a new subscription over an occupied one
/// releases the old slot first.
///
/// A subscription does not keep its publisher alive. Cancelling after the
/// publisher is gone is a silent no-op.
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use slot_signals::{Signal, Subscription};
/// # struct Sensor { changed: Signal<f64> }
/// # let sensor = Arc::new(Sensor { changed: Signal::new() });
/// let mut held = Subscription::default();
/// held = Signal::subscribe(&sensor, |s| &s.changed, |v| println!("{v}")).unwrap();
/// sensor.changed.emit(1.5);
/// held.unsubscribe();
/// ```
#[derive(Default)]
pub struct Subscription {
    slot: Option<SlotRef>,
}

impl Subscription {
    pub(crate) fn new(slot: SlotRef) -> Self {
        Self { slot: Some(slot) }
    }

    /// Detaches the callback from its signal.
    ///
    /// If the slot's callback is running on another thread (or this call comes
    /// from inside the callback itself), the running invocation finishes and
    /// the emitter clears the slot afterwards. Calling this more than once, on an
    /// empty subscription, or after the publisher was dropped does nothing.
    pub fn unsubscribe(&mut self) {
        if let Some(slot) = self.slot.take() {
            if !slot.release() {
                trace!("publisher already dropped; nothing to release");
            }
        }
    }

    /// Whether this handle still refers to a slot of a live publisher.
    pub fn is_attached(&self) -> bool {
        self.slot.as_ref().is_some_and(SlotRef::is_alive)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("slot", &self.slot)
            .finish()
    }
}
