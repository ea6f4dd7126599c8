//! Core Signal type and operations.

use crate::bridge::SlotRef;
use crate::error::SignalError;
use crate::slot::{Callback, Slot, SlotState};
use crate::subscription::Subscription;
use crossbeam_utils::CachePadded;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// Number of slots of a signal built with [`Signal::new`].
pub const DEFAULT_CAPACITY: usize = 5;

/// A fixed-capacity publish point carrying values of type `A`.
///
/// A signal lives as a field of its publisher. Observers attach with
/// [`Signal::subscribe`] and get back a [`Subscription`]; the publisher forwards
/// its events with [`Signal::emit`]. Use `()` for events without arguments and
/// tuples for several.
///
/// Nothing here takes a lock: each slot coordinates through its own atomic
/// state, and the table is allocated once and never moves.
///
/// # Examples
///
/// ```rust,no_run
/// use slot_signals::prelude::*;
/// use std::sync::Arc;
///
/// struct Thermometer {
///     temperature_changed: Signal<f64>,
/// }
///
/// let thermometer = Arc::new(Thermometer {
///     temperature_changed: Signal::new(),
/// });
/// let _subscription = Signal::subscribe(
///     &thermometer,
///     |t| &t.temperature_changed,
///     |celsius| println!("now {celsius}"),
/// )
/// .unwrap();
/// thermometer.temperature_changed.emit(21.5);
/// ```
pub struct Signal<A> {
    slots: Box<[CachePadded<Slot<A>>]>,
}

impl<A: 'static> Signal<A> {
    /// Create a signal with [`DEFAULT_CAPACITY`] slots.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a signal with a fixed number of slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "signal capacity must be greater than zero");
        Self {
            slots: (0..capacity)
                .map(|_| CachePadded::new(Slot::new()))
                .collect(),
        }
    }

    /// The fixed number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// How many slots currently hold a subscriber.
    ///
    /// This is a snapshot; concurrent subscribers may change it immediately.
    pub fn active_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_occupied()).count()
    }

    /// The current state of every slot, in table order.
    pub fn slot_states(&self) -> impl Iterator<Item = SlotState> + '_ {
        self.slots.iter().map(|slot| slot.state())
    }

    /// Attach `callback` to the signal that `select` finds inside `owner`.
    ///
    /// The returned subscription holds only a weak reference to `owner`, so it
    /// never keeps the publisher alive. `select` must return the signal from
    /// the publisher it is given, e.g. `|p| &p.changed`.
    ///
    /// Claims the first free slot in table order. Never waits for a slot to be
    /// released.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::OutOfCapacity`] when every slot is occupied.
    pub fn subscribe<P, S, F>(
        owner: &Arc<P>,
        select: S,
        callback: F,
    ) -> Result<Subscription, SignalError>
    where
        P: Send + Sync + 'static,
        S: FnOnce(&P) -> &Signal<A>,
        F: FnMut(&A) + Send + 'static,
    {
        let signal = select(&**owner);
        let slot = signal.claim(Box::new(callback))?;
        // SAFETY: `signal` was reached through a shared borrow of `*owner`, so the
        // boxed table lives as long as the publisher's allocation does: it cannot
        // be dropped or replaced while a strong owner exists, and the subscription
        // keeps a weak one, so `Arc::get_mut` can no longer hand out `&mut P`.
        let slot_ref = unsafe { SlotRef::new(owner, &**slot) };
        Ok(Subscription::new(slot_ref))
    }

    fn claim(&self, callback: Callback<A>) -> Result<&CachePadded<Slot<A>>, SignalError> {
        let mut callback = callback;
        for (index, slot) in self.slots.iter().enumerate() {
            match slot.try_claim(callback) {
                Ok(()) => {
                    trace!(index, "signal slot claimed");
                    return Ok(slot);
                }
                Err(returned) => callback = returned,
            }
        }

        let capacity = self.capacity();
        debug!(capacity, "signal has no free slot");
        Err(SignalError::OutOfCapacity { capacity })
    }

    /// Invoke every active subscriber with `args`, in slot order.
    ///
    /// A panicking callback is contained: it is logged, the slot stays usable,
    /// and the remaining subscribers are still called. When another thread is
    /// running the same slot, this call waits for it to finish and then delivers
    /// too, so concurrent emits never lose deliveries.
    ///
    /// Only top-level calls wait. An emit made from inside any callback, on
    /// this signal or another one, skips every slot that is busy at that moment.
    /// Two threads whose callbacks emit into each other's signals therefore
    /// cannot block one another.
    pub fn emit(&self, args: A) {
        for slot in self.slots.iter() {
            slot.emit(&args);
        }
    }
}

impl<A: 'static> Default for Signal<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static> fmt::Debug for Signal<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("capacity", &self.capacity())
            .field("states", &self.slot_states().collect::<Vec<_>>())
            .finish()
    }
}
