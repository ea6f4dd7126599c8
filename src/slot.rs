//! Callback slots and the atomic state machine that governs them.
//!
//! A slot is one fixed-location cell of a signal's table. Its `state` is the only
//! synchronized field: whichever thread wins a transition gains the right to touch
//! the callback cell, and nobody else reads or writes it until the state moves on.
//!
//! ```text
//! Free --claim--> Populating --stored--> Active <--emit ends-- Emitting
//!   ^                                    |  \--emit begins-------^  |
//!   |                                release                     release
//!   |                                    v                          v
//!   +------------ cleared ---------- TearingDown       PendingTeardown
//!   +------------ cleared by the in-flight emitter ----------------/
//! ```

use crossbeam_utils::Backoff;
use std::any::Any;
use std::cell::{Cell, UnsafeCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{trace, warn};

/// Subscriber callback stored in a slot.
pub(crate) type Callback<A> = Box<dyn FnMut(&A) + Send + 'static>;

/// Lifecycle state of a slot.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotState {
    /// Empty and claimable.
    Free = 0,
    /// Claimed by a subscriber that is storing its callback.
    Populating = 1,
    /// Holds a callback that emitters may invoke.
    Active = 2,
    /// An emitter is running the callback.
    Emitting = 3,
    /// The unsubscriber is clearing the callback.
    TearingDown = 4,
    /// Cancelled while emitting; the emitter clears the callback when it finishes.
    PendingTeardown = 5,
}

impl SlotState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SlotState::Free,
            1 => SlotState::Populating,
            2 => SlotState::Active,
            3 => SlotState::Emitting,
            4 => SlotState::TearingDown,
            5 => SlotState::PendingTeardown,
            _ => unreachable!("invalid slot state {raw}"),
        }
    }
}

struct AtomicState(AtomicU8);

impl AtomicState {
    const fn new(state: SlotState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    fn load(&self) -> SlotState {
        SlotState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    fn store(&self, state: SlotState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Single compare-and-swap; returns the observed state on failure.
    #[inline]
    fn transition(&self, from: SlotState, to: SlotState) -> Result<(), SlotState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(SlotState::from_u8)
    }
}

/// Type-erased "can be told to unsubscribe" capability.
///
/// A [`Subscription`](crate::Subscription) is not generic over the signal's
/// argument type, so it reaches its slot through this trait.
pub(crate) trait Release: Send + Sync {
    /// Drives the slot towards `Free`. Duplicate calls are harmless.
    fn release(&self);
}

/// One callback cell of a signal's table.
pub(crate) struct Slot<A> {
    state: AtomicState,
    callback: UnsafeCell<Option<Callback<A>>>,
}

// SAFETY: the callback cell is only accessed by the thread that won the state
// transition granting exclusive rights (Populating, TearingDown, Emitting, or the
// post-emission cleanup after PendingTeardown). The callback itself is `Send`, and
// it is never invoked from two threads at once.
unsafe impl<A> Sync for Slot<A> {}

impl<A> Slot<A> {
    pub(crate) const fn new() -> Self {
        Self {
            state: AtomicState::new(SlotState::Free),
            callback: UnsafeCell::new(None),
        }
    }

    pub(crate) fn state(&self) -> SlotState {
        self.state.load()
    }

    /// Whether a subscriber currently owns this slot.
    pub(crate) fn is_occupied(&self) -> bool {
        matches!(self.state(), SlotState::Active | SlotState::Emitting)
    }

    /// Claims a free slot and stores `callback` in it.
    ///
    /// Hands the callback back when the slot was not free (or another subscriber
    /// won the race for it), so the caller can try the next slot.
    pub(crate) fn try_claim(&self, callback: Callback<A>) -> Result<(), Callback<A>> {
        if self.state.load() != SlotState::Free
            || self
                .state
                .transition(SlotState::Free, SlotState::Populating)
                .is_err()
        {
            return Err(callback);
        }

        // SAFETY: Populating is held by this thread only.
        unsafe { *self.callback.get() = Some(callback) };
        self.state.store(SlotState::Active);
        Ok(())
    }

    /// Invokes the callback if the slot is active. Returns whether it ran.
    ///
    /// When another thread is already emitting this slot a top-level call backs
    /// off and retries until the slot leaves `Emitting`, so concurrent emitters
    /// never lose a delivery. A call made while this thread is inside any
    /// callback skips the busy slot instead of waiting.
    pub(crate) fn emit(&self, args: &A) -> bool {
        let backoff = Backoff::new();
        loop {
            match self.state.load() {
                SlotState::Active => {
                    if self
                        .state
                        .transition(SlotState::Active, SlotState::Emitting)
                        .is_ok()
                    {
                        break;
                    }
                }
                SlotState::Emitting => {
                    // Waiting from inside a callback can close a cycle with
                    // another thread that waits on us, or with ourselves.
                    if in_flight::is_nested() {
                        return false;
                    }
                    backoff.snooze();
                }
                _ => return false,
            }
        }

        let outcome = {
            let _entered = in_flight::enter();
            // SAFETY: Emitting is held by this thread; cancellers only flip the
            // state to PendingTeardown and leave the cell alone.
            let callback = unsafe { &mut *self.callback.get() };
            match callback.as_mut() {
                Some(callback) => panic::catch_unwind(AssertUnwindSafe(|| callback(args))),
                None => Ok(()),
            }
        };
        if let Err(payload) = outcome {
            warn!(
                panic = panic_message(&*payload),
                "signal callback panicked; delivery to other slots continues"
            );
        }

        if let Err(observed) = self
            .state
            .transition(SlotState::Emitting, SlotState::Active)
        {
            // Cancelled while running: clearing the callback falls to us.
            debug_assert_eq!(observed, SlotState::PendingTeardown);
            // SAFETY: the canceller never touches the cell in PendingTeardown.
            let stale = unsafe { (*self.callback.get()).take() };
            self.state.store(SlotState::Free);
            trace!("deferred teardown finished by emitter");
            drop(stale);
        }
        true
    }
}

impl<A> Release for Slot<A> {
    fn release(&self) {
        loop {
            match self.state.load() {
                SlotState::Active => {
                    if self
                        .state
                        .transition(SlotState::Active, SlotState::TearingDown)
                        .is_ok()
                    {
                        // SAFETY: TearingDown is held by this thread only.
                        let callback = unsafe { (*self.callback.get()).take() };
                        self.state.store(SlotState::Free);
                        drop(callback);
                        return;
                    }
                }
                SlotState::Emitting => {
                    if self
                        .state
                        .transition(SlotState::Emitting, SlotState::PendingTeardown)
                        .is_ok()
                    {
                        trace!("slot released mid-emission; teardown deferred to emitter");
                        return;
                    }
                }
                SlotState::Free
                | SlotState::Populating
                | SlotState::TearingDown
                | SlotState::PendingTeardown => return,
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

/// How many callbacks the current thread is running right now.
mod in_flight {
    use super::Cell;

    thread_local! {
        static DEPTH: Cell<usize> = const { Cell::new(0) };
    }

    pub(super) struct Entered(());

    pub(super) fn enter() -> Entered {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Entered(())
    }

    /// Whether this thread is inside some slot's callback.
    pub(super) fn is_nested() -> bool {
        DEPTH.with(|depth| depth.get() > 0)
    }

    impl Drop for Entered {
        fn drop(&mut self) {
            DEPTH.with(|depth| depth.set(depth.get() - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::atomic::AtomicU8 as StateCell;
    use std::sync::Arc;
    use std::thread;

    fn boxed<A>(f: impl FnMut(&A) + Send + 'static) -> Callback<A> {
        Box::new(f)
    }

    fn claim<A>(slot: &Slot<A>, f: impl FnMut(&A) + Send + 'static) {
        assert!(slot.try_claim(Box::new(f)).is_ok());
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_new_slot_is_free() {
        let slot = Slot::<i32>::new();
        assert_eq!(slot.state(), SlotState::Free);
        assert!(!slot.emit(&1));
    }

    #[test]
    fn test_claim_then_emit() {
        let slot = Slot::<i32>::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        claim(&slot, move |v: &i32| {
            seen_clone.store(*v as usize, Ordering::SeqCst);
        });
        assert_eq!(slot.state(), SlotState::Active);
        assert!(slot.emit(&7));
        assert_eq!(seen.load(Ordering::SeqCst), 7);
        assert_eq!(slot.state(), SlotState::Active);
    }

    #[test]
    fn test_claim_of_occupied_slot_returns_callback() {
        let slot = Slot::<()>::new();
        assert!(slot.try_claim(boxed(|_: &()| {})).is_ok());
        assert!(slot.try_claim(boxed(|_: &()| {})).is_err());
    }

    #[test]
    fn test_release_clears_callback_and_frees() {
        let slot = Slot::<()>::new();
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(dropped.clone());
        claim(&slot, move |_: &()| {
            let _ = &flag;
        });
        slot.release();
        assert_eq!(slot.state(), SlotState::Free);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!slot.emit(&()));
    }

    #[test]
    fn test_release_is_idempotent() {
        let slot = Slot::<()>::new();
        slot.release();
        assert_eq!(slot.state(), SlotState::Free);
        claim(&slot, |_: &()| {});
        slot.release();
        slot.release();
        assert_eq!(slot.state(), SlotState::Free);
    }

    #[test]
    fn test_release_during_emit_defers_cleanup_to_emitter() {
        let slot = Arc::new(Slot::<()>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let dropped = Arc::new(AtomicBool::new(false));

        let inner = slot.clone();
        let calls_clone = calls.clone();
        let flag = DropFlag(dropped.clone());
        let dropped_clone = dropped.clone();
        let observed = Arc::new(StateCell::new(u8::MAX));
        let observed_clone = observed.clone();
        let dropped_early = Arc::new(AtomicBool::new(true));
        let dropped_early_clone = dropped_early.clone();
        claim(&slot, move |_: &()| {
            let _ = &flag;
            calls_clone.fetch_add(1, Ordering::SeqCst);
            inner.release();
            observed_clone.store(inner.state() as u8, Ordering::SeqCst);
            dropped_early_clone.store(dropped_clone.load(Ordering::SeqCst), Ordering::SeqCst);
        });

        assert!(slot.emit(&()));
        assert_eq!(
            observed.load(Ordering::SeqCst),
            SlotState::PendingTeardown as u8
        );
        assert!(!dropped_early.load(Ordering::SeqCst));
        assert_eq!(slot.state(), SlotState::Free);
        assert!(dropped.load(Ordering::SeqCst));
        assert!(!slot.emit(&()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panicking_callback_keeps_slot_active() {
        let slot = Slot::<i32>::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        claim(&slot, move |v: &i32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if *v < 0 {
                panic!("negative value");
            }
        });

        assert!(slot.emit(&-1));
        assert_eq!(slot.state(), SlotState::Active);
        assert!(slot.emit(&1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reentrant_emit_skips_busy_slot() {
        let slot = Arc::new(Slot::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let inner = slot.clone();
        let calls_clone = calls.clone();
        let nested_ran = Arc::new(AtomicBool::new(true));
        let nested_ran_clone = nested_ran.clone();
        claim(&slot, move |depth: &u32| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            if *depth == 0 {
                nested_ran_clone.store(inner.emit(&1), Ordering::SeqCst);
            }
        });

        assert!(slot.emit(&0));
        assert!(!nested_ran.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Break the Arc cycle held by the callback.
        slot.release();
    }

    #[test]
    fn test_concurrent_emitters_never_overlap_and_never_drop() {
        const PER_THREAD: usize = 2_000;
        let slot = Arc::new(Slot::<()>::new());
        let busy = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));

        let busy_clone = busy.clone();
        let overlapped_clone = overlapped.clone();
        let calls_clone = calls.clone();
        claim(&slot, move |_: &()| {
            if busy_clone.swap(true, Ordering::SeqCst) {
                overlapped_clone.store(true, Ordering::SeqCst);
            }
            calls_clone.fetch_add(1, Ordering::SeqCst);
            busy_clone.store(false, Ordering::SeqCst);
        });

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    for _ in 0..PER_THREAD {
                        assert!(slot.emit(&()));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!overlapped.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 2 * PER_THREAD);
    }
}
