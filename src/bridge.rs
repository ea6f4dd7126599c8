//! Lifetime-aware references from a subscription back into its publisher.
//!
//! A [`SlotRef`] pairs a weak handle on the publisher with the address of a slot
//! that lives inside it. It shares the publisher's reference count but points at
//! the slot: the slot is only dereferenced while the weak handle is upgraded, so
//! the reference notices when the publisher is gone without ever keeping it alive.

use crate::slot::Release;
use std::any::Any;
use std::fmt;
use std::ptr::NonNull;
use std::sync::{Arc, Weak};

/// Weak aliasing reference to one slot of a publisher's signal.
pub(crate) struct SlotRef {
    owner: Weak<dyn Any + Send + Sync>,
    slot: NonNull<dyn Release>,
}

// SAFETY: `slot` is only dereferenced (as a shared reference) while `owner` is
// upgraded, and `Release` implementors are `Send + Sync`.
unsafe impl Send for SlotRef {}
unsafe impl Sync for SlotRef {}

impl SlotRef {
    /// Builds the weak view from a strong owner, which only has to live for the
    /// duration of this call.
    ///
    /// # Safety
    ///
    /// `slot` must stay at the same address, without being dropped, for as long
    /// as any strong reference to `owner`'s allocation exists.
    pub(crate) unsafe fn new<P, R>(owner: &Arc<P>, slot: &R) -> Self
    where
        P: Send + Sync + 'static,
        R: Release + 'static,
    {
        let owner: Weak<P> = Arc::downgrade(owner);
        let owner: Weak<dyn Any + Send + Sync> = owner;
        let slot: &(dyn Release + 'static) = slot;
        Self {
            owner,
            slot: NonNull::from(slot),
        }
    }

    /// Releases the slot if the publisher is still alive.
    ///
    /// Returns `false` when the publisher was already destroyed; that is not an
    /// error, there is simply nothing left to release.
    pub(crate) fn release(&self) -> bool {
        // Resolution races with the last strong owner going away; the upgrade
        // decides atomically which side wins.
        let Some(_owner) = self.owner.upgrade() else {
            return false;
        };
        // SAFETY: `_owner` keeps the publisher, and with it the slot table,
        // alive until the end of this scope.
        unsafe { self.slot.as_ref() }.release();
        true
    }

    /// Whether some strong owner of the publisher still exists.
    pub(crate) fn is_alive(&self) -> bool {
        self.owner.strong_count() > 0
    }
}

impl fmt::Debug for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotRef")
            .field("slot", &self.slot.cast::<()>())
            .field("alive", &self.is_alive())
            .finish()
    }
}
