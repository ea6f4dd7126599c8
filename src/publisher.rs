//! Self-handles for objects that expose signals.
//!
//! A subscription needs a strong handle to its publisher at the moment it is
//! created, which means a publisher has to be able to produce an `Arc` to
//! itself from `&self`. [`PublisherHandle::new_cyclic`] is the factory that
//! builds such objects behind an `Arc` from the start.

use crate::{Signal, SignalError, Subscription};
use std::fmt;
use std::sync::{Arc, Weak};

/// A publisher's weak handle to its own `Arc`.
///
/// # Example
///
/// ```rust,no_run
/// use slot_signals::prelude::*;
/// use std::sync::Arc;
///
/// struct Door {
///     this: PublisherHandle<Door>,
///     opened: Signal<()>,
/// }
///
/// impl Door {
///     fn new() -> Arc<Self> {
///         PublisherHandle::new_cyclic(|this| Door {
///             this,
///             opened: Signal::new(),
///         })
///     }
///
///     fn on_opened(&self, callback: impl FnMut(&()) + Send + 'static) -> Result<Subscription, SignalError> {
///         self.this.subscribe(|door| &door.opened, callback)
///     }
/// }
/// ```
pub struct PublisherHandle<P> {
    this: Weak<P>,
}

impl<P> PublisherHandle<P> {
    /// Build a publisher behind an `Arc`, handing it a handle to itself.
    ///
    /// The handle does not upgrade until `build` has returned.
    pub fn new_cyclic(build: impl FnOnce(PublisherHandle<P>) -> P) -> Arc<P> {
        Arc::new_cyclic(|this| {
            build(PublisherHandle {
                this: this.clone(),
            })
        })
    }

    /// A new strong handle to the publisher, unless it is being destroyed.
    pub fn upgrade(&self) -> Option<Arc<P>> {
        self.this.upgrade()
    }
}

impl<P: Send + Sync + 'static> PublisherHandle<P> {
    /// Subscribe to one of the publisher's signals through its self-handle.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::PublisherDropped`] when the publisher is already
    /// being destroyed and [`SignalError::OutOfCapacity`] when the signal is full.
    pub fn subscribe<A, S, F>(&self, select: S, callback: F) -> Result<Subscription, SignalError>
    where
        A: 'static,
        S: FnOnce(&P) -> &Signal<A>,
        F: FnMut(&A) + Send + 'static,
    {
        let owner = self.upgrade().ok_or(SignalError::PublisherDropped)?;
        Signal::subscribe(&owner, select, callback)
    }
}

impl<P> Clone for PublisherHandle<P> {
    fn clone(&self) -> Self {
        Self {
            this: self.this.clone(),
        }
    }
}

impl<P> fmt::Debug for PublisherHandle<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublisherHandle")
            .field("alive", &(self.this.strong_count() > 0))
            .finish()
    }
}
