//! Consuming a signal from async code.
//!
//! Emitted values are forwarded into an unbounded `futures` channel, so an async
//! task can await them as a `Stream` while the slot stays lock-free.

use crate::{Signal, SignalError, Subscription};
use futures::channel::mpsc::{self, UnboundedReceiver};
use std::sync::Arc;

impl<A: Clone + Send + 'static> Signal<A> {
    /// Subscribe with a callback that clones every emitted value into a channel.
    ///
    /// The receiver ends once the subscription is released and buffered values
    /// are drained. Dropping the receiver first simply makes forwarding a no-op
    /// until the subscription goes away.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::OutOfCapacity`] when every slot is occupied.
    pub fn subscribe_unbounded<P, S>(
        owner: &Arc<P>,
        select: S,
    ) -> Result<(Subscription, UnboundedReceiver<A>), SignalError>
    where
        P: Send + Sync + 'static,
        S: FnOnce(&P) -> &Signal<A>,
    {
        let (tx, rx) = mpsc::unbounded::<A>();
        let subscription = Signal::subscribe(owner, select, move |args: &A| {
            // Ignore errors - the receiver being gone is not the publisher's problem
            let _ = tx.unbounded_send(args.clone());
        })?;
        Ok((subscription, rx))
    }
}
