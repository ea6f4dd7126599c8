//! Thermometer example demonstrating slot_signals.
//!
//! This example shows:
//! - Building a publisher behind an `Arc` with a self-handle
//! - Scoped subscriptions that detach when dropped
//! - Moving a subscription out of its scope
//! - Dropping the publisher while subscriptions are still held
//!
//! Run with: RUST_LOG=trace cargo run --example thermometer

use slot_signals::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Thermometer {
    this: PublisherHandle<Thermometer>,
    temperature_changed: Signal<f64>,
    freezing: Signal<()>,
}

impl Thermometer {
    fn new() -> Arc<Self> {
        PublisherHandle::new_cyclic(|this| Thermometer {
            this,
            temperature_changed: Signal::new(),
            freezing: Signal::with_capacity(2),
        })
    }

    fn on_temperature_changed(
        &self,
        callback: impl FnMut(&f64) + Send + 'static,
    ) -> Result<Subscription, SignalError> {
        self.this.subscribe(|t| &t.temperature_changed, callback)
    }

    fn on_freezing(
        &self,
        mut callback: impl FnMut() + Send + 'static,
    ) -> Result<Subscription, SignalError> {
        self.this.subscribe(|t| &t.freezing, move |_| callback())
    }

    fn update_temperature(&self, celsius: f64) {
        self.temperature_changed.emit(celsius);
        if celsius < 0.0 {
            self.freezing.emit(());
        }
    }
}

fn main() -> Result<(), SignalError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let freezing_days = Arc::new(AtomicUsize::new(0));
    let thermometer = Thermometer::new();

    let mut kept;
    {
        let display = thermometer.on_temperature_changed(|celsius| {
            println!("display: {celsius:.1} °C");
        })?;
        let days = freezing_days.clone();
        let _alarm = thermometer.on_freezing(move || {
            days.fetch_add(1, Ordering::SeqCst);
            println!("alarm: below zero");
        })?;

        thermometer.update_temperature(40.0);
        thermometer.update_temperature(-10.0);

        // The display outlives this scope, the alarm does not.
        kept = display;
    }

    thermometer.update_temperature(-20.0);
    println!(
        "freezing days counted: {}",
        freezing_days.load(Ordering::SeqCst)
    );

    let _first = thermometer.on_freezing(|| {})?;
    let _second = thermometer.on_freezing(|| {})?;
    match thermometer.on_freezing(|| {}) {
        Err(err) => println!("third alarm rejected: {err} ({})", err.as_label()),
        Ok(_) => println!("third alarm unexpectedly accepted"),
    }

    println!("{:?}", thermometer.temperature_changed);

    // Subscriptions may outlive the publisher; releasing them is a no-op.
    drop(thermometer);
    println!("display still attached: {}", kept.is_attached());
    kept.unsubscribe();

    Ok(())
}
