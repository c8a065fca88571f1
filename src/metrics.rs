//! Prometheus counters for the order engine, exposed in text format at `/metrics`.

use lazy_static::lazy_static;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new_custom(Some("storefront".into()), None)
        .expect("metric can be created");
    static ref CHECKOUTS: IntCounterVec = register(IntCounterVec::new(
        Opts::new("checkouts_total", "Checkout attempts by outcome"),
        &["outcome"]
    ));
    static ref ORDER_TRANSITIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new("order_transitions_total", "Order lifecycle actions by action and outcome"),
        &["action", "outcome"]
    ));
    static ref PAYMENT_NOTIFICATIONS: IntCounterVec = register(IntCounterVec::new(
        Opts::new(
            "payment_notifications_total",
            "Payment gateway notifications by resulting effect"
        ),
        &["effect"]
    ));
    static ref STOCK_MOVEMENTS: IntCounterVec = register(IntCounterVec::new(
        Opts::new("stock_movements_total", "Units taken from or returned to stock"),
        &["direction"]
    ));
}

fn register(counter: prometheus::Result<IntCounterVec>) -> IntCounterVec {
    let counter = counter.expect("metric can be created");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("metric can be registered");
    counter
}

pub fn record_checkout(outcome: &str) {
    CHECKOUTS.with_label_values(&[outcome]).inc();
}

pub fn record_transition(action: &str, outcome: &str) {
    ORDER_TRANSITIONS.with_label_values(&[action, outcome]).inc();
}

pub fn record_payment_notification(effect: &str) {
    PAYMENT_NOTIFICATIONS.with_label_values(&[effect]).inc();
}

pub fn record_stock_movement(direction: &str, units: i32) {
    if units > 0 {
        STOCK_MOVEMENTS
            .with_label_values(&[direction])
            .inc_by(units as u64);
    }
}

/// Renders every registered metric in the Prometheus text exposition format.
pub fn render() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
