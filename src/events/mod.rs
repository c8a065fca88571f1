use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Domain events published after a state change has been committed.
/// Delivery is best-effort; consumers must not rely on exactly-once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
        total: Decimal,
    },
    InventoryReserved {
        order_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    },
    InventoryRestored {
        order_id: Uuid,
        variant_id: Uuid,
        quantity: i32,
    },
    DiscountRedeemed {
        order_id: Uuid,
        discount_id: Uuid,
        amount: Decimal,
    },
    PaymentProofSubmitted {
        order_id: Uuid,
    },
    PaymentVerified {
        order_id: Uuid,
    },
    PaymentRejected {
        order_id: Uuid,
        note: Option<String>,
    },
    OrderPaid {
        order_id: Uuid,
        gateway_status: Option<String>,
    },
    OrderCancelled {
        order_id: Uuid,
        reason: Option<String>,
    },
    OrderRefunded {
        order_id: Uuid,
    },
    OrderCompleted {
        order_id: Uuid,
    },
    PaymentNotificationRejected {
        reason: String,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderCreated { .. } => "order_created",
            Event::InventoryReserved { .. } => "inventory_reserved",
            Event::InventoryRestored { .. } => "inventory_restored",
            Event::DiscountRedeemed { .. } => "discount_redeemed",
            Event::PaymentProofSubmitted { .. } => "payment_proof_submitted",
            Event::PaymentVerified { .. } => "payment_verified",
            Event::PaymentRejected { .. } => "payment_rejected",
            Event::OrderPaid { .. } => "order_paid",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::OrderRefunded { .. } => "order_refunded",
            Event::OrderCompleted { .. } => "order_completed",
            Event::PaymentNotificationRejected { .. } => "payment_notification_rejected",
        }
    }

    /// The order this event concerns, if any.
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            Event::OrderCreated { order_id, .. }
            | Event::InventoryReserved { order_id, .. }
            | Event::InventoryRestored { order_id, .. }
            | Event::DiscountRedeemed { order_id, .. }
            | Event::PaymentProofSubmitted { order_id }
            | Event::PaymentVerified { order_id }
            | Event::PaymentRejected { order_id, .. }
            | Event::OrderPaid { order_id, .. }
            | Event::OrderCancelled { order_id, .. }
            | Event::OrderRefunded { order_id }
            | Event::OrderCompleted { order_id } => Some(*order_id),
            Event::PaymentNotificationRejected { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Creates a sender together with the receiving half for `process_events`.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes a batch of events. A closed channel never fails the caller,
    /// the state change is already committed.
    pub async fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            let name = event.name();
            if let Err(e) = self.send(event).await {
                warn!(event = name, error = %e, "dropping domain event");
            }
        }
    }
}

/// Drains the event channel until every sender is gone.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PaymentNotificationRejected { reason } => {
                warn!(event = event.name(), reason = %reason, "payment notification rejected");
            }
            _ => {
                info!(
                    event = event.name(),
                    order_id = ?event.order_id(),
                    payload = %serde_json::to_string(&event).unwrap_or_default(),
                    "domain event"
                );
            }
        }
    }

    info!("Event processing loop stopped");
}
