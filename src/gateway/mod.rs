//! Payment gateway adapter.
//!
//! The concrete processor lives outside this crate. Everything here is the
//! contract checkout and reconciliation rely on: open a payment session, ask
//! for the current status, and turn a signed notification into a
//! [`GatewayEvent`].

pub mod mock;
pub mod signature;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entities::order;
use crate::errors::ServiceError;

pub use mock::MockPaymentGateway;
pub use signature::{NotificationSignature, WebhookVerifier};

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// Signature missing, forged, or outside the accepted time window
    #[error("notification authenticity check failed: {0}")]
    Authenticity(String),
    #[error("malformed notification payload: {0}")]
    Malformed(String),
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
}

impl From<GatewayError> for ServiceError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Authenticity(reason) => ServiceError::WebhookAuthentication(reason),
            GatewayError::Malformed(reason) => ServiceError::InvalidInput(reason),
            GatewayError::Unavailable(reason) => ServiceError::ExternalServiceError(reason),
        }
    }
}

/// Payment instructions handed back to the customer after checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentSession {
    pub session_token: String,
    pub redirect_url: Option<String>,
}

/// Gateway vocabulary reduced to what the order state machine acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GatewayStatus {
    Pending,
    Settled,
    Denied,
    Expired,
    Cancelled,
    Refunded,
}

impl GatewayStatus {
    /// Maps a raw `transaction_status` (plus `fraud_status` for captures).
    /// Returns `None` for statuses the engine does not act on.
    pub fn from_raw(transaction_status: &str, fraud_status: Option<&str>) -> Option<Self> {
        match transaction_status.trim().to_ascii_lowercase().as_str() {
            "capture" => match fraud_status.map(str::to_ascii_lowercase).as_deref() {
                Some("challenge") => Some(Self::Pending),
                _ => Some(Self::Settled),
            },
            "settlement" => Some(Self::Settled),
            "pending" => Some(Self::Pending),
            "deny" => Some(Self::Denied),
            "expire" => Some(Self::Expired),
            "cancel" | "failure" => Some(Self::Cancelled),
            "refund" | "partial_refund" => Some(Self::Refunded),
            _ => None,
        }
    }
}

/// A status report from the gateway, either pushed (notification) or pulled
/// (`check_status`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub order_number: String,
    pub transaction_status: String,
    pub transaction_id: Option<String>,
    pub fraud_status: Option<String>,
    pub gross_amount: Option<Decimal>,
}

impl GatewayEvent {
    pub fn status(&self) -> Option<GatewayStatus> {
        GatewayStatus::from_raw(&self.transaction_status, self.fraud_status.as_deref())
    }

    /// Identity of this delivery. Two notifications with the same hash are
    /// the same event.
    pub fn event_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.order_number.as_str(),
            self.transaction_status.as_str(),
            self.transaction_id.as_deref().unwrap_or(""),
            self.fraud_status.as_deref().unwrap_or(""),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }

    /// Parses the JSON body of a notification. Authenticity must already be established.
    pub fn from_payload(raw: &[u8]) -> GatewayResult<Self> {
        let payload: NotificationPayload =
            serde_json::from_slice(raw).map_err(|e| GatewayError::Malformed(e.to_string()))?;

        if payload.order_id.trim().is_empty() {
            return Err(GatewayError::Malformed("order_id is empty".into()));
        }
        if payload.transaction_status.trim().is_empty() {
            return Err(GatewayError::Malformed("transaction_status is empty".into()));
        }

        Ok(Self {
            order_number: payload.order_id,
            transaction_status: payload.transaction_status.to_ascii_lowercase(),
            transaction_id: payload.transaction_id,
            fraud_status: payload.fraud_status,
            gross_amount: payload.gross_amount,
        })
    }
}

/// Wire shape of an inbound notification. `order_id` carries our order number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub order_id: String,
    pub transaction_status: String,
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub fraud_status: Option<String>,
    #[serde(default)]
    pub gross_amount: Option<Decimal>,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a payment session for a freshly created order.
    async fn create_session(&self, order: &order::Model) -> GatewayResult<PaymentSession>;

    /// Asks the gateway for the current status of an order's transaction.
    async fn check_status(&self, order: &order::Model) -> GatewayResult<GatewayEvent>;

    /// Authenticates and parses an inbound notification.
    fn parse_notification(
        &self,
        raw: &[u8],
        signature: &NotificationSignature,
    ) -> GatewayResult<GatewayEvent>;
}
