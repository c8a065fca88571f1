//! In-memory gateway for development and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    GatewayError, GatewayEvent, GatewayResult, NotificationSignature, PaymentGateway,
    PaymentSession, WebhookVerifier,
};
use crate::entities::order;

/// Gateway whose statuses are set by hand. Notifications are verified with
/// the real [`WebhookVerifier`] so signature handling is exercised end to end.
#[derive(Debug)]
pub struct MockPaymentGateway {
    verifier: WebhookVerifier,
    redirect_base: String,
    statuses: DashMap<String, String>,
    unavailable: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new(verifier: WebhookVerifier) -> Self {
        Self {
            verifier,
            redirect_base: "https://pay.example.test".to_string(),
            statuses: DashMap::new(),
            unavailable: AtomicBool::new(false),
        }
    }

    pub fn shared(verifier: WebhookVerifier) -> Arc<dyn PaymentGateway> {
        Arc::new(Self::new(verifier))
    }

    /// Sets what `check_status` reports for an order number.
    pub fn set_status(&self, order_number: &str, transaction_status: &str) {
        self.statuses
            .insert(order_number.to_string(), transaction_status.to_string());
    }

    /// When set, every outbound call fails with `GatewayError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Signs a body the way the real gateway would.
    pub fn sign(&self, body: &[u8]) -> GatewayResult<NotificationSignature> {
        self.verifier.sign(chrono::Utc::now().timestamp(), body)
    }

    fn ensure_available(&self) -> GatewayResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(GatewayError::Unavailable("mock gateway switched off".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_session(&self, order: &order::Model) -> GatewayResult<PaymentSession> {
        self.ensure_available()?;

        let session_token = format!("mock_session_{}", Uuid::new_v4().simple());
        tracing::info!(
            order_number = %order.order_number,
            total = %order.total,
            "mock payment session created"
        );

        Ok(PaymentSession {
            redirect_url: Some(format!("{}/pay/{}", self.redirect_base, session_token)),
            session_token,
        })
    }

    async fn check_status(&self, order: &order::Model) -> GatewayResult<GatewayEvent> {
        self.ensure_available()?;

        let transaction_status = self
            .statuses
            .get(&order.order_number)
            .map(|status| status.value().clone())
            .unwrap_or_else(|| "pending".to_string());

        Ok(GatewayEvent {
            order_number: order.order_number.clone(),
            transaction_status,
            transaction_id: Some(format!("mock_txn_{}", order.order_number)),
            fraud_status: None,
            gross_amount: Some(order.total),
        })
    }

    fn parse_notification(
        &self,
        raw: &[u8],
        signature: &NotificationSignature,
    ) -> GatewayResult<GatewayEvent> {
        self.verifier
            .verify(signature, raw, chrono::Utc::now().timestamp())?;
        GatewayEvent::from_payload(raw)
    }
}
