use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::entities::payment_notification;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{GatewayError, GatewayEvent, NotificationSignature, PaymentGateway};
use crate::metrics;
use crate::services::order_lifecycle::{GatewayEffect, OrderAggregate};
use crate::services::orders::OrderService;

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    pub effect: GatewayEffect,
    pub order: OrderAggregate,
}

/// Applies gateway reports to orders: pushed notifications and pulled status
/// checks go through the same path.
#[derive(Clone)]
pub struct PaymentReconciliationService {
    orders: OrderService,
    gateway: Arc<dyn PaymentGateway>,
    event_sender: EventSender,
}

impl PaymentReconciliationService {
    pub fn new(orders: OrderService, gateway: Arc<dyn PaymentGateway>, event_sender: EventSender) -> Self {
        Self {
            orders,
            gateway,
            event_sender,
        }
    }

    /// Entry point for inbound notifications. Anything that fails the
    /// authenticity check is logged and dropped.
    #[instrument(skip(self, raw, signature), fields(bytes = raw.len()))]
    pub async fn handle_notification(
        &self,
        raw: &[u8],
        signature: Option<NotificationSignature>,
    ) -> Result<ReconciliationOutcome, ServiceError> {
        let parsed = match signature {
            Some(signature) => self.gateway.parse_notification(raw, &signature),
            None => Err(GatewayError::Authenticity("signature headers missing".into())),
        };

        let event = match parsed {
            Ok(event) => event,
            Err(GatewayError::Authenticity(reason)) => {
                warn!(%reason, "dropping unauthenticated payment notification");
                metrics::record_payment_notification("unauthenticated");
                self.event_sender
                    .publish_all(vec![Event::PaymentNotificationRejected {
                        reason: reason.clone(),
                    }])
                    .await;
                return Err(ServiceError::WebhookAuthentication(reason));
            }
            Err(e) => {
                warn!(error = %e, "unusable payment notification");
                metrics::record_payment_notification("malformed");
                return Err(e.into());
            }
        };

        self.reconcile(event).await
    }

    /// Pulls the current status from the gateway and reconciles it.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn sync_status(&self, order_id: Uuid) -> Result<ReconciliationOutcome, ServiceError> {
        let aggregate = self.orders.get(order_id).await?;
        let event = self
            .gateway
            .check_status(&aggregate.order)
            .await
            .map_err(ServiceError::from)?;

        if event.order_number != aggregate.order.order_number {
            return Err(ServiceError::ExternalServiceError(format!(
                "gateway answered for {} instead of {}",
                event.order_number, aggregate.order.order_number
            )));
        }

        self.reconcile(event).await
    }

    #[instrument(skip(self, event), fields(order_number = %event.order_number, status = %event.transaction_status))]
    async fn reconcile(&self, event: GatewayEvent) -> Result<ReconciliationOutcome, ServiceError> {
        let order_id = self.orders.find_id_by_number(&event.order_number).await?;
        let mut scope = self.orders.open(order_id).await?;
        let event_hash = event.event_hash();
        let now = Utc::now();

        let seen = payment_notification::Entity::find()
            .filter(payment_notification::Column::EventHash.eq(event_hash.as_str()))
            .one(scope.txn())
            .await
            .map_err(ServiceError::db_error)?;
        if seen.is_some() {
            info!(%order_id, "notification already processed");
            metrics::record_payment_notification(&GatewayEffect::Duplicate.to_string());
            return Ok(ReconciliationOutcome {
                effect: GatewayEffect::Duplicate,
                order: scope.aggregate.clone(),
            });
        }

        let total = scope.aggregate.order.total;
        let effect = match event.status() {
            None => GatewayEffect::Ignored,
            Some(_) if event.gross_amount.is_some_and(|gross| gross != total) => {
                GatewayEffect::AmountMismatch
            }
            Some(status) => scope.aggregate.apply_gateway_status(status, now),
        };

        if matches!(
            effect,
            GatewayEffect::MarkedPaid
                | GatewayEffect::Cancelled
                | GatewayEffect::Refunded
                | GatewayEffect::AlreadyApplied
                | GatewayEffect::NoChange
        ) {
            scope
                .aggregate
                .record_gateway_report(&event.transaction_status, &event_hash, now);
        }

        let mut restored = Vec::new();
        if effect.changed_order() && scope.aggregate.status() == OrderStatus::Cancelled {
            restored = self.orders.restore_stock(&mut scope).await?;
        }

        payment_notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            event_hash: Set(event_hash),
            gateway_status: Set(event.transaction_status.clone()),
            transaction_id: Set(event.transaction_id.clone()),
            effect: Set(effect.to_string()),
            received_at: Set(now),
        }
        .insert(scope.txn())
        .await
        .map_err(ServiceError::db_error)?;

        let aggregate = self.orders.commit(scope).await?;
        metrics::record_payment_notification(&effect.to_string());

        match effect {
            GatewayEffect::Stale | GatewayEffect::Ignored => {
                info!(%order_id, %effect, "gateway report not applied")
            }
            GatewayEffect::AmountMismatch => warn!(
                %order_id,
                reported = ?event.gross_amount,
                expected = %total,
                "gateway amount disagrees with order total"
            ),
            _ => info!(%order_id, %effect, payment_status = %aggregate.payment_status(), "gateway report applied"),
        }

        let mut events = match effect {
            GatewayEffect::MarkedPaid => vec![Event::OrderPaid {
                order_id,
                gateway_status: Some(event.transaction_status.clone()),
            }],
            GatewayEffect::Cancelled => vec![Event::OrderCancelled {
                order_id,
                reason: aggregate.order.cancellation_reason.clone(),
            }],
            GatewayEffect::Refunded => vec![
                Event::OrderCancelled {
                    order_id,
                    reason: aggregate.order.cancellation_reason.clone(),
                },
                Event::OrderRefunded { order_id },
            ],
            _ => Vec::new(),
        };
        events.extend(restored);
        self.event_sender.publish_all(events).await;

        Ok(ReconciliationOutcome {
            effect,
            order: aggregate,
        })
    }
}
