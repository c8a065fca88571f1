//! Order aggregate and its state machine.
//!
//! Pure: every transition mutates an in-memory [`OrderAggregate`] and reports
//! what happened. Loading, locking and persisting live in `services::orders`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::gateway::GatewayStatus;

/// Money figures of an order. Computed once at checkout, never recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount_amount: Decimal,
    pub total: Decimal,
}

impl Totals {
    /// `lines` are `(unit price, quantity)` pairs. The discount is clamped to the subtotal.
    pub fn compute<I>(lines: I, discount_amount: Decimal) -> Self
    where
        I: IntoIterator<Item = (Decimal, i32)>,
    {
        let subtotal: Decimal = lines
            .into_iter()
            .map(|(price, quantity)| line_subtotal(price, quantity))
            .sum();
        let discount_amount = discount_amount.max(Decimal::ZERO).min(subtotal);
        Self {
            subtotal,
            discount_amount,
            total: subtotal - discount_amount,
        }
    }
}

pub fn line_subtotal(price: Decimal, quantity: i32) -> Decimal {
    price * Decimal::from(quantity)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationDecision {
    Accept,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Cancelled { refunded: bool },
    AlreadyCancelled,
}

/// What a gateway report did to the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GatewayEffect {
    MarkedPaid,
    Cancelled,
    Refunded,
    /// Status acknowledged, nothing to do (`pending`)
    NoChange,
    /// The order already reflects this status
    AlreadyApplied,
    /// Same delivery seen before
    Duplicate,
    /// Arrived after the order moved past the point where it applies
    Stale,
    /// `gross_amount` disagrees with the order total
    AmountMismatch,
    /// Status outside the vocabulary the engine acts on
    Ignored,
}

impl GatewayEffect {
    pub fn changed_order(self) -> bool {
        matches!(self, Self::MarkedPaid | Self::Cancelled | Self::Refunded)
    }
}

/// An order with its lines, loaded and mutated as one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAggregate {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

impl OrderAggregate {
    pub fn new(order: order::Model, mut items: Vec<order_item::Model>) -> Self {
        items.sort_by_key(|item| item.position);
        Self { order, items }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.order.id
    }

    pub fn status(&self) -> OrderStatus {
        self.order.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.order.payment_status
    }

    fn invalid(&self, action: &'static str) -> ServiceError {
        ServiceError::InvalidTransition {
            action,
            order_status: self.order.status.to_string(),
            payment_status: self.order.payment_status.to_string(),
        }
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.order.updated_at = now;
    }

    fn mark_paid(&mut self, now: DateTime<Utc>) {
        self.order.payment_status = PaymentStatus::Paid;
        if self.order.paid_at.is_none() {
            self.order.paid_at = Some(now);
        }
        if self.order.status == OrderStatus::Pending {
            self.order.status = OrderStatus::Processing;
        }
        self.touch(now);
    }

    /// Customer uploaded proof of a manual transfer.
    pub fn submit_payment_proof(
        &mut self,
        proof: String,
        payment_method: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        const ACTION: &str = "submit payment proof for";

        if self.order.status.is_terminal()
            || !matches!(
                self.order.payment_status,
                PaymentStatus::Unpaid | PaymentStatus::Rejected
            )
        {
            return Err(self.invalid(ACTION));
        }

        self.order.payment_status = PaymentStatus::PendingVerification;
        self.order.payment_proof = Some(proof);
        if payment_method.is_some() {
            self.order.payment_method = payment_method;
        }
        self.order.verification_note = None;
        self.touch(now);
        Ok(())
    }

    /// Admin review of a submitted proof.
    pub fn verify_payment(
        &mut self,
        decision: VerificationDecision,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ServiceError> {
        const ACTION: &str = "verify payment for";

        if self.order.status.is_terminal()
            || self.order.payment_status != PaymentStatus::PendingVerification
        {
            return Err(self.invalid(ACTION));
        }

        match decision {
            VerificationDecision::Accept => self.mark_paid(now),
            VerificationDecision::Reject => {
                self.order.payment_status = PaymentStatus::Rejected;
                self.touch(now);
            }
        }
        self.order.verification_note = note;
        Ok(())
    }

    /// Cancels the order. Safe to repeat. Stock restoration is the caller's
    /// job and is itself guarded per line.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome, ServiceError> {
        match self.order.status {
            OrderStatus::Cancelled => return Ok(CancelOutcome::AlreadyCancelled),
            OrderStatus::Completed => return Err(self.invalid("cancel")),
            OrderStatus::Pending | OrderStatus::Processing => {}
        }

        let refunded = self.order.payment_status == PaymentStatus::Paid;
        self.order.payment_status = match self.order.payment_status {
            PaymentStatus::Paid | PaymentStatus::Refunded => PaymentStatus::Refunded,
            PaymentStatus::Unpaid | PaymentStatus::PendingVerification | PaymentStatus::Rejected => {
                PaymentStatus::Unpaid
            }
        };
        self.order.status = OrderStatus::Cancelled;
        self.order.cancelled_at = Some(now);
        self.order.cancellation_reason = reason;
        self.touch(now);

        Ok(CancelOutcome::Cancelled { refunded })
    }

    /// Admin marks a paid, processing order as fulfilled.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), ServiceError> {
        if self.order.status != OrderStatus::Processing
            || self.order.payment_status != PaymentStatus::Paid
        {
            return Err(self.invalid("complete"));
        }

        self.order.status = OrderStatus::Completed;
        self.order.completed_at = Some(now);
        self.touch(now);
        Ok(())
    }

    /// Applies a gateway report. Never fails: a report that does not fit the
    /// current state is classified, not applied.
    pub fn apply_gateway_status(&mut self, status: GatewayStatus, now: DateTime<Utc>) -> GatewayEffect {
        let order_status = self.order.status;
        let payment_status = self.order.payment_status;

        match status {
            GatewayStatus::Pending => GatewayEffect::NoChange,

            GatewayStatus::Settled => match (order_status, payment_status) {
                (_, PaymentStatus::Paid) => GatewayEffect::AlreadyApplied,
                (OrderStatus::Cancelled | OrderStatus::Completed, _)
                | (_, PaymentStatus::Refunded) => GatewayEffect::Stale,
                _ => {
                    self.mark_paid(now);
                    GatewayEffect::MarkedPaid
                }
            },

            GatewayStatus::Denied | GatewayStatus::Expired => match (order_status, payment_status) {
                (OrderStatus::Cancelled, _) => GatewayEffect::AlreadyApplied,
                (OrderStatus::Completed, _)
                | (_, PaymentStatus::Paid | PaymentStatus::Refunded) => GatewayEffect::Stale,
                _ => self.cancel_from_gateway(status, now),
            },

            GatewayStatus::Cancelled => match order_status {
                OrderStatus::Cancelled => GatewayEffect::AlreadyApplied,
                OrderStatus::Completed => GatewayEffect::Stale,
                _ => self.cancel_from_gateway(status, now),
            },

            GatewayStatus::Refunded => match (order_status, payment_status) {
                (_, PaymentStatus::Refunded) => GatewayEffect::AlreadyApplied,
                (OrderStatus::Pending | OrderStatus::Processing, PaymentStatus::Paid) => {
                    self.cancel_from_gateway(status, now)
                }
                _ => GatewayEffect::Stale,
            },
        }
    }

    fn cancel_from_gateway(&mut self, status: GatewayStatus, now: DateTime<Utc>) -> GatewayEffect {
        match self.cancel(Some(format!("payment {}", status)), now) {
            Ok(CancelOutcome::Cancelled { refunded: true }) => GatewayEffect::Refunded,
            Ok(CancelOutcome::Cancelled { refunded: false }) => GatewayEffect::Cancelled,
            Ok(CancelOutcome::AlreadyCancelled) => GatewayEffect::AlreadyApplied,
            // only reachable from a completed order, which callers filter out
            Err(_) => GatewayEffect::Stale,
        }
    }

    /// Remembers the last gateway report the order now reflects.
    pub fn record_gateway_report(&mut self, raw_status: &str, event_hash: &str, now: DateTime<Utc>) {
        self.order.gateway_status = Some(raw_status.to_string());
        self.order.gateway_event_hash = Some(event_hash.to_string());
        self.touch(now);
    }
}
