//! Checkout orchestration: cart in, persisted order with reserved stock out.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, DatabaseTransaction, SqlErr,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::order::{self, OrderStatus, PaymentStatus};
use crate::entities::order_item;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::gateway::{PaymentGateway, PaymentSession};
use crate::metrics;
use crate::services::catalog::{CatalogEntry, CatalogSnapshot};
use crate::services::discounts::{DiscountContext, DiscountQuote, DiscountService};
use crate::services::inventory::{InventoryLedger, LedgerOutcome};
use crate::services::order_lifecycle::{line_subtotal, OrderAggregate, Totals};
use crate::services::order_number::OrderNumberGenerator;
use crate::services::orders::{load_items, OrderService};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CustomerDetails {
    #[validate(length(min = 1, max = 255, message = "Customer name is required"))]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 32))]
    pub phone: Option<String>,
}

/// One cart line as submitted. Prices are never taken from the client.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CartItem {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    #[validate(range(min = 1, max = 1000))]
    pub quantity: i32,
    /// Free-form answers to product questions
    pub custom_options: Option<serde_json::Value>,
    pub booking_start_at: Option<DateTime<Utc>>,
    pub booking_end_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate]
    pub customer: CustomerDetails,
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub items: Vec<CartItem>,
    pub discount_code: Option<String>,
    pub user_id: Option<Uuid>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DiscountPreviewRequest {
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub items: Vec<CartItem>,
    #[validate(length(min = 1, max = 64))]
    pub discount_code: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscountPreview {
    pub subtotal: Decimal,
    pub discount: DiscountQuote,
    pub total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order: OrderAggregate,
    /// Absent when the gateway could not be reached; manual payment still works.
    pub payment_session: Option<PaymentSession>,
}

/// A cart line priced from the catalog.
#[derive(Debug, Clone)]
struct PricedLine {
    product_id: Uuid,
    variant_id: Option<Uuid>,
    product_name: String,
    variant_name: Option<String>,
    price: Decimal,
    quantity: i32,
    custom_options: Option<serde_json::Value>,
    booking_start_at: Option<DateTime<Utc>>,
    booking_end_at: Option<DateTime<Utc>>,
}

/// Settings the orchestrator takes from configuration.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub currency: String,
    pub order_number_max_attempts: u32,
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DbPool>,
    discounts: DiscountService,
    orders: OrderService,
    ledger: InventoryLedger,
    gateway: Arc<dyn PaymentGateway>,
    order_numbers: Arc<dyn OrderNumberGenerator>,
    event_sender: EventSender,
    settings: CheckoutSettings,
}

impl CheckoutService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<DbPool>,
        discounts: DiscountService,
        orders: OrderService,
        gateway: Arc<dyn PaymentGateway>,
        order_numbers: Arc<dyn OrderNumberGenerator>,
        event_sender: EventSender,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            db,
            discounts,
            orders,
            ledger: InventoryLedger::new(),
            gateway,
            order_numbers,
            event_sender,
            settings,
        }
    }

    /// Places an order. Either the order, its lines, every stock reservation
    /// and the discount redemption are committed together, or nothing is.
    #[instrument(skip(self, request), fields(items = request.items.len(), discount = ?request.discount_code))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt, ServiceError> {
        let result = self.place_order(request).await;

        let outcome = match &result {
            Ok(_) => "created",
            Err(ServiceError::Discount(_)) => "discount_rejected",
            Err(ServiceError::InsufficientStock(_)) => "insufficient_stock",
            Err(e) if e.is_validation() => "invalid",
            Err(_) => "failed",
        };
        metrics::record_checkout(outcome);

        let (aggregate, events) = result?;
        let order_id = aggregate.id();
        info!(%order_id, order_number = %aggregate.order.order_number, total = %aggregate.order.total, "order placed");
        self.event_sender.publish_all(events).await;

        let (order, payment_session) = self.open_payment_session(aggregate).await;
        Ok(CheckoutReceipt {
            order,
            payment_session,
        })
    }

    /// Prices a cart and checks a discount code against it without placing anything.
    #[instrument(skip(self, request), fields(code = %request.discount_code))]
    pub async fn preview_discount(
        &self,
        request: DiscountPreviewRequest,
    ) -> Result<DiscountPreview, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let now = Utc::now();
        let lines = self.price_cart(&*self.db, &request.items, now).await?;
        let subtotal = Totals::compute(lines.iter().map(|l| (l.price, l.quantity)), Decimal::ZERO).subtotal;
        let ctx = DiscountContext {
            subtotal,
            product_ids: distinct_products(&lines),
            user_id: request.user_id,
            now,
        };

        let discount = self.discounts.preview(&request.discount_code, &ctx).await?;
        Ok(DiscountPreview {
            subtotal,
            total: subtotal - discount.amount,
            discount,
        })
    }

    async fn place_order(
        &self,
        request: CheckoutRequest,
    ) -> Result<(OrderAggregate, Vec<Event>), ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let now = Utc::now();
        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start checkout transaction");
            ServiceError::db_error(e)
        })?;

        let lines = self.price_cart(&txn, &request.items, now).await?;
        let gross = Totals::compute(lines.iter().map(|l| (l.price, l.quantity)), Decimal::ZERO);

        let applied = match request
            .discount_code
            .as_deref()
            .map(str::trim)
            .filter(|code| !code.is_empty())
        {
            Some(code) => {
                let ctx = DiscountContext {
                    subtotal: gross.subtotal,
                    product_ids: distinct_products(&lines),
                    user_id: request.user_id,
                    now,
                };
                Some(self.discounts.quote(&txn, code, &ctx).await?)
            }
            None => None,
        };

        let totals = Totals::compute(
            lines.iter().map(|l| (l.price, l.quantity)),
            applied
                .as_ref()
                .map(|(_, quote)| quote.amount)
                .unwrap_or(Decimal::ZERO),
        );

        let order_id = Uuid::new_v4();
        let draft = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(String::new()),
            user_id: Set(request.user_id),
            customer_name: Set(request.customer.name.trim().to_string()),
            customer_email: Set(request.customer.email.trim().to_string()),
            customer_phone: Set(request.customer.phone.clone()),
            subtotal: Set(totals.subtotal),
            discount_id: Set(applied.as_ref().map(|(discount, _)| discount.id)),
            discount_code: Set(applied.as_ref().map(|(discount, _)| discount.code.clone())),
            discount_amount: Set(totals.discount_amount),
            total: Set(totals.total),
            currency: Set(self.settings.currency.clone()),
            status: Set(OrderStatus::Pending),
            payment_status: Set(PaymentStatus::Unpaid),
            payment_method: Set(None),
            payment_proof: Set(None),
            payment_session_token: Set(None),
            verification_note: Set(None),
            gateway_status: Set(None),
            gateway_event_hash: Set(None),
            cancellation_reason: Set(None),
            paid_at: Set(None),
            cancelled_at: Set(None),
            completed_at: Set(None),
            notes: Set(request.notes.clone()),
            created_at: Set(now),
            updated_at: Set(now),
            version: Set(1),
        };
        let order = self.insert_with_unique_number(&txn, draft, now).await?;

        let mut items = Vec::with_capacity(lines.len());
        for (position, line) in lines.into_iter().enumerate() {
            let item = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                position: Set(position as i32),
                product_id: Set(line.product_id),
                variant_id: Set(line.variant_id),
                product_name: Set(line.product_name),
                variant_name: Set(line.variant_name),
                price: Set(line.price),
                quantity: Set(line.quantity),
                subtotal: Set(line_subtotal(line.price, line.quantity)),
                custom_options: Set(line.custom_options),
                booking_start_at: Set(line.booking_start_at),
                booking_end_at: Set(line.booking_end_at),
                stock_reduced: Set(false),
                stock_restored: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            items.push(item);
        }

        let mut events = vec![Event::OrderCreated {
            order_id,
            order_number: order.order_number.clone(),
            total: order.total,
        }];

        for item in &items {
            if let LedgerOutcome::Applied {
                variant_id,
                quantity,
            } = self.ledger.reserve(&txn, item).await?
            {
                events.push(Event::InventoryReserved {
                    order_id,
                    variant_id,
                    quantity,
                });
            }
        }

        if let Some((discount, quote)) = &applied {
            self.discounts.redeem(&txn, discount.id).await?;
            events.push(Event::DiscountRedeemed {
                order_id,
                discount_id: discount.id,
                amount: quote.amount,
            });
        }

        // flags were flipped by the ledger after the lines were inserted
        let items = load_items(&txn, order_id).await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to commit checkout transaction");
            ServiceError::db_error(e)
        })?;

        Ok((OrderAggregate::new(order, items), events))
    }

    async fn price_cart<C: ConnectionTrait>(
        &self,
        conn: &C,
        items: &[CartItem],
        now: DateTime<Utc>,
    ) -> Result<Vec<PricedLine>, ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".into()));
        }

        let snapshot = CatalogSnapshot::load(
            conn,
            items.iter().map(|item| item.product_id),
            items.iter().filter_map(|item| item.variant_id),
        )
        .await?;

        items
            .iter()
            .map(|item| {
                let entry = snapshot.resolve(item.product_id, item.variant_id)?;
                let (booking_start_at, booking_end_at) = booking_window(&entry, item, now)?;
                Ok(PricedLine {
                    product_id: entry.product.id,
                    variant_id: entry.variant.map(|v| v.id),
                    product_name: entry.product.name.clone(),
                    variant_name: entry.variant.map(|v| v.name.clone()),
                    price: entry.unit_price(),
                    quantity: item.quantity,
                    custom_options: item.custom_options.clone(),
                    booking_start_at,
                    booking_end_at,
                })
            })
            .collect()
    }

    /// Inserts the order under a fresh number, retrying inside a savepoint
    /// when the number is already taken.
    async fn insert_with_unique_number(
        &self,
        txn: &DatabaseTransaction,
        draft: order::ActiveModel,
        now: DateTime<Utc>,
    ) -> Result<order::Model, ServiceError> {
        let attempts = self.settings.order_number_max_attempts.max(1);

        for attempt in 1..=attempts {
            let mut candidate = draft.clone();
            let number = self.order_numbers.generate(now);
            candidate.order_number = Set(number.clone());

            let savepoint = txn.begin().await.map_err(ServiceError::db_error)?;
            match candidate.insert(&savepoint).await {
                Ok(order) => {
                    savepoint.commit().await.map_err(ServiceError::db_error)?;
                    return Ok(order);
                }
                Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                    savepoint.rollback().await.map_err(ServiceError::db_error)?;
                    warn!(attempt, order_number = %number, "order number collision, retrying");
                }
                Err(e) => return Err(ServiceError::db_error(e)),
            }
        }

        error!(attempts, "could not allocate a unique order number");
        Err(ServiceError::InternalError(
            "could not allocate a unique order number".into(),
        ))
    }

    /// Gateway trouble never undoes a placed order.
    async fn open_payment_session(
        &self,
        aggregate: OrderAggregate,
    ) -> (OrderAggregate, Option<PaymentSession>) {
        let order_id = aggregate.id();
        let session = match self.gateway.create_session(&aggregate.order).await {
            Ok(session) => session,
            Err(e) => {
                warn!(%order_id, error = %e, "payment session unavailable; order stays payable manually");
                return (aggregate, None);
            }
        };

        match self
            .orders
            .attach_payment_session(order_id, session.session_token.clone())
            .await
        {
            Ok(updated) => (updated, Some(session)),
            Err(e) => {
                warn!(%order_id, error = %e, "failed to store payment session token");
                (aggregate, Some(session))
            }
        }
    }
}

fn distinct_products(lines: &[PricedLine]) -> Vec<Uuid> {
    lines
        .iter()
        .map(|line| line.product_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Booking rules: a variant with `duration_hours` needs a start and gets its
/// end derived; anything else may carry a window only with both bounds.
fn booking_window(
    entry: &CatalogEntry<'_>,
    item: &CartItem,
    now: DateTime<Utc>,
) -> Result<(Option<DateTime<Utc>>, Option<DateTime<Utc>>), ServiceError> {
    match entry.duration_hours() {
        Some(hours) if hours <= 0 => Err(ServiceError::InvalidInput(format!(
            "{} has an invalid booking duration",
            entry.product.name
        ))),
        Some(hours) => {
            let start = item.booking_start_at.ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "{} requires booking_start_at",
                    entry.product.name
                ))
            })?;
            if start < now {
                return Err(ServiceError::ValidationError(format!(
                    "Booking for {} cannot start in the past",
                    entry.product.name
                )));
            }
            let end = start
                .checked_add_signed(Duration::hours(i64::from(hours)))
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Booking for {} ends beyond the supported calendar",
                        entry.product.name
                    ))
                })?;
            Ok((Some(start), Some(end)))
        }
        None => match (item.booking_start_at, item.booking_end_at) {
            (None, None) => Ok((None, None)),
            (Some(start), Some(end)) if end > start => Ok((Some(start), Some(end))),
            _ => Err(ServiceError::ValidationError(
                "Booking window needs both bounds with end after start".into(),
            )),
        },
    }
}
