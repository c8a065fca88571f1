use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseTransaction, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::{order, order_item};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::metrics;
use crate::services::inventory::{InventoryLedger, LedgerOutcome};
use crate::services::order_lifecycle::{CancelOutcome, OrderAggregate, VerificationDecision};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitPaymentProofRequest {
    /// Reference to the stored proof (upload path or URL)
    #[validate(length(min = 1, max = 512, message = "Payment proof reference is required"))]
    pub payment_proof: String,
    #[validate(length(min = 1, max = 64))]
    pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct VerifyPaymentRequest {
    pub decision: VerificationDecision,
    #[validate(length(max = 1000))]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CancelOrderRequest {
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

/// In-process mutual exclusion per order id. Complements the row lock taken
/// inside the transaction, which SQLite does not provide.
#[derive(Debug, Clone, Default)]
pub struct OrderLocks {
    inner: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl OrderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, order_id: Uuid) -> OrderLockGuard {
        let mutex = self
            .inner
            .entry(order_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        OrderLockGuard {
            guard: Some(guard),
            locks: self.inner.clone(),
            order_id,
        }
    }

    /// Number of orders with a live lock entry.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct OrderLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
    order_id: Uuid,
}

impl Drop for OrderLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // the map's own reference is the last one: nobody is waiting
        self.locks
            .remove_if(&self.order_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// A locked order inside an open transaction. Dropping it without
/// [`OrderService::commit`] rolls everything back.
pub struct OrderScope {
    txn: DatabaseTransaction,
    pub aggregate: OrderAggregate,
    original: order::Model,
    items_touched: bool,
    _guard: OrderLockGuard,
}

impl OrderScope {
    pub fn txn(&self) -> &DatabaseTransaction {
        &self.txn
    }
}

/// Loads an order and its lines, ordered by position.
pub async fn load_aggregate<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<OrderAggregate, ServiceError> {
    let order = order::Entity::find_by_id(order_id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
    let items = load_items(conn, order_id).await?;
    Ok(OrderAggregate::new(order, items))
}

pub(crate) async fn load_items<C: ConnectionTrait>(
    conn: &C,
    order_id: Uuid,
) -> Result<Vec<order_item::Model>, ServiceError> {
    order_item::Entity::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .order_by_asc(order_item::Column::Position)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    ledger: InventoryLedger,
    locks: OrderLocks,
}

impl OrderService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, locks: OrderLocks) -> Self {
        Self {
            db,
            event_sender,
            ledger: InventoryLedger::new(),
            locks,
        }
    }

    pub fn locks(&self) -> &OrderLocks {
        &self.locks
    }

    #[instrument(skip(self))]
    pub async fn get(&self, order_id: Uuid) -> Result<OrderAggregate, ServiceError> {
        load_aggregate(&*self.db, order_id).await
    }

    pub async fn find_id_by_number(&self, order_number: &str) -> Result<Uuid, ServiceError> {
        order::Entity::find()
            .select_only()
            .column(order::Column::Id)
            .filter(order::Column::OrderNumber.eq(order_number))
            .into_tuple::<Uuid>()
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))
    }

    /// Serialises on the order: in-process lock first, then a transaction
    /// holding the row lock.
    pub(crate) async fn open(&self, order_id: Uuid) -> Result<OrderScope, ServiceError> {
        let guard = self.locks.acquire(order_id).await;

        let txn = self.db.begin().await.map_err(|e| {
            error!(error = %e, %order_id, "Failed to start order transaction");
            ServiceError::db_error(e)
        })?;

        let order = order::Entity::find_by_id(order_id)
            .lock_exclusive()
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        let items = load_items(&txn, order_id).await?;

        Ok(OrderScope {
            original: order.clone(),
            aggregate: OrderAggregate::new(order, items),
            items_touched: false,
            txn,
            _guard: guard,
        })
    }

    /// Restores stock for every line of the scoped order. Returns one event
    /// per line that actually moved stock.
    pub(crate) async fn restore_stock(&self, scope: &mut OrderScope) -> Result<Vec<Event>, ServiceError> {
        let order_id = scope.aggregate.id();
        let outcomes = self
            .ledger
            .restore_all(&scope.txn, &scope.aggregate.items)
            .await?;
        scope.items_touched = true;

        Ok(outcomes
            .into_iter()
            .filter_map(|outcome| match outcome {
                LedgerOutcome::Applied {
                    variant_id,
                    quantity,
                } => Some(Event::InventoryRestored {
                    order_id,
                    variant_id,
                    quantity,
                }),
                LedgerOutcome::Skipped { .. } => None,
            })
            .collect())
    }

    /// Writes the mutable columns with a version check, then commits.
    /// Money columns are never part of the update.
    pub(crate) async fn commit(&self, scope: OrderScope) -> Result<OrderAggregate, ServiceError> {
        let OrderScope {
            txn,
            mut aggregate,
            original,
            items_touched,
            _guard,
        } = scope;

        if aggregate.order != original {
            let o = &aggregate.order;
            let next_version = original.version + 1;
            let changes = order::ActiveModel {
                status: Set(o.status),
                payment_status: Set(o.payment_status),
                payment_method: Set(o.payment_method.clone()),
                payment_proof: Set(o.payment_proof.clone()),
                payment_session_token: Set(o.payment_session_token.clone()),
                verification_note: Set(o.verification_note.clone()),
                gateway_status: Set(o.gateway_status.clone()),
                gateway_event_hash: Set(o.gateway_event_hash.clone()),
                cancellation_reason: Set(o.cancellation_reason.clone()),
                paid_at: Set(o.paid_at),
                cancelled_at: Set(o.cancelled_at),
                completed_at: Set(o.completed_at),
                updated_at: Set(o.updated_at),
                version: Set(next_version),
                ..Default::default()
            };

            let result = order::Entity::update_many()
                .set(changes)
                .filter(order::Column::Id.eq(original.id))
                .filter(order::Column::Version.eq(original.version))
                .exec(&txn)
                .await
                .map_err(ServiceError::db_error)?;

            if result.rows_affected == 0 {
                warn!(order_id = %original.id, version = original.version, "order changed underneath us");
                return Err(ServiceError::ConcurrentModification(original.id));
            }
            aggregate.order.version = next_version;
        }

        if items_touched {
            aggregate.items = load_items(&txn, original.id).await?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %original.id, "Failed to commit order transaction");
            ServiceError::db_error(e)
        })?;

        Ok(aggregate)
    }

    fn record<T>(action: &str, result: &Result<T, ServiceError>) {
        let outcome = match result {
            Ok(_) => "applied",
            Err(e) if e.is_invariant_violation() => "rejected",
            Err(_) => "failed",
        };
        metrics::record_transition(action, outcome);
    }

    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn submit_payment_proof(
        &self,
        order_id: Uuid,
        request: SubmitPaymentProofRequest,
    ) -> Result<OrderAggregate, ServiceError> {
        request.validate()?;

        let result = async {
            let mut scope = self.open(order_id).await?;
            scope.aggregate.submit_payment_proof(
                request.payment_proof,
                request.payment_method,
                Utc::now(),
            )?;
            self.commit(scope).await
        }
        .await;
        Self::record("submit_payment_proof", &result);

        let aggregate = result?;
        info!("payment proof submitted");
        self.event_sender
            .publish_all(vec![Event::PaymentProofSubmitted { order_id }])
            .await;
        Ok(aggregate)
    }

    #[instrument(skip(self, request), fields(order_id = %order_id, decision = ?request.decision))]
    pub async fn verify_payment(
        &self,
        order_id: Uuid,
        request: VerifyPaymentRequest,
    ) -> Result<OrderAggregate, ServiceError> {
        request.validate()?;

        let result = async {
            let mut scope = self.open(order_id).await?;
            scope
                .aggregate
                .verify_payment(request.decision, request.note.clone(), Utc::now())?;
            self.commit(scope).await
        }
        .await;
        Self::record("verify_payment", &result);

        let aggregate = result?;
        let events = match request.decision {
            VerificationDecision::Accept => vec![
                Event::PaymentVerified { order_id },
                Event::OrderPaid {
                    order_id,
                    gateway_status: None,
                },
            ],
            VerificationDecision::Reject => vec![Event::PaymentRejected {
                order_id,
                note: request.note,
            }],
        };
        info!(payment_status = %aggregate.payment_status(), "payment reviewed");
        self.event_sender.publish_all(events).await;
        Ok(aggregate)
    }

    /// Cancels the order and gives back its stock. Calling it again on a
    /// cancelled order returns the same snapshot.
    #[instrument(skip(self, request), fields(order_id = %order_id))]
    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        request: CancelOrderRequest,
    ) -> Result<OrderAggregate, ServiceError> {
        request.validate()?;

        let result = async {
            let mut scope = self.open(order_id).await?;
            let outcome = scope.aggregate.cancel(request.reason.clone(), Utc::now())?;
            let restored = self.restore_stock(&mut scope).await?;
            let aggregate = self.commit(scope).await?;
            Ok::<_, ServiceError>((aggregate, outcome, restored))
        }
        .await;
        Self::record("cancel", &result);

        let (aggregate, outcome, restored) = result?;
        let mut events = Vec::new();
        match outcome {
            CancelOutcome::Cancelled { refunded } => {
                info!(refunded, "order cancelled");
                events.push(Event::OrderCancelled {
                    order_id,
                    reason: request.reason,
                });
                if refunded {
                    events.push(Event::OrderRefunded { order_id });
                }
            }
            CancelOutcome::AlreadyCancelled => info!("order was already cancelled"),
        }
        events.extend(restored);
        self.event_sender.publish_all(events).await;
        Ok(aggregate)
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn complete_order(&self, order_id: Uuid) -> Result<OrderAggregate, ServiceError> {
        let result = async {
            let mut scope = self.open(order_id).await?;
            scope.aggregate.complete(Utc::now())?;
            self.commit(scope).await
        }
        .await;
        Self::record("complete", &result);

        let aggregate = result?;
        info!("order completed");
        self.event_sender
            .publish_all(vec![Event::OrderCompleted { order_id }])
            .await;
        Ok(aggregate)
    }

    /// Stores the gateway session token obtained after checkout committed.
    #[instrument(skip(self, session_token), fields(order_id = %order_id))]
    pub async fn attach_payment_session(
        &self,
        order_id: Uuid,
        session_token: String,
    ) -> Result<OrderAggregate, ServiceError> {
        let mut scope = self.open(order_id).await?;
        scope.aggregate.order.payment_session_token = Some(session_token);
        scope.aggregate.order.updated_at = Utc::now();
        self.commit(scope).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn locks_serialise_the_same_order() {
        let locks = OrderLocks::new();
        let id = Uuid::new_v4();

        let first = locks.acquire(id).await;
        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _second = locks.acquire(id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(first);
        contender.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn locks_on_different_orders_do_not_block() {
        let locks = OrderLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(Uuid::new_v4())).await;
        assert!(b.is_ok());
        assert_eq!(locks.len(), 2);
    }

    #[test]
    fn request_validation() {
        let empty = SubmitPaymentProofRequest {
            payment_proof: String::new(),
            payment_method: None,
        };
        assert!(empty.validate().is_err());

        let long_reason = CancelOrderRequest {
            reason: Some("x".repeat(501)),
        };
        assert!(long_reason.validate().is_err());
        assert!(CancelOrderRequest::default().validate().is_ok());
    }
}
