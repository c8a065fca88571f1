//! Stock ledger for order lines.
//!
//! Every movement is a pair of conditional updates inside one savepoint: first
//! the line's one-way flag is claimed, then the variant counter is moved with
//! a guard. Losing either guard rolls the savepoint back, so a line can take
//! stock at most once and give it back at most once.

use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, TransactionTrait};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::entities::{order_item, product_variant};
use crate::errors::ServiceError;
use crate::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No variant, or the variant does not track stock
    Unmanaged,
    AlreadyReserved,
    NotReserved,
    AlreadyRestored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LedgerOutcome {
    Applied { variant_id: Uuid, quantity: i32 },
    Skipped { reason: SkipReason },
}

impl LedgerOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryLedger;

impl InventoryLedger {
    pub fn new() -> Self {
        Self
    }

    /// Loads the variant behind a line, or `None` when the line does not track stock.
    async fn managed_variant<C: ConnectionTrait>(
        &self,
        conn: &C,
        item: &order_item::Model,
    ) -> Result<Option<product_variant::Model>, ServiceError> {
        let Some(variant_id) = item.variant_id else {
            return Ok(None);
        };

        let variant = product_variant::Entity::find_by_id(variant_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Variant {} not found", variant_id)))?;

        Ok(variant.manage_stock.then_some(variant))
    }

    /// Takes `item.quantity` units from the variant. Idempotent per line.
    #[instrument(skip(self, conn, item), fields(item_id = %item.id, quantity = item.quantity))]
    pub async fn reserve<C>(
        &self,
        conn: &C,
        item: &order_item::Model,
    ) -> Result<LedgerOutcome, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        if item.quantity <= 0 {
            return Err(ServiceError::InvalidInput(format!(
                "Quantity for {} must be positive",
                item.display_name()
            )));
        }

        let Some(variant) = self.managed_variant(conn, item).await? else {
            debug!("line does not track stock");
            return Ok(LedgerOutcome::skipped(SkipReason::Unmanaged));
        };

        let savepoint = conn.begin().await.map_err(ServiceError::db_error)?;

        let claimed = order_item::Entity::update_many()
            .col_expr(order_item::Column::StockReduced, Expr::value(true))
            .col_expr(order_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order_item::Column::Id.eq(item.id))
            .filter(order_item::Column::StockReduced.eq(false))
            .exec(&savepoint)
            .await
            .map_err(ServiceError::db_error)?;

        if claimed.rows_affected == 0 {
            savepoint.rollback().await.map_err(ServiceError::db_error)?;
            debug!("stock already taken for line");
            return Ok(LedgerOutcome::skipped(SkipReason::AlreadyReserved));
        }

        let taken = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).sub(item.quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant.id))
            .filter(product_variant::Column::StockQuantity.gte(item.quantity))
            .exec(&savepoint)
            .await
            .map_err(ServiceError::db_error)?;

        if taken.rows_affected == 0 {
            savepoint.rollback().await.map_err(ServiceError::db_error)?;
            warn!(variant_id = %variant.id, "not enough stock for line");
            return Err(ServiceError::InsufficientStock(item.display_name()));
        }

        savepoint.commit().await.map_err(ServiceError::db_error)?;
        metrics::record_stock_movement("reserved", item.quantity);
        info!(variant_id = %variant.id, "stock reserved");

        Ok(LedgerOutcome::Applied {
            variant_id: variant.id,
            quantity: item.quantity,
        })
    }

    /// Gives back what `reserve` took. No-op unless the line was reserved and
    /// not yet restored.
    #[instrument(skip(self, conn, item), fields(item_id = %item.id, quantity = item.quantity))]
    pub async fn restore<C>(
        &self,
        conn: &C,
        item: &order_item::Model,
    ) -> Result<LedgerOutcome, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let Some(variant) = self.managed_variant(conn, item).await? else {
            return Ok(LedgerOutcome::skipped(SkipReason::Unmanaged));
        };

        let savepoint = conn.begin().await.map_err(ServiceError::db_error)?;

        let claimed = order_item::Entity::update_many()
            .col_expr(order_item::Column::StockRestored, Expr::value(true))
            .col_expr(order_item::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order_item::Column::Id.eq(item.id))
            .filter(order_item::Column::StockReduced.eq(true))
            .filter(order_item::Column::StockRestored.eq(false))
            .exec(&savepoint)
            .await
            .map_err(ServiceError::db_error)?;

        if claimed.rows_affected == 0 {
            savepoint.rollback().await.map_err(ServiceError::db_error)?;
            let current = order_item::Entity::find_by_id(item.id)
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?;
            let reason = match current {
                Some(line) if line.stock_reduced => SkipReason::AlreadyRestored,
                _ => SkipReason::NotReserved,
            };
            debug!(?reason, "nothing to restore");
            return Ok(LedgerOutcome::skipped(reason));
        }

        let returned = product_variant::Entity::update_many()
            .col_expr(
                product_variant::Column::StockQuantity,
                Expr::col(product_variant::Column::StockQuantity).add(item.quantity),
            )
            .col_expr(product_variant::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(product_variant::Column::Id.eq(variant.id))
            .exec(&savepoint)
            .await
            .map_err(ServiceError::db_error)?;

        if returned.rows_affected == 0 {
            savepoint.rollback().await.map_err(ServiceError::db_error)?;
            return Err(ServiceError::NotFound(format!(
                "Variant {} not found",
                variant.id
            )));
        }

        savepoint.commit().await.map_err(ServiceError::db_error)?;
        metrics::record_stock_movement("restored", item.quantity);
        info!(variant_id = %variant.id, "stock restored");

        Ok(LedgerOutcome::Applied {
            variant_id: variant.id,
            quantity: item.quantity,
        })
    }

    /// Restores every line of an order, in order.
    pub async fn restore_all<C>(
        &self,
        conn: &C,
        items: &[order_item::Model],
    ) -> Result<Vec<LedgerOutcome>, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let mut outcomes = Vec::with_capacity(items.len());
        for item in items {
            outcomes.push(self.restore(conn, item).await?);
        }
        Ok(outcomes)
    }
}
