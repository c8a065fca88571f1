use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::discount::{self, DiscountKind};
use crate::entities::{discount_product, discount_user};
use crate::errors::{DiscountError, ServiceError};

/// Product and user restrictions of a discount. Empty means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscountScope {
    pub product_ids: HashSet<Uuid>,
    pub user_ids: HashSet<Uuid>,
}

/// What the evaluator sees of an order.
#[derive(Debug, Clone)]
pub struct DiscountContext {
    pub subtotal: Decimal,
    pub product_ids: Vec<Uuid>,
    pub user_id: Option<Uuid>,
    pub now: DateTime<Utc>,
}

/// Checks every rule of `discount` against `ctx` and computes the amount.
/// Pure: never touches `usage_count`.
pub fn evaluate(
    discount: &discount::Model,
    scope: &DiscountScope,
    ctx: &DiscountContext,
) -> Result<Decimal, DiscountError> {
    if !discount.is_active {
        return Err(DiscountError::Inactive);
    }
    if matches!(discount.start_date, Some(start) if ctx.now < start) {
        return Err(DiscountError::NotYetStarted);
    }
    if matches!(discount.end_date, Some(end) if ctx.now > end) {
        return Err(DiscountError::Expired);
    }
    if matches!(discount.usage_limit, Some(limit) if discount.usage_count >= limit) {
        return Err(DiscountError::UsageLimitReached);
    }
    if matches!(discount.min_purchase, Some(min) if ctx.subtotal < min) {
        return Err(DiscountError::BelowMinimumPurchase);
    }
    if !scope.product_ids.is_empty()
        && !ctx.product_ids.iter().any(|id| scope.product_ids.contains(id))
    {
        return Err(DiscountError::ProductNotEligible);
    }
    if !scope.user_ids.is_empty()
        && !ctx.user_id.is_some_and(|id| scope.user_ids.contains(&id))
    {
        return Err(DiscountError::UserNotEligible);
    }

    Ok(discount_amount(discount, ctx.subtotal))
}

/// Amount for a discount that already passed validation, clamped to `[0, subtotal]`.
pub fn discount_amount(discount: &discount::Model, subtotal: Decimal) -> Decimal {
    let subtotal = subtotal.max(Decimal::ZERO);
    let raw = match discount.kind {
        DiscountKind::Percentage => {
            let amount = (subtotal * discount.value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            match discount.max_discount {
                Some(cap) => amount.min(cap),
                None => amount,
            }
        }
        DiscountKind::Fixed => discount.value.min(subtotal),
    };
    raw.max(Decimal::ZERO).min(subtotal)
}

/// A discount that passed evaluation together with its computed amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountQuote {
    pub discount_id: Uuid,
    pub code: String,
    pub name: String,
    pub amount: Decimal,
}

#[derive(Clone)]
pub struct DiscountService {
    db: Arc<DbPool>,
}

impl DiscountService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Looks a code up exactly as stored, after trimming.
    pub async fn find_by_code<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
    ) -> Result<discount::Model, ServiceError> {
        discount::Entity::find()
            .filter(discount::Column::Code.eq(code.trim()))
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or(ServiceError::Discount(DiscountError::NotFound))
    }

    pub async fn load_scope<C: ConnectionTrait>(
        &self,
        conn: &C,
        discount_id: Uuid,
    ) -> Result<DiscountScope, ServiceError> {
        let product_ids: Vec<Uuid> = discount_product::Entity::find()
            .select_only()
            .column(discount_product::Column::ProductId)
            .filter(discount_product::Column::DiscountId.eq(discount_id))
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let user_ids: Vec<Uuid> = discount_user::Entity::find()
            .select_only()
            .column(discount_user::Column::UserId)
            .filter(discount_user::Column::DiscountId.eq(discount_id))
            .into_tuple()
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(DiscountScope {
            product_ids: product_ids.into_iter().collect(),
            user_ids: user_ids.into_iter().collect(),
        })
    }

    /// Validates `code` against an order context on `conn` and prices it.
    #[instrument(skip(self, conn, ctx), fields(subtotal = %ctx.subtotal))]
    pub async fn quote<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        ctx: &DiscountContext,
    ) -> Result<(discount::Model, DiscountQuote), ServiceError> {
        let discount = self.find_by_code(conn, code).await?;
        let scope = self.load_scope(conn, discount.id).await?;

        let amount = evaluate(&discount, &scope, ctx).map_err(|reason| {
            debug!(code = %discount.code, reason = reason.code(), "discount rejected");
            ServiceError::Discount(reason)
        })?;

        let quote = DiscountQuote {
            discount_id: discount.id,
            code: discount.code.clone(),
            name: discount.name.clone(),
            amount,
        };
        Ok((discount, quote))
    }

    /// Read-only preview for a cart, outside any checkout transaction.
    pub async fn preview(
        &self,
        code: &str,
        ctx: &DiscountContext,
    ) -> Result<DiscountQuote, ServiceError> {
        let (_, quote) = self.quote(&*self.db, code, ctx).await?;
        Ok(quote)
    }

    /// Consumes one use of the discount with a single conditional update.
    /// Loses the race cleanly with `UsageLimitReached` when the limit was hit
    /// concurrently.
    #[instrument(skip(self, conn))]
    pub async fn redeem<C: ConnectionTrait>(
        &self,
        conn: &C,
        discount_id: Uuid,
    ) -> Result<(), ServiceError> {
        let result = discount::Entity::update_many()
            .col_expr(
                discount::Column::UsageCount,
                Expr::col(discount::Column::UsageCount).add(1),
            )
            .col_expr(discount::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(discount::Column::Id.eq(discount_id))
            .filter(discount::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(discount::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(discount::Column::UsageCount)
                            .lt(Expr::col(discount::Column::UsageLimit)),
                    ),
            )
            .exec(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            warn!(%discount_id, "discount usage guard rejected redemption");
            return Err(ServiceError::Discount(DiscountError::UsageLimitReached));
        }

        info!(%discount_id, "discount redeemed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;

    fn discount(kind: DiscountKind, value: Decimal) -> discount::Model {
        let now = Utc::now();
        discount::Model {
            id: Uuid::new_v4(),
            code: "HEMAT10".into(),
            name: "Hemat".into(),
            kind,
            value,
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            usage_count: 0,
            start_date: None,
            end_date: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn ctx(subtotal: Decimal) -> DiscountContext {
        DiscountContext {
            subtotal,
            product_ids: vec![Uuid::new_v4()],
            user_id: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn percentage_is_capped_by_max_discount() {
        let mut d = discount(DiscountKind::Percentage, dec!(10));
        d.max_discount = Some(dec!(50000));
        let amount = evaluate(&d, &DiscountScope::default(), &ctx(dec!(1000000))).unwrap();
        assert_eq!(amount, dec!(50000));
    }

    #[test]
    fn fixed_is_clamped_to_subtotal() {
        let d = discount(DiscountKind::Fixed, dec!(100000));
        let amount = evaluate(&d, &DiscountScope::default(), &ctx(dec!(80000))).unwrap();
        assert_eq!(amount, dec!(80000));
    }

    #[test]
    fn percentage_rounds_to_cents() {
        let d = discount(DiscountKind::Percentage, dec!(15));
        assert_eq!(discount_amount(&d, dec!(10.05)), dec!(1.51));
    }

    #[test]
    fn rules_are_checked_in_order() {
        let mut d = discount(DiscountKind::Fixed, dec!(10));
        d.is_active = false;
        d.usage_limit = Some(1);
        d.usage_count = 1;
        assert_eq!(
            evaluate(&d, &DiscountScope::default(), &ctx(dec!(100))),
            Err(DiscountError::Inactive)
        );

        d.is_active = true;
        assert_eq!(
            evaluate(&d, &DiscountScope::default(), &ctx(dec!(100))),
            Err(DiscountError::UsageLimitReached)
        );
    }

    #[test]
    fn validity_window_is_inclusive() {
        let now = Utc::now();
        let mut d = discount(DiscountKind::Fixed, dec!(10));
        let mut c = ctx(dec!(100));
        c.now = now;

        d.start_date = Some(now + Duration::minutes(1));
        assert_eq!(
            evaluate(&d, &DiscountScope::default(), &c),
            Err(DiscountError::NotYetStarted)
        );

        d.start_date = Some(now);
        d.end_date = Some(now);
        assert!(evaluate(&d, &DiscountScope::default(), &c).is_ok());

        d.end_date = Some(now - Duration::seconds(1));
        assert_eq!(
            evaluate(&d, &DiscountScope::default(), &c),
            Err(DiscountError::Expired)
        );
    }

    #[test]
    fn minimum_purchase_is_enforced() {
        let mut d = discount(DiscountKind::Fixed, dec!(10));
        d.min_purchase = Some(dec!(500));
        assert_eq!(
            evaluate(&d, &DiscountScope::default(), &ctx(dec!(499.99))),
            Err(DiscountError::BelowMinimumPurchase)
        );
        assert!(evaluate(&d, &DiscountScope::default(), &ctx(dec!(500))).is_ok());
    }

    #[test]
    fn product_scope_needs_one_matching_product() {
        let d = discount(DiscountKind::Fixed, dec!(10));
        let eligible = Uuid::new_v4();
        let scope = DiscountScope {
            product_ids: [eligible].into_iter().collect(),
            ..Default::default()
        };

        let mut c = ctx(dec!(100));
        assert_eq!(
            evaluate(&d, &scope, &c),
            Err(DiscountError::ProductNotEligible)
        );

        c.product_ids.push(eligible);
        assert!(evaluate(&d, &scope, &c).is_ok());
    }

    #[test]
    fn user_scope_rejects_guests_and_strangers() {
        let d = discount(DiscountKind::Fixed, dec!(10));
        let member = Uuid::new_v4();
        let scope = DiscountScope {
            user_ids: [member].into_iter().collect(),
            ..Default::default()
        };

        let mut c = ctx(dec!(100));
        assert_eq!(evaluate(&d, &scope, &c), Err(DiscountError::UserNotEligible));

        c.user_id = Some(Uuid::new_v4());
        assert_eq!(evaluate(&d, &scope, &c), Err(DiscountError::UserNotEligible));

        c.user_id = Some(member);
        assert!(evaluate(&d, &scope, &c).is_ok());
    }

    #[test]
    fn zero_subtotal_yields_zero() {
        let d = discount(DiscountKind::Percentage, dec!(50));
        assert_eq!(
            evaluate(&d, &DiscountScope::default(), &ctx(Decimal::ZERO)).unwrap(),
            Decimal::ZERO
        );
    }
}
