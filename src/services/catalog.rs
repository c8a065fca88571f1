//! Read-only view of the catalog used while pricing a cart.

use std::collections::HashMap;

use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use crate::entities::{product, product_variant};
use crate::errors::ServiceError;

/// Current catalog data for one cart line.
#[derive(Debug, Clone, Copy)]
pub struct CatalogEntry<'a> {
    pub product: &'a product::Model,
    pub variant: Option<&'a product_variant::Model>,
}

impl CatalogEntry<'_> {
    /// Authoritative unit price: the variant override, else the product price.
    pub fn unit_price(&self) -> Decimal {
        self.variant
            .and_then(|variant| variant.price)
            .unwrap_or(self.product.price)
    }

    pub fn duration_hours(&self) -> Option<i32> {
        self.variant.and_then(|variant| variant.duration_hours)
    }
}

/// Products and variants referenced by a cart, loaded in two queries.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    products: HashMap<Uuid, product::Model>,
    variants: HashMap<Uuid, product_variant::Model>,
}

impl CatalogSnapshot {
    pub async fn load<C: ConnectionTrait>(
        conn: &C,
        product_ids: impl IntoIterator<Item = Uuid>,
        variant_ids: impl IntoIterator<Item = Uuid>,
    ) -> Result<Self, ServiceError> {
        let product_ids: Vec<Uuid> = product_ids.into_iter().collect();
        let variant_ids: Vec<Uuid> = variant_ids.into_iter().collect();

        let products = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(conn)
            .await
            .map_err(ServiceError::db_error)?;

        let variants = if variant_ids.is_empty() {
            Vec::new()
        } else {
            product_variant::Entity::find()
                .filter(product_variant::Column::Id.is_in(variant_ids))
                .all(conn)
                .await
                .map_err(ServiceError::db_error)?
        };

        Ok(Self {
            products: products.into_iter().map(|p| (p.id, p)).collect(),
            variants: variants.into_iter().map(|v| (v.id, v)).collect(),
        })
    }

    /// Resolves a cart line. The product and the variant must both be active
    /// and the variant must belong to the product.
    pub fn resolve(
        &self,
        product_id: Uuid,
        variant_id: Option<Uuid>,
    ) -> Result<CatalogEntry<'_>, ServiceError> {
        let product = self
            .products
            .get(&product_id)
            .filter(|product| product.is_active)
            .ok_or_else(|| {
                ServiceError::InvalidInput(format!("Product {} is not available", product_id))
            })?;

        let variant = match variant_id {
            None => None,
            Some(variant_id) => Some(
                self.variants
                    .get(&variant_id)
                    .filter(|variant| variant.is_active && variant.product_id == product.id)
                    .ok_or_else(|| {
                        ServiceError::InvalidInput(format!(
                            "Variant {} is not available for {}",
                            variant_id, product.name
                        ))
                    })?,
            ),
        };

        Ok(CatalogEntry { product, variant })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn snapshot() -> (CatalogSnapshot, Uuid, Uuid) {
        let now = Utc::now();
        let product = product::Model {
            id: Uuid::new_v4(),
            name: "Meeting room".into(),
            price: dec!(150000),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let variant = product_variant::Model {
            id: Uuid::new_v4(),
            product_id: product.id,
            name: "4 hours".into(),
            price: Some(dec!(400000)),
            stock_quantity: 1,
            manage_stock: true,
            duration_hours: Some(4),
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        let (pid, vid) = (product.id, variant.id);
        let snapshot = CatalogSnapshot {
            products: [(product.id, product)].into_iter().collect(),
            variants: [(variant.id, variant)].into_iter().collect(),
        };
        (snapshot, pid, vid)
    }

    #[test]
    fn variant_price_overrides_product_price() {
        let (snapshot, pid, vid) = snapshot();
        assert_eq!(snapshot.resolve(pid, Some(vid)).unwrap().unit_price(), dec!(400000));
        assert_eq!(snapshot.resolve(pid, None).unwrap().unit_price(), dec!(150000));
        assert_eq!(snapshot.resolve(pid, Some(vid)).unwrap().duration_hours(), Some(4));
    }

    #[test]
    fn unknown_or_foreign_variants_are_rejected() {
        let (mut snapshot, pid, vid) = snapshot();
        assert!(snapshot.resolve(Uuid::new_v4(), None).is_err());
        assert!(snapshot.resolve(pid, Some(Uuid::new_v4())).is_err());

        if let Some(variant) = snapshot.variants.get_mut(&vid) {
            variant.product_id = Uuid::new_v4();
        }
        assert!(snapshot.resolve(pid, Some(vid)).is_err());
    }

    #[test]
    fn inactive_products_are_rejected() {
        let (mut snapshot, pid, _) = snapshot();
        if let Some(product) = snapshot.products.get_mut(&pid) {
            product.is_active = false;
        }
        assert!(matches!(
            snapshot.resolve(pid, None),
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
