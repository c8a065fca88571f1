//! sea-orm entities for the order engine.
//!
//! `product` and `product_variant` belong to the catalog; the engine only reads
//! them and moves `product_variant.stock_quantity` through guarded updates.

pub mod discount;
pub mod discount_product;
pub mod discount_user;
pub mod order;
pub mod order_item;
pub mod payment_notification;
pub mod product;
pub mod product_variant;

pub use discount::Entity as Discount;
pub use order::Entity as Order;
pub use order_item::Entity as OrderItem;
pub use product::Entity as Product;
pub use product_variant::Entity as ProductVariant;
