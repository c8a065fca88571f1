#![allow(elided_lifetimes_in_paths)]

use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240601_000001_create_catalog_tables::Migration),
            Box::new(m20240601_000002_create_discount_tables::Migration),
            Box::new(m20240601_000003_create_order_tables::Migration),
            Box::new(m20240601_000004_create_payment_notifications_table::Migration),
        ]
    }
}

mod m20240601_000001_create_catalog_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000001_create_catalog_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            // Catalog tables are owned by the storefront; the order engine only
            // needs the columns it reads plus the stock counter it moves.
            manager
                .create_table(
                    Table::create()
                        .table(Products::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Products::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Products::Name).string().not_null())
                        .col(ColumnDef::new(Products::Price).decimal().not_null())
                        .col(
                            ColumnDef::new(Products::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Products::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Products::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ProductVariants::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ProductVariants::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ProductVariants::ProductId).uuid().not_null())
                        .col(ColumnDef::new(ProductVariants::Name).string().not_null())
                        .col(ColumnDef::new(ProductVariants::Price).decimal().null())
                        .col(
                            ColumnDef::new(ProductVariants::StockQuantity)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::ManageStock)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(ColumnDef::new(ProductVariants::DurationHours).integer().null())
                        .col(
                            ColumnDef::new(ProductVariants::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ProductVariants::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_product_variants_product_id")
                                .from(ProductVariants::Table, ProductVariants::ProductId)
                                .to(Products::Table, Products::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_product_variants_product_id")
                        .table(ProductVariants::Table)
                        .col(ProductVariants::ProductId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ProductVariants::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Products::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Products {
        Table,
        Id,
        Name,
        Price,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ProductVariants {
        Table,
        Id,
        ProductId,
        Name,
        Price,
        StockQuantity,
        ManageStock,
        DurationHours,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000002_create_discount_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000002_create_discount_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Discounts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Discounts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Discounts::Code).string().not_null().unique_key())
                        .col(ColumnDef::new(Discounts::Name).string().not_null())
                        .col(ColumnDef::new(Discounts::Kind).string_len(16).not_null())
                        .col(ColumnDef::new(Discounts::Value).decimal().not_null())
                        .col(ColumnDef::new(Discounts::MinPurchase).decimal().null())
                        .col(ColumnDef::new(Discounts::MaxDiscount).decimal().null())
                        .col(ColumnDef::new(Discounts::UsageLimit).integer().null())
                        .col(
                            ColumnDef::new(Discounts::UsageCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Discounts::StartDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Discounts::EndDate)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Discounts::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Discounts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Discounts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DiscountProducts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(DiscountProducts::DiscountId).uuid().not_null())
                        .col(ColumnDef::new(DiscountProducts::ProductId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(DiscountProducts::DiscountId)
                                .col(DiscountProducts::ProductId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_discount_products_discount_id")
                                .from(DiscountProducts::Table, DiscountProducts::DiscountId)
                                .to(Discounts::Table, Discounts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(DiscountUsers::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(DiscountUsers::DiscountId).uuid().not_null())
                        .col(ColumnDef::new(DiscountUsers::UserId).uuid().not_null())
                        .primary_key(
                            Index::create()
                                .col(DiscountUsers::DiscountId)
                                .col(DiscountUsers::UserId),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_discount_users_discount_id")
                                .from(DiscountUsers::Table, DiscountUsers::DiscountId)
                                .to(Discounts::Table, Discounts::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(DiscountUsers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(DiscountProducts::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Discounts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Discounts {
        Table,
        Id,
        Code,
        Name,
        Kind,
        Value,
        MinPurchase,
        MaxDiscount,
        UsageLimit,
        UsageCount,
        StartDate,
        EndDate,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    enum DiscountProducts {
        Table,
        DiscountId,
        ProductId,
    }

    #[derive(DeriveIden)]
    enum DiscountUsers {
        Table,
        DiscountId,
        UserId,
    }
}

mod m20240601_000003_create_order_tables {
    use sea_orm_migration::prelude::*;

    use super::m20240601_000001_create_catalog_tables::ProductVariants;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000003_create_order_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Orders::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Orders::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Orders::OrderNumber)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Orders::UserId).uuid().null())
                        .col(ColumnDef::new(Orders::CustomerName).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerEmail).string().not_null())
                        .col(ColumnDef::new(Orders::CustomerPhone).string().null())
                        .col(ColumnDef::new(Orders::Subtotal).decimal().not_null())
                        .col(ColumnDef::new(Orders::DiscountId).uuid().null())
                        .col(ColumnDef::new(Orders::DiscountCode).string().null())
                        .col(
                            ColumnDef::new(Orders::DiscountAmount)
                                .decimal()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Orders::Total).decimal().not_null())
                        .col(ColumnDef::new(Orders::Currency).string_len(3).not_null())
                        .col(ColumnDef::new(Orders::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::PaymentStatus).string_len(32).not_null())
                        .col(ColumnDef::new(Orders::PaymentMethod).string().null())
                        .col(ColumnDef::new(Orders::PaymentProof).string().null())
                        .col(ColumnDef::new(Orders::PaymentSessionToken).string().null())
                        .col(ColumnDef::new(Orders::VerificationNote).string().null())
                        .col(ColumnDef::new(Orders::GatewayStatus).string().null())
                        .col(ColumnDef::new(Orders::GatewayEventHash).string().null())
                        .col(ColumnDef::new(Orders::CancellationReason).string().null())
                        .col(
                            ColumnDef::new(Orders::PaidAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CancelledAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Orders::CompletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(ColumnDef::new(Orders::Notes).text().null())
                        .col(
                            ColumnDef::new(Orders::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Orders::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_orders_status")
                        .table(Orders::Table)
                        .col(Orders::Status)
                        .col(Orders::PaymentStatus)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(OrderItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(OrderItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(OrderItems::OrderId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::Position).integer().not_null())
                        .col(ColumnDef::new(OrderItems::ProductId).uuid().not_null())
                        .col(ColumnDef::new(OrderItems::VariantId).uuid().null())
                        .col(ColumnDef::new(OrderItems::ProductName).string().not_null())
                        .col(ColumnDef::new(OrderItems::VariantName).string().null())
                        .col(ColumnDef::new(OrderItems::Price).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::Quantity).integer().not_null())
                        .col(ColumnDef::new(OrderItems::Subtotal).decimal().not_null())
                        .col(ColumnDef::new(OrderItems::CustomOptions).json().null())
                        .col(
                            ColumnDef::new(OrderItems::BookingStartAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::BookingEndAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::StockReduced)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(OrderItems::StockRestored)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(
                            ColumnDef::new(OrderItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(OrderItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_order_id")
                                .from(OrderItems::Table, OrderItems::OrderId)
                                .to(Orders::Table, Orders::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_order_items_variant_id")
                                .from(OrderItems::Table, OrderItems::VariantId)
                                .to(ProductVariants::Table, ProductVariants::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_order_items_order_id")
                        .table(OrderItems::Table)
                        .col(OrderItems::OrderId)
                        .col(OrderItems::Position)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(OrderItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Orders::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Orders {
        Table,
        Id,
        OrderNumber,
        UserId,
        CustomerName,
        CustomerEmail,
        CustomerPhone,
        Subtotal,
        DiscountId,
        DiscountCode,
        DiscountAmount,
        Total,
        Currency,
        Status,
        PaymentStatus,
        PaymentMethod,
        PaymentProof,
        PaymentSessionToken,
        VerificationNote,
        GatewayStatus,
        GatewayEventHash,
        CancellationReason,
        PaidAt,
        CancelledAt,
        CompletedAt,
        Notes,
        CreatedAt,
        UpdatedAt,
        Version,
    }

    #[derive(DeriveIden)]
    enum OrderItems {
        Table,
        Id,
        OrderId,
        Position,
        ProductId,
        VariantId,
        ProductName,
        VariantName,
        Price,
        Quantity,
        Subtotal,
        CustomOptions,
        BookingStartAt,
        BookingEndAt,
        StockReduced,
        StockRestored,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240601_000004_create_payment_notifications_table {
    use sea_orm_migration::prelude::*;

    use super::m20240601_000003_create_order_tables::Orders;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240601_000004_create_payment_notifications_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(PaymentNotifications::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PaymentNotifications::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PaymentNotifications::OrderId).uuid().not_null())
                        .col(
                            ColumnDef::new(PaymentNotifications::EventHash)
                                .string_len(64)
                                .not_null()
                                .unique_key(),
                        )
                        .col(
                            ColumnDef::new(PaymentNotifications::GatewayStatus)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PaymentNotifications::TransactionId)
                                .string()
                                .null(),
                        )
                        .col(ColumnDef::new(PaymentNotifications::Effect).string().not_null())
                        .col(
                            ColumnDef::new(PaymentNotifications::ReceivedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payment_notifications_order_id")
                                .from(PaymentNotifications::Table, PaymentNotifications::OrderId)
                                .to(Orders::Table, Orders::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_payment_notifications_order_id")
                        .table(PaymentNotifications::Table)
                        .col(PaymentNotifications::OrderId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PaymentNotifications::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum PaymentNotifications {
        Table,
        Id,
        OrderId,
        EventHash,
        GatewayStatus,
        TransactionId,
        Effect,
        ReceivedAt,
    }
}
