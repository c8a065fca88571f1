//! Integration tests for checkout: pricing, discounts, stock reservation and
//! the all-or-nothing guarantee.

mod common;

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use common::{DiscountSeed, TestApp, VariantSeed};
use rust_decimal_macros::dec;
use storefront_orders::entities::order::{OrderStatus, PaymentStatus};
use storefront_orders::errors::{DiscountError, ServiceError};
use storefront_orders::services::checkout::{CartItem, DiscountPreviewRequest};
use storefront_orders::services::order_number::OrderNumberGenerator;

#[tokio::test]
async fn percentage_discount_is_capped_and_stock_reserved() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Hot desk day pass", dec!(500000), 5).await;
    let promo = app
        .seed_discount(DiscountSeed {
            max_discount: Some(dec!(50000)),
            ..DiscountSeed::percentage("HEMAT10", dec!(10))
        })
        .await;

    let receipt = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 2)], Some("HEMAT10")))
        .await
        .expect("checkout succeeds");

    let order = &receipt.order.order;
    assert_eq!(order.subtotal, dec!(1000000));
    assert_eq!(order.discount_amount, dec!(50000));
    assert_eq!(order.total, dec!(950000));
    assert_eq!(order.discount_id, Some(promo.id));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.payment_status, PaymentStatus::Unpaid);
    assert!(order.order_number.starts_with("ORD-"));

    assert_eq!(receipt.order.items.len(), 1);
    assert!(receipt.order.items[0].stock_reduced);
    assert!(!receipt.order.items[0].stock_restored);
    assert_eq!(receipt.order.items[0].subtotal, dec!(1000000));

    assert_eq!(app.stock(variant.id).await, 3);
    assert_eq!(app.usage_count(promo.id).await, 1);

    let session = receipt.payment_session.expect("gateway session");
    assert_eq!(order.payment_session_token.as_deref(), Some(session.session_token.as_str()));

    let events = app.event_names().await;
    assert!(events.contains(&"order_created"));
    assert!(events.contains(&"inventory_reserved"));
    assert!(events.contains(&"discount_redeemed"));
}

#[tokio::test]
async fn fixed_discount_never_exceeds_subtotal() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Printing credit", dec!(150000), 10).await;
    app.seed_discount(DiscountSeed::fixed("BIGFIX", dec!(200000)))
        .await;

    let receipt = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], Some("BIGFIX")))
        .await
        .expect("checkout succeeds");

    assert_eq!(receipt.order.order.discount_amount, dec!(150000));
    assert_eq!(receipt.order.order.total, dec!(0));
}

#[tokio::test]
async fn insufficient_stock_leaves_no_trace() {
    let app = TestApp::new().await;
    let (_, plenty) = app.seed_stocked("Locker", dec!(100000), 5).await;
    let (_, scarce) = app.seed_stocked("Private booth", dec!(250000), 1).await;
    let promo = app
        .seed_discount(DiscountSeed::percentage("ALL5", dec!(5)))
        .await;

    let result = app
        .services
        .checkout
        .checkout(TestApp::cart(
            vec![TestApp::line(&plenty, 1), TestApp::line(&scarce, 2)],
            Some("ALL5"),
        ))
        .await;

    assert_matches!(result, Err(ServiceError::InsufficientStock(name)) if name.contains("Private booth"));
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.item_count().await, 0);
    assert_eq!(app.stock(plenty.id).await, 5);
    assert_eq!(app.stock(scarce.id).await, 1);
    assert_eq!(app.usage_count(promo.id).await, 0);
}

#[tokio::test]
async fn gateway_outage_does_not_fail_checkout() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Meeting room", dec!(300000), 2).await;
    app.gateway.set_unavailable(true);

    let receipt = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], None))
        .await
        .expect("checkout survives gateway outage");

    assert!(receipt.payment_session.is_none());
    assert!(receipt.order.order.payment_session_token.is_none());
    assert_eq!(receipt.order.payment_status(), PaymentStatus::Unpaid);

    let stored = app.services.orders.get(receipt.order.id()).await.unwrap();
    assert_eq!(stored.status(), OrderStatus::Pending);
    assert_eq!(app.stock(variant.id).await, 1);
}

#[tokio::test]
async fn rejected_discount_fails_the_whole_checkout() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Day pass", dec!(100000), 5).await;
    app.seed_discount(DiscountSeed {
        end_date: Some(Utc::now() - Duration::days(1)),
        ..DiscountSeed::percentage("OLDPROMO", dec!(20))
    })
    .await;
    app.seed_discount(DiscountSeed {
        min_purchase: Some(dec!(1000000)),
        ..DiscountSeed::percentage("BIGSPENDER", dec!(20))
    })
    .await;

    let expired = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], Some("OLDPROMO")))
        .await;
    assert_matches!(expired, Err(ServiceError::Discount(DiscountError::Expired)));

    let below_minimum = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], Some("BIGSPENDER")))
        .await;
    assert_matches!(
        below_minimum,
        Err(ServiceError::Discount(DiscountError::BelowMinimumPurchase))
    );

    let unknown = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], Some("NOPE")))
        .await;
    assert_matches!(unknown, Err(ServiceError::Discount(DiscountError::NotFound)));

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.stock(variant.id).await, 5);
}

#[tokio::test]
async fn usage_limit_is_enforced_across_orders() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Day pass", dec!(100000), 10).await;
    let promo = app
        .seed_discount(DiscountSeed {
            usage_limit: Some(1),
            ..DiscountSeed::fixed("ONCE", dec!(10000))
        })
        .await;

    app.services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], Some("ONCE")))
        .await
        .expect("first redemption");

    let second = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], Some("ONCE")))
        .await;

    assert_matches!(
        second,
        Err(ServiceError::Discount(DiscountError::UsageLimitReached))
    );
    assert_eq!(app.usage_count(promo.id).await, 1);
    assert_eq!(app.stock(variant.id).await, 9);
}

#[tokio::test]
async fn concurrent_checkouts_never_overspend_stock_or_discount() {
    let app = TestApp::on_disk().await;
    let (_, variant) = app.seed_stocked("Event ticket", dec!(75000), 5).await;
    let promo = app
        .seed_discount(DiscountSeed {
            usage_limit: Some(3),
            ..DiscountSeed::fixed("EARLY", dec!(5000))
        })
        .await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let checkout = app.services.checkout.clone();
        let request = TestApp::cart(vec![TestApp::line(&variant, 1)], Some("EARLY"));
        handles.push(tokio::spawn(async move { checkout.checkout(request).await }));
    }

    let mut placed = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(e) => assert!(
                matches!(e, ServiceError::Discount(DiscountError::UsageLimitReached)),
                "unexpected error: {e}"
            ),
        }
    }

    assert_eq!(placed, 3);
    assert_eq!(app.usage_count(promo.id).await, 3);
    assert_eq!(app.stock(variant.id).await, 2);
}

#[tokio::test]
async fn concurrent_checkouts_stop_at_zero_stock() {
    let app = TestApp::on_disk().await;
    let (_, variant) = app.seed_stocked("Last seats", dec!(50000), 5).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let checkout = app.services.checkout.clone();
        let request = TestApp::cart(vec![TestApp::line(&variant, 1)], None);
        handles.push(tokio::spawn(async move { checkout.checkout(request).await }));
    }

    let mut placed = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(ServiceError::InsufficientStock(_)) => sold_out += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(sold_out, 3);
    assert_eq!(app.stock(variant.id).await, 0);
    assert_eq!(app.order_count().await, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversubscribed_checkouts_are_sold_out_not_failed() {
    let app = TestApp::on_disk().await;
    let (_, variant) = app.seed_stocked("Workshop seat", dec!(150000), 5).await;

    let mut handles = Vec::new();
    for _ in 0..12 {
        let checkout = app.services.checkout.clone();
        let request = TestApp::cart(vec![TestApp::line(&variant, 1)], None);
        handles.push(tokio::spawn(async move { checkout.checkout(request).await }));
    }

    let mut placed = 0;
    let mut sold_out = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => placed += 1,
            Err(ServiceError::InsufficientStock(_)) => sold_out += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(placed, 5);
    assert_eq!(sold_out, 7);
    assert_eq!(app.stock(variant.id).await, 0);
    assert_eq!(app.order_count().await, 5);
}

#[tokio::test]
async fn unmanaged_variants_never_touch_stock() {
    let app = TestApp::new().await;
    let product = app.seed_product("Virtual office", dec!(1200000)).await;
    let variant = app
        .seed_variant(
            &product,
            VariantSeed {
                name: "12 months",
                stock: 0,
                manage_stock: false,
                ..VariantSeed::default()
            },
        )
        .await;

    let receipt = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 3)], None))
        .await
        .expect("unlimited variant");

    assert!(!receipt.order.items[0].stock_reduced);
    assert_eq!(app.stock(variant.id).await, 0);

    let cancelled = app
        .services
        .orders
        .cancel_order(receipt.order.id(), Default::default())
        .await
        .unwrap();
    assert!(!cancelled.items[0].stock_restored);
    assert_eq!(app.stock(variant.id).await, 0);
}

#[tokio::test]
async fn catalog_prices_win_over_anything_the_client_sends() {
    let app = TestApp::new().await;
    let product = app.seed_product("Meeting room", dec!(150000)).await;
    let variant = app
        .seed_variant(
            &product,
            VariantSeed {
                name: "Half day",
                price: Some(dec!(400000)),
                ..VariantSeed::default()
            },
        )
        .await;
    let no_variant = CartItem {
        product_id: product.id,
        variant_id: None,
        quantity: 2,
        custom_options: Some(serde_json::json!({"projector": true})),
        booking_start_at: None,
        booking_end_at: None,
    };

    let receipt = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1), no_variant], None))
        .await
        .unwrap();

    let items = &receipt.order.items;
    assert_eq!(items[0].price, dec!(400000));
    assert_eq!(items[0].variant_name.as_deref(), Some("Half day"));
    assert_eq!(items[1].price, dec!(150000));
    assert_eq!(items[1].subtotal, dec!(300000));
    assert_eq!(items[1].custom_options, Some(serde_json::json!({"projector": true})));
    assert_eq!(receipt.order.order.total, dec!(700000));
}

#[tokio::test]
async fn bookable_variants_derive_the_end_of_the_window() {
    let app = TestApp::new().await;
    let product = app.seed_product("Meeting room", dec!(150000)).await;
    let variant = app
        .seed_variant(
            &product,
            VariantSeed {
                name: "4 hours",
                duration_hours: Some(4),
                stock: 1,
                ..VariantSeed::default()
            },
        )
        .await;

    let start: DateTime<Utc> = Utc::now() + Duration::days(1);
    let mut line = TestApp::line(&variant, 1);
    line.booking_start_at = Some(start);
    line.booking_end_at = Some(start + Duration::hours(10));

    let receipt = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![line], None))
        .await
        .unwrap();
    let item = &receipt.order.items[0];
    assert_eq!(item.booking_end_at, item.booking_start_at.map(|s| s + Duration::hours(4)));

    let missing_start = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 1)], None))
        .await;
    assert_matches!(missing_start, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn invalid_requests_are_rejected_before_anything_is_written() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Day pass", dec!(100000), 5).await;

    let empty = app
        .services
        .checkout
        .checkout(TestApp::cart(Vec::new(), None))
        .await;
    assert_matches!(empty, Err(ServiceError::ValidationError(_)));

    let mut bad_email = TestApp::cart(vec![TestApp::line(&variant, 1)], None);
    bad_email.customer.email = "not-an-email".into();
    assert_matches!(
        app.services.checkout.checkout(bad_email).await,
        Err(ServiceError::ValidationError(_))
    );

    let zero = app
        .services
        .checkout
        .checkout(TestApp::cart(vec![TestApp::line(&variant, 0)], None))
        .await;
    assert_matches!(zero, Err(ServiceError::ValidationError(_)));

    assert_eq!(app.order_count().await, 0);
}

/// Hands out a scripted list of numbers.
struct ScriptedNumbers(Mutex<VecDeque<String>>);

impl OrderNumberGenerator for ScriptedNumbers {
    fn generate(&self, _now: DateTime<Utc>) -> String {
        self.0
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| "ORD-20240601-FALLBACK".to_string())
    }
}

#[tokio::test]
async fn order_number_collisions_are_retried() {
    let script = ["ORD-20240601-AAAAAAAA", "ORD-20240601-AAAAAAAA", "ORD-20240601-BBBBBBBB"]
        .into_iter()
        .map(String::from)
        .collect();
    let app = TestApp::with_order_numbers(Arc::new(ScriptedNumbers(Mutex::new(script)))).await;
    let (_, variant) = app.seed_stocked("Day pass", dec!(100000), 5).await;

    let first = app.place(&variant, 1).await;
    let second = app.place(&variant, 1).await;

    assert_eq!(first.order.order_number, "ORD-20240601-AAAAAAAA");
    assert_eq!(second.order.order_number, "ORD-20240601-BBBBBBBB");
    assert_eq!(app.stock(variant.id).await, 3);
}

#[tokio::test]
async fn discount_preview_does_not_redeem() {
    let app = TestApp::new().await;
    let (_, variant) = app.seed_stocked("Day pass", dec!(200000), 5).await;
    let promo = app
        .seed_discount(DiscountSeed::percentage("PREVIEW15", dec!(15)))
        .await;

    let preview = app
        .services
        .checkout
        .preview_discount(DiscountPreviewRequest {
            items: vec![TestApp::line(&variant, 2)],
            discount_code: " PREVIEW15 ".into(),
            user_id: None,
        })
        .await
        .unwrap();

    assert_eq!(preview.subtotal, dec!(400000));
    assert_eq!(preview.discount.amount, dec!(60000));
    assert_eq!(preview.total, dec!(340000));
    assert_eq!(app.usage_count(promo.id).await, 0);
    assert_eq!(app.stock(variant.id).await, 5);
}
