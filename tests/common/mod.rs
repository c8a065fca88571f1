#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde_json::Value;
use storefront_orders::{
    config::AppConfig,
    db::{self, DbPool},
    entities::{discount, discount_product, discount_user, order, order_item, payment_notification, product, product_variant},
    events::{Event, EventSender},
    gateway::{MockPaymentGateway, NotificationSignature, PaymentGateway, WebhookVerifier},
    handlers::AppServices,
    services::{
        checkout::{CartItem, CheckoutRequest, CustomerDetails},
        order_lifecycle::OrderAggregate,
        order_number::OrderNumberGenerator,
    },
    AppState,
};
use tower::ServiceExt;
use uuid::Uuid;

pub const WEBHOOK_SECRET: &str = "test_webhook_secret_for_integration";

/// SQLite database plus every service, wired the way the binary does it.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub config: AppConfig,
    pub gateway: Arc<MockPaymentGateway>,
    pub services: AppServices,
    pub event_sender: EventSender,
    events: Arc<Mutex<Vec<Event>>>,
    _event_task: tokio::task::JoinHandle<()>,
    _data_dir: Option<tempfile::TempDir>,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None, None).await
    }

    pub async fn with_order_numbers(order_numbers: Arc<dyn OrderNumberGenerator>) -> Self {
        Self::build(Some(order_numbers), None).await
    }

    /// File-backed database configured with the shipped pool size, so
    /// concurrent callers go through the same pool setup as the binary.
    pub async fn on_disk() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        Self::build(None, Some(dir)).await
    }

    async fn build(
        order_numbers: Option<Arc<dyn OrderNumberGenerator>>,
        data_dir: Option<tempfile::TempDir>,
    ) -> Self {
        let database_url = match &data_dir {
            Some(dir) => format!("sqlite://{}?mode=rwc", dir.path().join("orders.db").display()),
            None => "sqlite::memory:".to_string(),
        };
        let mut cfg = AppConfig::new(
            database_url,
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
            WEBHOOK_SECRET.to_string(),
        );
        if data_dir.is_some() {
            cfg.db_max_connections = 16;
            cfg.db_min_connections = 2;
        } else {
            // one connection keeps the in-memory database alive and shared
            cfg.db_max_connections = 1;
            cfg.db_min_connections = 1;
        }

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let (event_sender, mut rx) = EventSender::channel(256);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let event_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                sink.lock().unwrap().push(event);
            }
        });

        let gateway = Arc::new(MockPaymentGateway::new(WebhookVerifier::new(
            WEBHOOK_SECRET,
            cfg.payment_webhook_tolerance_secs,
        )));
        let shared: Arc<dyn PaymentGateway> = gateway.clone();

        let services = match order_numbers {
            Some(generator) => AppServices::with_order_numbers(
                db.clone(),
                &cfg,
                event_sender.clone(),
                shared,
                generator,
            ),
            None => AppServices::new(db.clone(), &cfg, event_sender.clone(), shared),
        };

        Self {
            db,
            config: cfg,
            gateway,
            services,
            event_sender,
            events,
            _event_task: event_task,
            _data_dir: data_dir,
        }
    }

    pub fn state(&self) -> AppState {
        AppState {
            db: self.db.clone(),
            config: self.config.clone(),
            event_sender: self.event_sender.clone(),
            services: self.services.clone(),
        }
    }

    pub fn router(&self) -> Router {
        storefront_orders::build_router(self.state())
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        self.router().oneshot(request).await.expect("router response")
    }

    /// Names of the domain events published so far.
    pub async fn event_names(&self) -> Vec<&'static str> {
        // let the sink catch up with anything already sent
        tokio::task::yield_now().await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        self.events.lock().unwrap().iter().map(Event::name).collect()
    }

    // ----- seeding -----

    pub async fn seed_product(&self, name: &str, price: Decimal) -> product::Model {
        let now = Utc::now();
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            price: Set(price),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert product")
    }

    pub async fn seed_variant(&self, product: &product::Model, seed: VariantSeed) -> product_variant::Model {
        let now = Utc::now();
        product_variant::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(product.id),
            name: Set(seed.name.to_string()),
            price: Set(seed.price),
            stock_quantity: Set(seed.stock),
            manage_stock: Set(seed.manage_stock),
            duration_hours: Set(seed.duration_hours),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert variant")
    }

    /// Product with one stock-managed variant priced at `price`.
    pub async fn seed_stocked(&self, name: &str, price: Decimal, stock: i32) -> (product::Model, product_variant::Model) {
        let product = self.seed_product(name, price).await;
        let variant = self
            .seed_variant(
                &product,
                VariantSeed {
                    stock,
                    ..VariantSeed::default()
                },
            )
            .await;
        (product, variant)
    }

    pub async fn seed_discount(&self, seed: DiscountSeed) -> discount::Model {
        let now = Utc::now();
        let model = discount::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(seed.code.to_string()),
            name: Set(format!("{} promo", seed.code)),
            kind: Set(seed.kind),
            value: Set(seed.value),
            min_purchase: Set(seed.min_purchase),
            max_discount: Set(seed.max_discount),
            usage_limit: Set(seed.usage_limit),
            usage_count: Set(0),
            start_date: Set(seed.start_date),
            end_date: Set(seed.end_date),
            is_active: Set(seed.is_active),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("insert discount");

        for product_id in seed.product_ids {
            discount_product::ActiveModel {
                discount_id: Set(model.id),
                product_id: Set(product_id),
            }
            .insert(&*self.db)
            .await
            .expect("insert discount product");
        }
        for user_id in seed.user_ids {
            discount_user::ActiveModel {
                discount_id: Set(model.id),
                user_id: Set(user_id),
            }
            .insert(&*self.db)
            .await
            .expect("insert discount user");
        }
        model
    }

    // ----- checkout helpers -----

    pub fn customer() -> CustomerDetails {
        CustomerDetails {
            name: "Sari Wulandari".into(),
            email: "sari@example.test".into(),
            phone: Some("081234567890".into()),
        }
    }

    pub fn line(variant: &product_variant::Model, quantity: i32) -> CartItem {
        CartItem {
            product_id: variant.product_id,
            variant_id: Some(variant.id),
            quantity,
            custom_options: None,
            booking_start_at: None,
            booking_end_at: None,
        }
    }

    pub fn cart(items: Vec<CartItem>, discount_code: Option<&str>) -> CheckoutRequest {
        CheckoutRequest {
            customer: Self::customer(),
            items,
            discount_code: discount_code.map(str::to_string),
            user_id: None,
            notes: None,
        }
    }

    /// Places an order for `quantity` units of `variant`.
    pub async fn place(&self, variant: &product_variant::Model, quantity: i32) -> OrderAggregate {
        self.services
            .checkout
            .checkout(Self::cart(vec![Self::line(variant, quantity)], None))
            .await
            .expect("checkout")
            .order
    }

    // ----- gateway helpers -----

    /// Signed notification body for an order.
    pub fn notification(
        &self,
        order: &OrderAggregate,
        transaction_status: &str,
        transaction_id: &str,
    ) -> (Vec<u8>, NotificationSignature) {
        let body = serde_json::json!({
            "order_id": order.order.order_number,
            "transaction_status": transaction_status,
            "transaction_id": transaction_id,
            "gross_amount": order.order.total.to_string(),
        });
        self.sign(body)
    }

    pub fn sign(&self, body: Value) -> (Vec<u8>, NotificationSignature) {
        let raw = serde_json::to_vec(&body).expect("serialize notification");
        let signature = self.gateway.sign(&raw).expect("sign notification");
        (raw, signature)
    }

    // ----- read-back -----

    pub async fn stock(&self, variant_id: Uuid) -> i32 {
        product_variant::Entity::find_by_id(variant_id)
            .one(&*self.db)
            .await
            .expect("load variant")
            .expect("variant exists")
            .stock_quantity
    }

    pub async fn usage_count(&self, discount_id: Uuid) -> i32 {
        discount::Entity::find_by_id(discount_id)
            .one(&*self.db)
            .await
            .expect("load discount")
            .expect("discount exists")
            .usage_count
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find().count(&*self.db).await.expect("count orders")
    }

    pub async fn item_count(&self) -> u64 {
        order_item::Entity::find().count(&*self.db).await.expect("count items")
    }

    pub async fn notifications(&self, order_id: Uuid) -> Vec<payment_notification::Model> {
        payment_notification::Entity::find()
            .filter(payment_notification::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .expect("load notifications")
    }
}

pub struct VariantSeed {
    pub name: &'static str,
    pub price: Option<Decimal>,
    pub stock: i32,
    pub manage_stock: bool,
    pub duration_hours: Option<i32>,
}

impl Default for VariantSeed {
    fn default() -> Self {
        Self {
            name: "Standard",
            price: None,
            stock: 10,
            manage_stock: true,
            duration_hours: None,
        }
    }
}

pub struct DiscountSeed {
    pub code: &'static str,
    pub kind: discount::DiscountKind,
    pub value: Decimal,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub usage_limit: Option<i32>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub product_ids: Vec<Uuid>,
    pub user_ids: Vec<Uuid>,
}

impl DiscountSeed {
    pub fn percentage(code: &'static str, value: Decimal) -> Self {
        Self {
            code,
            kind: discount::DiscountKind::Percentage,
            value,
            min_purchase: None,
            max_discount: None,
            usage_limit: None,
            start_date: None,
            end_date: None,
            is_active: true,
            product_ids: Vec::new(),
            user_ids: Vec::new(),
        }
    }

    pub fn fixed(code: &'static str, value: Decimal) -> Self {
        Self {
            kind: discount::DiscountKind::Fixed,
            ..Self::percentage(code, value)
        }
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
