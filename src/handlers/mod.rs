pub mod checkout;
pub mod health;
pub mod orders;
pub mod payment_webhooks;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;
use crate::services::checkout::{CheckoutService, CheckoutSettings};
use crate::services::discounts::DiscountService;
use crate::services::order_number::{OrderNumberGenerator, RandomOrderNumberGenerator};
use crate::services::orders::{OrderLocks, OrderService};
use crate::services::payment_reconciliation::PaymentReconciliationService;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentReconciliationService>,
}

impl AppServices {
    /// Wires every service around one shared set of per-order locks, so
    /// checkout, admin actions and gateway notifications serialise together.
    pub fn new(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let order_numbers: Arc<dyn OrderNumberGenerator> = Arc::new(
            RandomOrderNumberGenerator::new(config.order_number_prefix.clone()),
        );
        Self::with_order_numbers(db_pool, config, event_sender, gateway, order_numbers)
    }

    pub fn with_order_numbers(
        db_pool: Arc<DbPool>,
        config: &AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
        order_numbers: Arc<dyn OrderNumberGenerator>,
    ) -> Self {
        let orders = OrderService::new(db_pool.clone(), event_sender.clone(), OrderLocks::new());
        let discounts = DiscountService::new(db_pool.clone());

        let checkout = CheckoutService::new(
            db_pool,
            discounts,
            orders.clone(),
            gateway.clone(),
            order_numbers,
            event_sender.clone(),
            CheckoutSettings {
                currency: config.currency.clone(),
                order_number_max_attempts: config.order_number_max_attempts,
            },
        );
        let payments = PaymentReconciliationService::new(orders.clone(), gateway, event_sender);

        Self {
            checkout: Arc::new(checkout),
            orders: Arc::new(orders),
            payments: Arc::new(payments),
        }
    }
}
