//! Storefront order engine
//!
//! Checkout, discount redemption, stock reservation and payment
//! reconciliation for a storefront that sells both goods and time-boxed
//! bookings.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod migrator;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::PaymentGateway;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub config: config::AppConfig,
    pub event_sender: EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DbPool>,
        config: config::AppConfig,
        event_sender: EventSender,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services = handlers::AppServices::new(db.clone(), &config, event_sender.clone(), gateway);
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Option<Vec<String>>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .merge(handlers::checkout::checkout_routes())
        .merge(handlers::orders::order_routes())
        // Gateway notifications are authenticated by signature, not by caller
        .merge(handlers::payment_webhooks::payment_routes())
}

/// Full application router: health checks, metrics and the versioned API.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.config.request_timeout_secs);

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::health::metrics_handler))
        .nest("/api/v1", api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

pub mod prelude {
    pub use crate::errors::*;
    pub use crate::events::{Event, EventSender};
    pub use crate::gateway::{GatewayStatus, PaymentGateway};
    pub use crate::services::checkout::{CheckoutRequest, CheckoutService};
    pub use crate::services::order_lifecycle::{GatewayEffect, OrderAggregate};
    pub use crate::services::orders::OrderService;
    pub use crate::services::payment_reconciliation::PaymentReconciliationService;
}

#[cfg(test)]
mod response_tests {
    use super::*;
    use chrono::DateTime;

    #[test]
    fn success_response_carries_data_and_timestamp() {
        let response = ApiResponse::success("ok");
        assert!(response.success);
        assert_eq!(response.data, Some("ok"));
        assert!(response.message.is_none());
        DateTime::parse_from_rfc3339(&response.timestamp).expect("timestamp should parse");
    }

    #[test]
    fn error_response_has_no_data() {
        let response = ApiResponse::<()>::error("oops".into());
        assert!(!response.success);
        assert!(response.data.is_none());
        assert_eq!(response.message.as_deref(), Some("oops"));
    }
}
