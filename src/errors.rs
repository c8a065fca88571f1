use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Body rendered for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Machine-readable error code (e.g., "insufficient_stock", "discount_expired")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// ISO 8601 timestamp when error occurred
    pub timestamp: String,
}

/// Why a discount code could not be applied to an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountError {
    #[error("discount code does not exist")]
    NotFound,
    #[error("discount is not active")]
    Inactive,
    #[error("discount is not valid yet")]
    NotYetStarted,
    #[error("discount has expired")]
    Expired,
    #[error("discount usage limit has been reached")]
    UsageLimitReached,
    #[error("order subtotal is below the minimum purchase for this discount")]
    BelowMinimumPurchase,
    #[error("discount does not apply to any product in the cart")]
    ProductNotEligible,
    #[error("discount is not available for this customer")]
    UserNotEligible,
}

impl DiscountError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "discount_not_found",
            Self::Inactive => "discount_inactive",
            Self::NotYetStarted => "discount_not_yet_started",
            Self::Expired => "discount_expired",
            Self::UsageLimitReached => "discount_usage_limit_reached",
            Self::BelowMinimumPurchase => "discount_below_minimum_purchase",
            Self::ProductNotEligible => "discount_product_not_eligible",
            Self::UserNotEligible => "discount_user_not_eligible",
        }
    }
}

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Discount rejected: {0}")]
    Discount(#[from] DiscountError),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("Cannot {action} order in status {order_status}/{payment_status}")]
    InvalidTransition {
        action: &'static str,
        order_status: String,
        payment_status: String,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("Webhook authentication failed: {0}")]
    WebhookAuthentication(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Recoverable, caller-facing failures: bad input, rejected discount, missing stock.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_)
                | Self::InvalidInput(_)
                | Self::Discount(_)
                | Self::InsufficientStock(_)
                | Self::NotFound(_)
        )
    }

    /// Lost a race on a guarded counter or on the order row; safe to retry.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::ConcurrentModification(_) | Self::Discount(DiscountError::UsageLimitReached)
        )
    }

    /// A transition was requested from a state that does not allow it.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::InvalidTransition { .. })
    }

    /// Machine-readable code for API clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(_) => "database_error",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::Discount(reason) => reason.code(),
            Self::InsufficientStock(_) => "insufficient_stock",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::ConcurrentModification(_) => "concurrent_modification",
            Self::WebhookAuthentication(_) => "webhook_authentication_failed",
            Self::ExternalServiceError(_) => "external_service_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::Discount(_) | Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidTransition { .. } | Self::ConcurrentModification(_) => {
                StatusCode::CONFLICT
            }
            Self::WebhookAuthentication(_) => StatusCode::UNAUTHORIZED,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::WebhookAuthentication(_) => "Invalid webhook signature".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
