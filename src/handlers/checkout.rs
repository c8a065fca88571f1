use axum::{extract::State, http::StatusCode, routing::post, Json, Router};

use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::checkout::{CheckoutReceipt, CheckoutRequest, DiscountPreview, DiscountPreviewRequest};
use crate::ApiResponse;

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/checkout", post(checkout))
        .route("/discounts/preview", post(preview_discount))
}

/// POST /api/v1/checkout
pub async fn checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CheckoutReceipt>>), ServiceError> {
    let receipt = state.services.checkout.checkout(request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(receipt))))
}

/// POST /api/v1/discounts/preview
pub async fn preview_discount(
    State(state): State<AppState>,
    Json(request): Json<DiscountPreviewRequest>,
) -> Result<Json<ApiResponse<DiscountPreview>>, ServiceError> {
    let preview = state.services.checkout.preview_discount(request).await?;
    Ok(Json(ApiResponse::success(preview)))
}
