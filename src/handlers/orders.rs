use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use crate::handlers::AppState;
use crate::services::order_lifecycle::OrderAggregate;
use crate::services::orders::{CancelOrderRequest, SubmitPaymentProofRequest, VerifyPaymentRequest};
use crate::services::payment_reconciliation::ReconciliationOutcome;
use crate::{ApiResponse, ApiResult};

pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/payment-proof", post(submit_payment_proof))
        .route("/orders/:id/verify-payment", post(verify_payment))
        .route("/orders/:id/cancel", post(cancel_order))
        .route("/orders/:id/complete", post(complete_order))
        .route("/orders/:id/sync-payment", post(sync_payment))
}

/// GET /api/v1/orders/:id
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderAggregate> {
    let order = state.services.orders.get(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:id/payment-proof
pub async fn submit_payment_proof(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitPaymentProofRequest>,
) -> ApiResult<OrderAggregate> {
    let order = state
        .services
        .orders
        .submit_payment_proof(id, request)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:id/verify-payment
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<VerifyPaymentRequest>,
) -> ApiResult<OrderAggregate> {
    let order = state.services.orders.verify_payment(id, request).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:id/cancel
///
/// The body is optional; an empty request cancels without a reason.
pub async fn cancel_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    request: Option<Json<CancelOrderRequest>>,
) -> ApiResult<OrderAggregate> {
    let request = request.map(|Json(body)| body).unwrap_or_default();
    let order = state.services.orders.cancel_order(id, request).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:id/complete
pub async fn complete_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderAggregate> {
    let order = state.services.orders.complete_order(id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// POST /api/v1/orders/:id/sync-payment
pub async fn sync_payment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<ReconciliationOutcome> {
    let outcome = state.services.payments.sync_status(id).await?;
    Ok(Json(ApiResponse::success(outcome)))
}
