use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use bytes::Bytes;

use crate::gateway::NotificationSignature;
use crate::handlers::AppState;
use crate::services::payment_reconciliation::ReconciliationOutcome;
use crate::{ApiResponse, ApiResult};

const TIMESTAMP_HEADER: &str = "x-timestamp";
const SIGNATURE_HEADER: &str = "x-signature";

pub fn payment_routes() -> Router<AppState> {
    Router::new().route("/payments/notifications", post(payment_notification))
}

/// POST /api/v1/payments/notifications
///
/// The body is taken raw: the signature covers the exact bytes sent.
pub async fn payment_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<ReconciliationOutcome> {
    let outcome = state
        .services
        .payments
        .handle_notification(&body, signature_from_headers(&headers))
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}

fn signature_from_headers(headers: &HeaderMap) -> Option<NotificationSignature> {
    let timestamp = headers.get(TIMESTAMP_HEADER)?.to_str().ok()?;
    let signature = headers.get(SIGNATURE_HEADER)?.to_str().ok()?;
    Some(NotificationSignature {
        timestamp: timestamp.to_string(),
        signature: signature.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn both_headers_are_required() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static("1717236000"));
        assert!(signature_from_headers(&headers).is_none());

        headers.insert(SIGNATURE_HEADER, HeaderValue::from_static("abcd"));
        assert_eq!(
            signature_from_headers(&headers),
            Some(NotificationSignature {
                timestamp: "1717236000".into(),
                signature: "abcd".into(),
            })
        );
    }
}
