use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use expenseflow_core::PaymentId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/:id", get(get_payment))
        .route("/:id/confirm", post(confirm_payment))
        .route("/:id/cancel", post(cancel_payment))
}

fn parse_payment_id(raw: &str) -> Result<PaymentId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("payment id"))
}

pub async fn get_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_payment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.payment(id).await {
        Ok(payment) => Json(dto::PaymentResponse::from(&payment)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn confirm_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_payment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.confirm_payment(id).await {
        Ok(payment) => Json(serde_json::json!({
            "payment_id": payment.id_typed().to_string(),
            "status": payment.status(),
            "payment_date": payment.payment_date(),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn cancel_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_payment_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.cancel_payment(id).await {
        Ok(payment) => Json(serde_json::json!({
            "payment_id": payment.id_typed().to_string(),
            "status": payment.status(),
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
