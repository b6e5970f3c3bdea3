use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use expenseflow_core::{AccountId, ExpenseId};
use expenseflow_expenses::ExpenseAction;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_expenses).post(submit_expense))
        .route("/:id", get(get_expense))
        .route("/:id/transition", post(transition_expense))
        .route("/:id/payments", post(prepare_payment).get(list_payments))
}

fn parse_expense_id(raw: &str) -> Result<ExpenseId, axum::response::Response> {
    raw.parse().map_err(|_| errors::invalid_id("expense id"))
}

pub async fn submit_expense(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::SubmitExpenseRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.submit_expense(cmd).await {
        Ok(expense) => (StatusCode::CREATED, Json(dto::ExpenseResponse::from(&expense))).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_expenses(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.engine.expenses().await {
        Ok(expenses) => Json(
            expenses
                .iter()
                .map(dto::ExpenseResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id = match parse_expense_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.expense(id).await {
        Ok(expense) => Json(dto::ExpenseResponse::from(&expense)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn transition_expense(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::TransitionRequest>, JsonRejection>,
) -> axum::response::Response {
    let id = match parse_expense_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    // Only send/approve/reject parse; engine-driven actions are refused here.
    let action: ExpenseAction = match body.action.parse() {
        Ok(a) => a,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.transition_expense(id, action).await {
        Ok(status) => Json(serde_json::json!({
            "id": id.to_string(),
            "status": status,
        }))
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn prepare_payment(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::PreparePaymentRequest>, JsonRejection>,
) -> axum::response::Response {
    let expense_id = match parse_expense_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    let account_id: AccountId = match body.account_id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("account_id"),
    };

    match services.engine.prepare_payment(expense_id, account_id).await {
        Ok(payment) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "payment_id": payment.id_typed().to_string(),
                "reference_code": payment.reference_code(),
                "amount": payment.amount(),
                "status": payment.status(),
            })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_payments(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let expense_id = match parse_expense_id(&id) {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match services.engine.payments_for_expense(expense_id).await {
        Ok(payments) => Json(
            payments
                .iter()
                .map(dto::PaymentResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
