use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use expenseflow_core::AccountId;

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_accounts).post(open_account))
        .route("/:id", get(get_account))
}

pub async fn open_account(
    Extension(services): Extension<Arc<AppServices>>,
    body: Result<Json<dto::OpenAccountRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(rej) => return errors::json_rejection(rej),
    };
    let cmd = match body.into_command() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.engine.open_account(cmd).await {
        Ok(account) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "id": account.id_typed().to_string() })),
        )
            .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn list_accounts(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.engine.accounts().await {
        Ok(accounts) => Json(
            accounts
                .iter()
                .map(dto::AccountResponse::from)
                .collect::<Vec<_>>(),
        )
        .into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}

pub async fn get_account(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: AccountId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::invalid_id("account id"),
    };

    match services.engine.account(id).await {
        Ok(account) => Json(dto::AccountResponse::from(&account)).into_response(),
        Err(e) => errors::engine_error_to_response(e),
    }
}
