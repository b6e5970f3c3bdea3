//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: ledger store selection and engine wiring
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: request/response DTOs and JSON mapping helpers
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use expenseflow_infra::{LedgerStoreError, StoreConfig};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router for the configured store (entrypoint used by `main.rs`).
pub async fn build_app(store: &StoreConfig) -> Result<Router, LedgerStoreError> {
    let services = services::build_services(store).await?;
    Ok(router(Arc::new(services)))
}

/// Build the router over already-wired services.
pub fn router(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::router())
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(middleware::log_requests))
                .layer(Extension(services)),
        )
}

pub use services::AppServices;
