use axum::Router;

pub mod accounts;
pub mod expenses;
pub mod payments;
pub mod system;

/// Router for all `/api` endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/accounts", accounts::router())
        .nest("/expenses", expenses::router())
        .nest("/payments", payments::router())
}
