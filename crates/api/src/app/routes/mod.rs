use axum::Router;

pub mod catalog;
pub mod inventory;
pub mod system;

/// Router for the ledger and catalog endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/inventory", inventory::router())
        .nest("/catalog", catalog::router())
}
