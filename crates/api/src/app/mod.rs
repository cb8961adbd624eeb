//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store/master-data/bus wiring and the blocking ledger bridge
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: consistent error responses
//! - `notifications.rs`: background log of published stock events

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

use stockledger_infra::StoreError;

use crate::config::ApiConfig;

pub mod dto;
pub mod errors;
pub mod notifications;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &ApiConfig) -> Result<Router, StoreError> {
    let services = Arc::new(services::build_services(config).await?);

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services))))
}
