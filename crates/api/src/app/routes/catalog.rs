use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};

use stockledger_infra::InMemoryMasterData;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Dev-only registration of products and warehouses.
///
/// Only available when master data lives in memory; a persistent catalog is
/// owned by another system.
pub fn router() -> Router {
    Router::new()
        .route("/products", post(register_product))
        .route("/warehouses", post(register_warehouse))
}

fn writable_catalog(
    services: &AppServices,
) -> Result<&Arc<InMemoryMasterData>, axum::response::Response> {
    services.catalog().ok_or_else(|| {
        errors::json_error(
            StatusCode::NOT_IMPLEMENTED,
            "catalog_read_only",
            "catalog registration is only available with in-memory stores",
        )
    })
}

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::RegisterProductRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection, "validation_error"),
    };
    let catalog = match writable_catalog(&services) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if body.sku.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "sku must not be empty");
    }

    let product = body.into_info();
    if let Err(e) = catalog.upsert_product(product.clone()) {
        tracing::error!(error = %e, "product registration failed");
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string());
    }
    tracing::info!(product_id = %product.product_id, sku = %product.sku, "product registered");

    (StatusCode::CREATED, Json(product)).into_response()
}

pub async fn register_warehouse(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::RegisterWarehouseRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection, "validation_error"),
    };
    let catalog = match writable_catalog(&services) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    if body.code.trim().is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "validation_error", "code must not be empty");
    }

    let warehouse = body.into_info();
    if let Err(e) = catalog.upsert_warehouse(warehouse.clone()) {
        tracing::error!(error = %e, "warehouse registration failed");
        return errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string());
    }
    tracing::info!(warehouse_id = %warehouse.warehouse_id, code = %warehouse.code, "warehouse registered");

    (StatusCode::CREATED, Json(warehouse)).into_response()
}
