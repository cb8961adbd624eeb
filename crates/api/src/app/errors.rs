use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::{Map, Value as JsonValue, json};

use stockledger_infra::LedgerError;

use crate::app::services::CallError;

pub fn call_error_to_response(err: CallError) -> axum::response::Response {
    match err {
        CallError::Ledger(e) => ledger_error_to_response(e),
        CallError::Timeout(after) => error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "request_timeout",
            format!("request timed out after {after:?}"),
            true,
            Map::new(),
        ),
        CallError::OutcomeUnknown(after) => error_body(
            StatusCode::SERVICE_UNAVAILABLE,
            "outcome_unknown",
            format!(
                "write did not finish within {after:?} and may still be applied; check stock before resubmitting"
            ),
            false,
            Map::new(),
        ),
        CallError::Join(msg) => {
            tracing::error!(error = %msg, "ledger task failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
        }
    }
}

pub fn ledger_error_to_response(err: LedgerError) -> axum::response::Response {
    let (status, code) = match &err {
        LedgerError::ProductNotFound(_) => (StatusCode::NOT_FOUND, "product_not_found"),
        LedgerError::WarehouseNotFound(_) => (StatusCode::NOT_FOUND, "warehouse_not_found"),
        LedgerError::InvalidMovement(_) => (StatusCode::BAD_REQUEST, "invalid_movement"),
        LedgerError::InvalidQuantity(_) => (StatusCode::BAD_REQUEST, "invalid_quantity"),
        LedgerError::InsufficientStock { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_stock")
        }
        LedgerError::InsufficientAvailableStock { .. } => {
            (StatusCode::UNPROCESSABLE_ENTITY, "insufficient_available_stock")
        }
        LedgerError::ConcurrencyConflict { .. } => (StatusCode::CONFLICT, "concurrency_conflict"),
        LedgerError::Store(e) => {
            tracing::error!(error = %e, "stock store failure");
            (StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        }
    };

    let mut context = Map::new();
    let (product_id, warehouse_id) = err.stock_context();
    if let Some(id) = product_id {
        context.insert("product_id".to_string(), json!(id));
    }
    if let Some(id) = warehouse_id {
        context.insert("warehouse_id".to_string(), json!(id));
    }

    error_body(status, code, err.to_string(), err.is_retryable(), context)
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    error_body(status, code, message.into(), false, Map::new())
}

fn error_body(
    status: StatusCode,
    code: &'static str,
    message: String,
    retryable: bool,
    mut context: Map<String, JsonValue>,
) -> axum::response::Response {
    context.insert("error".to_string(), json!(code));
    context.insert("message".to_string(), json!(message));
    context.insert("retryable".to_string(), json!(retryable));

    (status, axum::Json(JsonValue::Object(context))).into_response()
}

/// Turn a rejected JSON body into the usual 400 error shape.
pub fn json_rejection(rejection: JsonRejection, code: &'static str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, code, rejection.body_text())
}

/// Parse an identifier taken from the URL path.
pub fn parse_id<T: core::str::FromStr>(
    raw: &str,
    what: &'static str,
) -> Result<T, axum::response::Response> {
    raw.parse::<T>().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("'{raw}' is not a valid {what} id"),
        )
    })
}
