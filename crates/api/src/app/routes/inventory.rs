use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use stockledger_core::{ProductId, WarehouseId};
use stockledger_infra::Pagination;
use stockledger_inventory::MovementRequest;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/movements", post(process_movement).get(movements_in_range))
        .route("/movements/reference/:reference_type/:reference_id", get(movements_by_reference))
        .route("/movements/:product_id", get(movement_history))
        .route("/stock/low-stock", get(low_stock))
        .route("/stock/out-of-stock", get(out_of_stock))
        .route("/stock/:product_id/total", get(total_stock))
        .route("/stock/:product_id/warehouse/:warehouse_id", get(available_stock))
        .route("/reserve", post(reserve))
        .route("/release-reservation", post(release_reservation))
}

pub async fn process_movement(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<MovementRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection, "invalid_movement"),
    };

    match services.run_write(move |ledger| ledger.process_movement(body)).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn available_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path((product_id, warehouse_id)): Path<(String, String)>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let warehouse_id: WarehouseId = match errors::parse_id(&warehouse_id, "warehouse") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .run(move |ledger| ledger.available_stock(product_id, warehouse_id))
        .await
    {
        Ok(available) => Json(dto::AvailableResponse {
            product_id,
            warehouse_id,
            available,
        })
        .into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn total_stock(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let totals = services
        .run(move |ledger| {
            Ok((
                ledger.total_stock(product_id)?,
                ledger.total_available_stock(product_id)?,
            ))
        })
        .await;

    match totals {
        Ok((total_on_hand, total_available)) => Json(dto::TotalsResponse {
            product_id,
            total_on_hand,
            total_available,
        })
        .into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn low_stock(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    match services.run(|ledger| ledger.low_stock_items()).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn out_of_stock(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    match services.run(|ledger| ledger.out_of_stock_items()).await {
        Ok(records) => Json(records).into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn movement_history(
    Extension(services): Extension<Arc<AppServices>>,
    Path(product_id): Path<String>,
    Query(query): Query<dto::HistoryQuery>,
) -> axum::response::Response {
    let product_id: ProductId = match errors::parse_id(&product_id, "product") {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let warehouse_id = query.warehouse_id;
    let pagination = query.pagination();

    match services
        .run(move |ledger| ledger.movement_history(product_id, warehouse_id, pagination))
        .await
    {
        Ok(page) => Json(dto::MovementPageResponse::from(page)).into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn movements_by_reference(
    Extension(services): Extension<Arc<AppServices>>,
    Path((reference_type, reference_id)): Path<(String, String)>,
) -> axum::response::Response {
    let Ok(reference_id) = reference_id.parse::<i64>() else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("'{reference_id}' is not a valid reference id"),
        );
    };

    match services
        .run(move |ledger| ledger.movements_by_reference(&reference_type, reference_id))
        .await
    {
        Ok(movements) => Json(movements).into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn movements_in_range(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::RangeQuery>,
) -> axum::response::Response {
    if query.from > query.to {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_range",
            "'from' must not be after 'to'",
        );
    }
    let pagination = Pagination::new(query.limit, query.offset);

    match services
        .run(move |ledger| ledger.movements_in_range(query.from, query.to, pagination))
        .await
    {
        Ok(page) => Json(dto::MovementPageResponse::from(page)).into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn reserve(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::ReservationRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection, "invalid_request"),
    };
    let dto::ReservationRequest {
        product_id,
        warehouse_id,
        quantity,
    } = body;

    match services
        .run_write(move |ledger| ledger.reserve(product_id, warehouse_id, quantity))
        .await
    {
        Ok(available) => Json(dto::AvailableResponse {
            product_id,
            warehouse_id,
            available,
        })
        .into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}

pub async fn release_reservation(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<dto::ReservationRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(body) => body,
        Err(rejection) => return errors::json_rejection(rejection, "invalid_request"),
    };
    let dto::ReservationRequest {
        product_id,
        warehouse_id,
        quantity,
    } = body;

    match services
        .run_write(move |ledger| ledger.release_reservation(product_id, warehouse_id, quantity))
        .await
    {
        Ok(available) => Json(dto::AvailableResponse {
            product_id,
            warehouse_id,
            available,
        })
        .into_response(),
        Err(e) => errors::call_error_to_response(e),
    }
}
