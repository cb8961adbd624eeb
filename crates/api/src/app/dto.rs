use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, WarehouseId};
use stockledger_infra::{MovementPage, Pagination, ProductInfo, WarehouseInfo};
use stockledger_inventory::MovementRecord;

// -------------------------
// Request DTOs
// -------------------------

/// Body of `POST /inventory/reserve` and `POST /inventory/release-reservation`.
#[derive(Debug, Deserialize)]
pub struct ReservationRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub warehouse_id: Option<WarehouseId>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl HistoryQuery {
    pub fn pagination(&self) -> Pagination {
        Pagination::new(self.limit, self.offset)
    }
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterProductRequest {
    pub product_id: Option<ProductId>,
    pub sku: String,
    #[serde(default)]
    pub minimum_stock: Decimal,
    #[serde(default)]
    pub maximum_stock: Option<Decimal>,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl RegisterProductRequest {
    pub fn into_info(self) -> ProductInfo {
        ProductInfo {
            product_id: self.product_id.unwrap_or_default(),
            sku: self.sku,
            active: self.active,
            minimum_stock: self.minimum_stock,
            maximum_stock: self.maximum_stock,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterWarehouseRequest {
    pub warehouse_id: Option<WarehouseId>,
    pub code: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

impl RegisterWarehouseRequest {
    pub fn into_info(self) -> WarehouseInfo {
        WarehouseInfo {
            warehouse_id: self.warehouse_id.unwrap_or_default(),
            code: self.code,
            active: self.active,
        }
    }
}

fn default_active() -> bool {
    true
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AvailableResponse {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub available: Decimal,
}

#[derive(Debug, Serialize)]
pub struct TotalsResponse {
    pub product_id: ProductId,
    pub total_on_hand: Decimal,
    pub total_available: Decimal,
}

#[derive(Debug, Serialize)]
pub struct MovementPageResponse {
    pub movements: Vec<MovementRecord>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
    pub has_more: bool,
}

impl From<MovementPage> for MovementPageResponse {
    fn from(page: MovementPage) -> Self {
        Self {
            movements: page.movements,
            total: page.total,
            limit: page.pagination.limit,
            offset: page.pagination.offset,
            has_more: page.has_more,
        }
    }
}
