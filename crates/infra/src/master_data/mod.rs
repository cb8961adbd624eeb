//! Product and warehouse master data, as seen by the ledger.
//!
//! The ledger never writes master data. It asks two questions: does this
//! product/warehouse exist and is it active, and what stock thresholds does
//! the product carry. An inactive entry is treated the same as a missing one.

pub mod postgres;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, WarehouseId};
use stockledger_inventory::StockThresholds;

use crate::store::StoreError;

pub use postgres::PostgresMasterData;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_id: ProductId,
    pub sku: String,
    pub active: bool,
    #[serde(default)]
    pub minimum_stock: Decimal,
    #[serde(default)]
    pub maximum_stock: Option<Decimal>,
}

impl ProductInfo {
    pub fn new(product_id: ProductId, sku: impl Into<String>) -> Self {
        Self {
            product_id,
            sku: sku.into(),
            active: true,
            minimum_stock: Decimal::ZERO,
            maximum_stock: None,
        }
    }

    pub fn with_minimum_stock(mut self, minimum_stock: Decimal) -> Self {
        self.minimum_stock = minimum_stock;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Thresholds copied onto a stock record when it is first created.
    pub fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            minimum_stock: self.minimum_stock,
            maximum_stock: self.maximum_stock,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseInfo {
    pub warehouse_id: WarehouseId,
    pub code: String,
    pub active: bool,
}

impl WarehouseInfo {
    pub fn new(warehouse_id: WarehouseId, code: impl Into<String>) -> Self {
        Self {
            warehouse_id,
            code: code.into(),
            active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Read-only lookup of products and warehouses.
pub trait MasterData: Send + Sync {
    fn product(&self, product_id: ProductId) -> Result<Option<ProductInfo>, StoreError>;

    fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<WarehouseInfo>, StoreError>;
}

impl<S> MasterData for Arc<S>
where
    S: MasterData + ?Sized,
{
    fn product(&self, product_id: ProductId) -> Result<Option<ProductInfo>, StoreError> {
        (**self).product(product_id)
    }

    fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<WarehouseInfo>, StoreError> {
        (**self).warehouse(warehouse_id)
    }
}

/// In-memory master data for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMasterData {
    products: RwLock<HashMap<ProductId, ProductInfo>>,
    warehouses: RwLock<HashMap<WarehouseId, WarehouseInfo>>,
}

impl InMemoryMasterData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_product(&self, product: ProductInfo) -> Result<(), StoreError> {
        let mut map = self
            .products
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        map.insert(product.product_id, product);
        Ok(())
    }

    pub fn upsert_warehouse(&self, warehouse: WarehouseInfo) -> Result<(), StoreError> {
        let mut map = self
            .warehouses
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        map.insert(warehouse.warehouse_id, warehouse);
        Ok(())
    }
}

impl MasterData for InMemoryMasterData {
    fn product(&self, product_id: ProductId) -> Result<Option<ProductInfo>, StoreError> {
        let map = self
            .products
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(map.get(&product_id).cloned())
    }

    fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<WarehouseInfo>, StoreError> {
        let map = self
            .warehouses
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))?;
        Ok(map.get(&warehouse_id).cloned())
    }
}
