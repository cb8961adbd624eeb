//! Postgres-backed master data lookups.
//!
//! Reads the `products` and `warehouses` tables owned by the catalog service.
//! Only the columns the ledger needs are selected.

use std::sync::Arc;

use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use stockledger_core::{ProductId, WarehouseId};

use super::{MasterData, ProductInfo, WarehouseInfo};
use crate::store::StoreError;

/// Minimal catalog tables, for development databases that have none.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id              UUID         PRIMARY KEY,
    sku             VARCHAR(100) NOT NULL,
    is_active       BOOLEAN      NOT NULL DEFAULT TRUE,
    minimum_stock   NUMERIC      NOT NULL DEFAULT 0,
    maximum_stock   NUMERIC
);

CREATE TABLE IF NOT EXISTS warehouses (
    id              UUID         PRIMARY KEY,
    code            VARCHAR(50)  NOT NULL,
    is_active       BOOLEAN      NOT NULL DEFAULT TRUE
);
"#;

#[derive(Debug, Clone)]
pub struct PostgresMasterData {
    pool: Arc<PgPool>,
}

impl PostgresMasterData {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("ensure catalog schema: {e}")))?;
        Ok(())
    }

    pub async fn fetch_product(&self, product_id: ProductId) -> Result<Option<ProductInfo>, StoreError> {
        let row = sqlx::query(
            "SELECT id, sku, is_active, minimum_stock, maximum_stock FROM products WHERE id = $1",
        )
        .bind(product_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| StoreError::Backend(format!("fetch product: {e}")))?;

        row.map(|r| -> Result<ProductInfo, sqlx::Error> {
            let id: Uuid = r.try_get("id")?;
            let minimum_stock: Decimal = r.try_get("minimum_stock")?;
            Ok(ProductInfo {
                product_id: ProductId::from_uuid(id),
                sku: r.try_get("sku")?,
                active: r.try_get("is_active")?,
                minimum_stock,
                maximum_stock: r.try_get("maximum_stock")?,
            })
        })
        .transpose()
        .map_err(|e| StoreError::Backend(format!("decode product: {e}")))
    }

    pub async fn fetch_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Option<WarehouseInfo>, StoreError> {
        let row = sqlx::query("SELECT id, code, is_active FROM warehouses WHERE id = $1")
            .bind(warehouse_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("fetch warehouse: {e}")))?;

        row.map(|r| -> Result<WarehouseInfo, sqlx::Error> {
            let id: Uuid = r.try_get("id")?;
            Ok(WarehouseInfo {
                warehouse_id: WarehouseId::from_uuid(id),
                code: r.try_get("code")?,
                active: r.try_get("is_active")?,
            })
        })
        .transpose()
        .map_err(|e| StoreError::Backend(format!("decode warehouse: {e}")))
    }

    fn block_on<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend(
                "PostgresMasterData requires a tokio runtime in the calling context".to_string(),
            )
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

impl MasterData for PostgresMasterData {
    fn product(&self, product_id: ProductId) -> Result<Option<ProductInfo>, StoreError> {
        self.block_on(self.fetch_product(product_id))
    }

    fn warehouse(&self, warehouse_id: WarehouseId) -> Result<Option<WarehouseInfo>, StoreError> {
        self.block_on(self.fetch_warehouse(warehouse_id))
    }
}
