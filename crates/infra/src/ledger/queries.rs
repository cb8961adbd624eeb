use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use stockledger_core::{ProductId, WarehouseId};
use stockledger_inventory::{MovementRecord, StockKey, StockRecord};

use super::{InventoryLedger, LedgerError};
use crate::store::{
    MovementFilter, MovementPage, Pagination, StockCondition, StockFilter, StockStore,
};

/// Read-only queries. These never take the key lock and never create records.
impl<S, M, B> InventoryLedger<S, M, B>
where
    S: StockStore,
{
    /// Available quantity, or zero when no record exists.
    pub fn available_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Decimal, LedgerError> {
        Ok(self
            .stock_record(product_id, warehouse_id)?
            .map(|r| r.quantity_available())
            .unwrap_or(Decimal::ZERO))
    }

    pub fn stock_record(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockRecord>, LedgerError> {
        Ok(self
            .store
            .load_stock(StockKey::new(product_id, warehouse_id))?)
    }

    /// On-hand summed across every warehouse.
    pub fn total_stock(&self, product_id: ProductId) -> Result<Decimal, LedgerError> {
        let records = self.stock_by_product(product_id)?;
        checked_total(product_id, records.iter().map(StockRecord::quantity_on_hand))
    }

    /// Available summed across every warehouse.
    pub fn total_available_stock(&self, product_id: ProductId) -> Result<Decimal, LedgerError> {
        let records = self.stock_by_product(product_id)?;
        checked_total(product_id, records.iter().map(StockRecord::quantity_available))
    }

    pub fn stock_by_product(&self, product_id: ProductId) -> Result<Vec<StockRecord>, LedgerError> {
        Ok(self.store.list_stock(&StockFilter::product(product_id))?)
    }

    pub fn stock_by_warehouse(
        &self,
        warehouse_id: WarehouseId,
    ) -> Result<Vec<StockRecord>, LedgerError> {
        Ok(self.store.list_stock(&StockFilter::warehouse(warehouse_id))?)
    }

    /// Records with on-hand at or below the product minimum.
    pub fn low_stock_items(&self) -> Result<Vec<StockRecord>, LedgerError> {
        Ok(self
            .store
            .list_stock(&StockFilter::condition(StockCondition::LowStock))?)
    }

    pub fn out_of_stock_items(&self) -> Result<Vec<StockRecord>, LedgerError> {
        Ok(self
            .store
            .list_stock(&StockFilter::condition(StockCondition::OutOfStock))?)
    }

    /// Movements for a product, optionally one warehouse, most recent first.
    pub fn movement_history(
        &self,
        product_id: ProductId,
        warehouse_id: Option<WarehouseId>,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        let filter = MovementFilter {
            product_id: Some(product_id),
            warehouse_id,
            ..Default::default()
        };
        Ok(self.store.query_movements(&filter, pagination)?)
    }

    /// Every movement linked to an external document (sale order, receipt).
    pub fn movements_by_reference(
        &self,
        reference_type: &str,
        reference_id: i64,
    ) -> Result<Vec<MovementRecord>, LedgerError> {
        let filter = MovementFilter {
            reference_type: Some(reference_type.to_string()),
            reference_id: Some(reference_id),
            ..Default::default()
        };

        let mut movements = Vec::new();
        let mut page = Pagination::new(Some(Pagination::MAX_LIMIT), None);
        loop {
            let result = self.store.query_movements(&filter, page)?;
            movements.extend(result.movements);
            if !result.has_more {
                return Ok(movements);
            }
            page.offset += page.limit;
        }
    }

    /// Movements dated within `[from, to]`, most recent first.
    pub fn movements_in_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        pagination: Pagination,
    ) -> Result<MovementPage, LedgerError> {
        let filter = MovementFilter {
            occurred_after: Some(from),
            occurred_before: Some(to),
            ..Default::default()
        };
        Ok(self.store.query_movements(&filter, pagination)?)
    }
}

fn checked_total(
    product_id: ProductId,
    mut quantities: impl Iterator<Item = Decimal>,
) -> Result<Decimal, LedgerError> {
    quantities.try_fold(Decimal::ZERO, |acc, q| {
        acc.checked_add(q).ok_or_else(|| {
            LedgerError::InvalidQuantity(format!(
                "total for product {product_id} exceeds the decimal range"
            ))
        })
    })
}
