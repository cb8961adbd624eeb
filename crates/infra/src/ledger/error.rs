use rust_decimal::Decimal;
use thiserror::Error;

use stockledger_core::{ProductId, WarehouseId};
use stockledger_inventory::{StockError, StockKey};

use crate::store::StoreError;

/// Failure of a ledger operation, with stock context attached.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Unknown or inactive product.
    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    /// Unknown or inactive warehouse.
    #[error("warehouse {0} not found")]
    WarehouseNotFound(WarehouseId),

    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error(
        "insufficient stock for product {product_id} in warehouse {warehouse_id}: \
         requested {requested}, on hand {on_hand}, available {available}"
    )]
    InsufficientStock {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        requested: Decimal,
        on_hand: Decimal,
        available: Decimal,
    },

    #[error(
        "insufficient available stock for product {product_id} in warehouse {warehouse_id}: \
         requested {requested}, available {available}"
    )]
    InsufficientAvailableStock {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        requested: Decimal,
        available: Decimal,
    },

    /// Every write attempt lost an optimistic version race. Safe to resubmit.
    #[error(
        "stock for product {product_id} in warehouse {warehouse_id} changed concurrently \
         ({attempts} attempts)"
    )]
    ConcurrencyConflict {
        product_id: ProductId,
        warehouse_id: WarehouseId,
        attempts: u32,
    },

    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Attach the stock key to a domain rule failure.
    pub fn from_stock(err: StockError, key: StockKey) -> Self {
        let StockKey {
            product_id,
            warehouse_id,
        } = key;
        match err {
            StockError::InvalidMovement(msg) => LedgerError::InvalidMovement(msg),
            StockError::InvalidQuantity(msg) => LedgerError::InvalidQuantity(msg),
            StockError::InsufficientStock {
                requested,
                on_hand,
                available,
            } => LedgerError::InsufficientStock {
                product_id,
                warehouse_id,
                requested,
                on_hand,
                available,
            },
            StockError::InsufficientAvailableStock {
                requested,
                available,
            } => LedgerError::InsufficientAvailableStock {
                product_id,
                warehouse_id,
                requested,
                available,
            },
        }
    }

    /// The caller may resubmit the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::ConcurrencyConflict { .. })
    }

    /// Product/warehouse the failure is about, when known.
    pub fn stock_context(&self) -> (Option<ProductId>, Option<WarehouseId>) {
        match self {
            LedgerError::ProductNotFound(p) => (Some(*p), None),
            LedgerError::WarehouseNotFound(w) => (None, Some(*w)),
            LedgerError::InsufficientStock {
                product_id,
                warehouse_id,
                ..
            }
            | LedgerError::InsufficientAvailableStock {
                product_id,
                warehouse_id,
                ..
            }
            | LedgerError::ConcurrencyConflict {
                product_id,
                warehouse_id,
                ..
            } => (Some(*product_id), Some(*warehouse_id)),
            _ => (None, None),
        }
    }

    /// Lost a version race inside one attempt; the ledger retries these.
    pub(crate) fn is_write_conflict(&self) -> bool {
        matches!(self, LedgerError::Store(err) if err.is_retryable())
    }
}
