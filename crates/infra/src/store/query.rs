//! Read-side filters and pagination for stock and movement queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, WarehouseId};
use stockledger_inventory::{MovementRecord, MovementType, StockRecord};

/// Pagination parameters for movement queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of movements to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Pagination {
    pub const DEFAULT_LIMIT: u32 = 50;
    pub const MAX_LIMIT: u32 = 1000;

    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    /// Whether rows remain past this page, given the filtered total.
    pub fn has_more(&self, total: u64) -> bool {
        total > u64::from(self.offset) + u64::from(self.limit)
    }
}

impl Default for Pagination {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Classification filter for stock listings.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockCondition {
    /// On-hand at or below the product minimum.
    LowStock,
    /// On-hand exactly zero.
    OutOfStock,
}

/// Filter criteria for stock listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub condition: Option<StockCondition>,
}

impl StockFilter {
    pub fn product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn warehouse(warehouse_id: WarehouseId) -> Self {
        Self {
            warehouse_id: Some(warehouse_id),
            ..Default::default()
        }
    }

    pub fn condition(condition: StockCondition) -> Self {
        Self {
            condition: Some(condition),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &StockRecord) -> bool {
        if self.product_id.is_some_and(|p| p != record.product_id()) {
            return false;
        }
        if self.warehouse_id.is_some_and(|w| w != record.warehouse_id()) {
            return false;
        }
        match self.condition {
            Some(StockCondition::LowStock) => record.is_low_stock(),
            Some(StockCondition::OutOfStock) => record.is_out_of_stock(),
            None => true,
        }
    }
}

/// Filter criteria for movement queries. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementFilter {
    pub product_id: Option<ProductId>,
    pub warehouse_id: Option<WarehouseId>,
    pub movement_type: Option<MovementType>,
    pub reference_type: Option<String>,
    pub reference_id: Option<i64>,
    /// Inclusive lower bound on `movement_date`.
    pub occurred_after: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `movement_date`.
    pub occurred_before: Option<DateTime<Utc>>,
}

impl MovementFilter {
    pub fn matches(&self, movement: &MovementRecord) -> bool {
        self.product_id.is_none_or(|p| p == movement.product_id)
            && self.warehouse_id.is_none_or(|w| w == movement.warehouse_id)
            && self.movement_type.is_none_or(|t| t == movement.movement_type)
            && self
                .reference_type
                .as_deref()
                .is_none_or(|t| movement.reference_type.as_deref() == Some(t))
            && self.reference_id.is_none_or(|id| movement.reference_id == Some(id))
            && self.occurred_after.is_none_or(|after| movement.movement_date >= after)
            && self.occurred_before.is_none_or(|before| movement.movement_date <= before)
    }
}

/// Paginated movement query result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementPage {
    /// Movements on this page, most recent first.
    pub movements: Vec<MovementRecord>,
    /// Total number of movements matching the filter (across all pages).
    pub total: u64,
    pub pagination: Pagination,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_defaults_and_caps_limit() {
        assert_eq!(Pagination::default().limit, 50);
        assert_eq!(Pagination::new(Some(5000), Some(3)).limit, 1000);
        assert_eq!(Pagination::new(Some(5000), Some(3)).offset, 3);
    }

    #[test]
    fn has_more_compares_against_page_end() {
        let page = Pagination::new(Some(10), Some(10));
        assert!(page.has_more(21));
        assert!(!page.has_more(20));
    }
}
