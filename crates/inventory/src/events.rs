use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, WarehouseId};
use stockledger_events::Event;

use crate::movement::MovementType;
use crate::number::MovementNumber;

/// Event: MovementRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecorded {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement_type: MovementType,
    pub movement_number: MovementNumber,
    pub quantity_after: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub quantity_available: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReservationReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationReleased {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity: Decimal,
    pub quantity_available: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Event: LowStockDetected. A movement took on-hand to or below the minimum.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LowStockDetected {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_on_hand: Decimal,
    pub minimum_stock: Decimal,
    pub occurred_at: DateTime<Utc>,
}

/// Notifications published after a committed stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StockEvent {
    MovementRecorded(MovementRecorded),
    StockReserved(StockReserved),
    ReservationReleased(ReservationReleased),
    LowStockDetected(LowStockDetected),
}

impl StockEvent {
    fn stock_key(&self) -> (ProductId, WarehouseId) {
        match self {
            StockEvent::MovementRecorded(e) => (e.product_id, e.warehouse_id),
            StockEvent::StockReserved(e) => (e.product_id, e.warehouse_id),
            StockEvent::ReservationReleased(e) => (e.product_id, e.warehouse_id),
            StockEvent::LowStockDetected(e) => (e.product_id, e.warehouse_id),
        }
    }
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::MovementRecorded(_) => "inventory.stock.movement_recorded",
            StockEvent::StockReserved(_) => "inventory.stock.reserved",
            StockEvent::ReservationReleased(_) => "inventory.stock.released",
            StockEvent::LowStockDetected(_) => "inventory.stock.low_stock",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::MovementRecorded(e) => e.occurred_at,
            StockEvent::StockReserved(e) => e.occurred_at,
            StockEvent::ReservationReleased(e) => e.occurred_at,
            StockEvent::LowStockDetected(e) => e.occurred_at,
        }
    }

    fn stream(&self) -> String {
        let (product_id, warehouse_id) = self.stock_key();
        format!("stock/{product_id}/{warehouse_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn stream_is_keyed_by_product_and_warehouse() {
        let product_id = ProductId::new();
        let warehouse_id = WarehouseId::new();
        let ev = StockEvent::StockReserved(StockReserved {
            product_id,
            warehouse_id,
            quantity: dec!(2),
            quantity_available: dec!(8),
            occurred_at: Utc::now(),
        });

        assert_eq!(ev.stream(), format!("stock/{product_id}/{warehouse_id}"));
        assert_eq!(ev.event_type(), "inventory.stock.reserved");
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let ev = StockEvent::MovementRecorded(MovementRecorded {
            product_id: ProductId::new(),
            warehouse_id: WarehouseId::new(),
            movement_type: MovementType::Sale,
            movement_number: MovementNumber::parse("MOV-20260101-000010").unwrap(),
            quantity_after: dec!(70),
            occurred_at: Utc::now(),
        });

        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["MovementRecorded"]["movement_type"], "SALE");
        assert_eq!(json["MovementRecorded"]["quantity_after"], "70");

        let back: StockEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, ev);
    }
}
