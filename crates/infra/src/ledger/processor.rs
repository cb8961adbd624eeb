use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, instrument};

use stockledger_core::{ExpectedVersion, MovementId, ProductId, Versioned, WarehouseId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{
    LowStockDetected, MovementNumber, MovementRecord, MovementRecorded, MovementRequest,
    ReservationReleased, StockEvent, StockKey, StockRecord,
};

use super::{InventoryLedger, LedgerError};
use crate::master_data::MasterData;
use crate::store::{StockCommit, StockStore};

/// Stock state right after a movement, plus the movement's ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockSnapshot {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub quantity_on_hand: Decimal,
    pub quantity_reserved: Decimal,
    pub quantity_available: Decimal,
    pub version: u64,
    /// Reservations dropped because on-hand fell below them.
    #[serde(skip_serializing_if = "Decimal::is_zero")]
    pub reserved_trimmed: Decimal,
    pub movement: MovementRecord,
}

impl StockSnapshot {
    fn new(record: &StockRecord, movement: MovementRecord, reserved_trimmed: Decimal) -> Self {
        Self {
            product_id: record.product_id(),
            warehouse_id: record.warehouse_id(),
            quantity_on_hand: record.quantity_on_hand(),
            quantity_reserved: record.quantity_reserved(),
            quantity_available: record.quantity_available(),
            version: record.version(),
            reserved_trimmed,
            movement,
        }
    }
}

struct Applied {
    record: StockRecord,
    movement: MovementRecord,
    reserved_trimmed: Decimal,
    crossed_minimum: bool,
}

impl<S, M, B> InventoryLedger<S, M, B>
where
    S: StockStore,
    M: MasterData,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Apply a movement to stock and append it to the movement log.
    ///
    /// The stock change and the log entry are committed together; a failed
    /// rule check leaves both untouched.
    #[instrument(
        skip(self, request),
        fields(
            product_id = %request.product_id,
            warehouse_id = %request.warehouse_id,
            movement_type = %request.movement_type,
        )
    )]
    pub fn process_movement(&self, request: MovementRequest) -> Result<StockSnapshot, LedgerError> {
        let key = StockKey::new(request.product_id, request.warehouse_id);
        request
            .validate()
            .map_err(|e| LedgerError::from_stock(e, key))?;

        let product = self.resolve_product(request.product_id)?;
        self.resolve_warehouse(request.warehouse_id)?;

        let applied = self.write_cycle(key, || {
            let now = Utc::now();
            let mut record = match self.store.load_stock(key)? {
                Some(record) => record,
                None => StockRecord::open(key, product.thresholds(), now),
            };
            let expected = ExpectedVersion::for_read(record.version());
            let was_low = record.is_low_stock();

            let change = record
                .apply_movement(&request, self.config.decrease_policy, now)
                .map_err(|e| LedgerError::from_stock(e, key))?;

            let day = now.date_naive();
            let sequence = self.store.next_movement_sequence(day)?;
            let number = MovementNumber::new(&self.config.movement_prefix, day, sequence);
            let movement =
                MovementRecord::from_applied(MovementId::new(), number, &request, &change, now)
                    .map_err(|e| LedgerError::from_stock(e, key))?;

            self.store
                .commit(StockCommit::new(record.clone(), expected).with_movement(movement.clone()))?;

            Ok(Applied {
                crossed_minimum: !was_low && record.is_low_stock(),
                record,
                movement,
                reserved_trimmed: change.reserved_trimmed,
            })
        })?;

        info!(
            movement_number = %applied.movement.movement_number,
            quantity = %applied.movement.quantity,
            quantity_before = %applied.movement.quantity_before,
            quantity_after = %applied.movement.quantity_after,
            "movement recorded"
        );

        self.publish(StockEvent::MovementRecorded(MovementRecorded {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            movement_type: applied.movement.movement_type,
            movement_number: applied.movement.movement_number.clone(),
            quantity_after: applied.movement.quantity_after,
            occurred_at: applied.movement.movement_date,
        }));

        if !applied.reserved_trimmed.is_zero() {
            info!(reserved_trimmed = %applied.reserved_trimmed, "reservations trimmed to on-hand");
            self.publish(StockEvent::ReservationReleased(ReservationReleased {
                product_id: key.product_id,
                warehouse_id: key.warehouse_id,
                quantity: applied.reserved_trimmed,
                quantity_available: applied.record.quantity_available(),
                occurred_at: applied.movement.movement_date,
            }));
        }

        if applied.crossed_minimum {
            let thresholds = applied.record.thresholds();
            info!(
                quantity_on_hand = %applied.record.quantity_on_hand(),
                minimum_stock = %thresholds.minimum_stock,
                "stock at or below minimum"
            );
            self.publish(StockEvent::LowStockDetected(LowStockDetected {
                product_id: key.product_id,
                warehouse_id: key.warehouse_id,
                quantity_on_hand: applied.record.quantity_on_hand(),
                minimum_stock: thresholds.minimum_stock,
                occurred_at: applied.movement.movement_date,
            }));
        }

        Ok(StockSnapshot::new(
            &applied.record,
            applied.movement,
            applied.reserved_trimmed,
        ))
    }
}
