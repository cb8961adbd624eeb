use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use tracing::{debug, info, instrument};

use stockledger_core::{ExpectedVersion, ProductId, Versioned, WarehouseId};
use stockledger_events::{EventBus, EventEnvelope};
use stockledger_inventory::{
    ReleaseOutcome, ReservationReleased, StockError, StockEvent, StockKey, StockReserved,
};

use super::{InventoryLedger, LedgerError};
use crate::master_data::MasterData;
use crate::store::{StockCommit, StockStore};

impl<S, M, B> InventoryLedger<S, M, B>
where
    S: StockStore,
    M: MasterData,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Hold back `quantity` units for a pending order.
    ///
    /// Returns the available quantity after the reservation. A key with no
    /// stock record has nothing available.
    #[instrument(
        skip_all,
        fields(product_id = %product_id, warehouse_id = %warehouse_id, quantity = %quantity)
    )]
    pub fn reserve(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let key = StockKey::new(product_id, warehouse_id);
        ensure_positive(quantity, key)?;
        self.resolve_product(product_id)?;
        self.resolve_warehouse(warehouse_id)?;

        let available = self.write_cycle(key, || {
            let Some(mut record) = self.store.load_stock(key)? else {
                return Err(LedgerError::InsufficientAvailableStock {
                    product_id,
                    warehouse_id,
                    requested: quantity,
                    available: Decimal::ZERO,
                });
            };
            let expected = ExpectedVersion::for_read(record.version());

            let available = record
                .reserve(quantity, Utc::now())
                .map_err(|e| LedgerError::from_stock(e, key))?;
            self.store.commit(StockCommit::new(record, expected))?;
            Ok(available)
        })?;

        info!(available = %available, "stock reserved");
        self.publish(StockEvent::StockReserved(StockReserved {
            product_id,
            warehouse_id,
            quantity,
            quantity_available: available,
            occurred_at: Utc::now(),
        }));
        Ok(available)
    }

    /// Give back up to `quantity` reserved units.
    ///
    /// Releasing more than is reserved floors the reservation at zero. A key
    /// with no stock record returns 0 and creates nothing.
    #[instrument(
        skip_all,
        fields(product_id = %product_id, warehouse_id = %warehouse_id, quantity = %quantity)
    )]
    pub fn release_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        quantity: Decimal,
    ) -> Result<Decimal, LedgerError> {
        let key = StockKey::new(product_id, warehouse_id);
        ensure_positive(quantity, key)?;
        self.resolve_product(product_id)?;
        self.resolve_warehouse(warehouse_id)?;

        let outcome = self.write_cycle(key, || {
            let Some(mut record) = self.store.load_stock(key)? else {
                return Ok(None);
            };
            if record.quantity_reserved().is_zero() {
                return Ok(Some(ReleaseOutcome {
                    released: Decimal::ZERO,
                    available: record.quantity_available(),
                    clamped: true,
                }));
            }
            let expected = ExpectedVersion::for_read(record.version());

            let outcome = record
                .release(quantity, Utc::now())
                .map_err(|e| LedgerError::from_stock(e, key))?;
            self.store.commit(StockCommit::new(record, expected))?;
            Ok(Some(outcome))
        })?;

        let Some(outcome) = outcome else {
            debug!("no stock record, nothing to release");
            return Ok(Decimal::ZERO);
        };

        if outcome.clamped {
            debug!(
                released = %outcome.released,
                "release exceeded reserved quantity, floored at zero"
            );
        }

        if !outcome.released.is_zero() {
            info!(released = %outcome.released, available = %outcome.available, "reservation released");
            self.publish(StockEvent::ReservationReleased(ReservationReleased {
                product_id,
                warehouse_id,
                quantity: outcome.released,
                quantity_available: outcome.available,
                occurred_at: Utc::now(),
            }));
        }
        Ok(outcome.available)
    }
}

fn ensure_positive(quantity: Decimal, key: StockKey) -> Result<(), LedgerError> {
    if quantity <= Decimal::ZERO {
        return Err(LedgerError::from_stock(
            StockError::InvalidQuantity(format!("quantity must be positive, got {quantity}")),
            key,
        ));
    }
    Ok(())
}
