use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use sqlx::PgPool;
use thiserror::Error;

use stockledger_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use stockledger_infra::{
    InMemoryMasterData, InMemoryStockStore, InventoryLedger, LedgerConfig, LedgerError, MasterData,
    PostgresMasterData, PostgresStockStore, StockStore, StoreError,
};

use crate::app::notifications;
use crate::config::ApiConfig;

pub type EventBusHandle = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// The ledger as wired by the API: store and master data chosen at startup.
pub type Ledger = InventoryLedger<Arc<dyn StockStore>, Arc<dyn MasterData>, EventBusHandle>;

/// Shared state handed to every handler.
pub struct AppServices {
    ledger: Arc<Ledger>,
    /// Writable catalog; only present when master data lives in memory.
    catalog: Option<Arc<InMemoryMasterData>>,
    request_timeout: Duration,
}

/// Why a handler could not get an answer from the ledger.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// A read ran past the request timeout. Nothing changed; safe to repeat.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// A write ran past the request timeout. It keeps running and may still
    /// commit, so the caller must check stock before resubmitting.
    #[error("write did not finish within {0:?}; it may still be applied")]
    OutcomeUnknown(Duration),

    #[error("ledger task failed: {0}")]
    Join(String),
}

impl AppServices {
    pub fn catalog(&self) -> Option<&Arc<InMemoryMasterData>> {
        self.catalog.as_ref()
    }

    /// Subscribe to stock notifications published after committed changes.
    pub fn subscribe_events(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.ledger.bus().subscribe()
    }

    /// Run a read-only ledger call, bounded by the request timeout.
    pub async fn run<T, F>(&self, f: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
    {
        self.execute(f, CallError::Timeout).await
    }

    /// Run a ledger call that changes stock, bounded by the request timeout.
    ///
    /// The blocking task cannot be cancelled once started, so a timeout
    /// reports the outcome as unknown rather than inviting a blind retry.
    pub async fn run_write<T, F>(&self, f: F) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
    {
        self.execute(f, CallError::OutcomeUnknown).await
    }

    /// Ledger calls take blocking locks (and block on Postgres in persistent
    /// mode), so they run on the blocking pool.
    async fn execute<T, F>(
        &self,
        f: F,
        on_timeout: fn(Duration) -> CallError,
    ) -> Result<T, CallError>
    where
        T: Send + 'static,
        F: FnOnce(&Ledger) -> Result<T, LedgerError> + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        let task = tokio::task::spawn_blocking(move || f(&ledger));

        match tokio::time::timeout(self.request_timeout, task).await {
            Ok(Ok(result)) => result.map_err(CallError::from),
            Ok(Err(join)) => Err(CallError::Join(join.to_string())),
            Err(_) => {
                let err = on_timeout(self.request_timeout);
                tracing::warn!(
                    timeout_ms = self.request_timeout.as_millis() as u64,
                    error = %err,
                    "ledger call timed out"
                );
                Err(err)
            }
        }
    }
}

pub async fn build_services(config: &ApiConfig) -> Result<AppServices, StoreError> {
    if config.use_persistent {
        let database_url = config.database_url.as_deref().ok_or_else(|| {
            StoreError::Backend("DATABASE_URL must be set when USE_PERSISTENT_STORES=true".to_string())
        })?;
        return build_persistent_services(database_url, config).await;
    }

    Ok(build_in_memory_services(config))
}

fn build_in_memory_services(config: &ApiConfig) -> AppServices {
    // In-memory wiring (dev/test): stock store + master data + bus.
    let store: Arc<dyn StockStore> = Arc::new(InMemoryStockStore::new());
    let catalog = Arc::new(InMemoryMasterData::new());
    let master_data: Arc<dyn MasterData> = catalog.clone();

    tracing::info!("using in-memory stock store");

    AppServices {
        ledger: Arc::new(ledger(store, master_data, config.ledger.clone())),
        catalog: Some(catalog),
        request_timeout: config.request_timeout,
    }
}

async fn build_persistent_services(
    database_url: &str,
    config: &ApiConfig,
) -> Result<AppServices, StoreError> {
    let pool = PgPool::connect(database_url)
        .await
        .map_err(|e| StoreError::Backend(format!("connect to Postgres: {e}")))?;

    let stock_store = PostgresStockStore::new(pool.clone());
    stock_store.ensure_schema().await?;

    let master_data = PostgresMasterData::new(pool);
    master_data.ensure_schema().await?;

    tracing::info!("using Postgres stock store");

    let store: Arc<dyn StockStore> = Arc::new(stock_store);
    let master_data: Arc<dyn MasterData> = Arc::new(master_data);

    Ok(AppServices {
        ledger: Arc::new(ledger(store, master_data, config.ledger.clone())),
        catalog: None,
        request_timeout: config.request_timeout,
    })
}

fn ledger(
    store: Arc<dyn StockStore>,
    master_data: Arc<dyn MasterData>,
    config: LedgerConfig,
) -> Ledger {
    let bus: EventBusHandle = Arc::new(InMemoryEventBus::new());
    if let Err(e) = notifications::spawn_event_log(bus.subscribe()) {
        tracing::warn!(error = %e, "failed to start notification log; events will only reach subscribers");
    }
    InventoryLedger::with_config(store, master_data, bus, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use stockledger_core::{ProductId, WarehouseId};
    use stockledger_infra::{ProductInfo, WarehouseInfo};
    use stockledger_inventory::{MovementRequest, MovementType};

    fn services(timeout: Duration) -> (AppServices, ProductId, WarehouseId) {
        let config = ApiConfig {
            request_timeout: timeout,
            ..ApiConfig::in_memory()
        };
        let services = build_in_memory_services(&config);
        let product_id = ProductId::new();
        let warehouse_id = WarehouseId::new();
        let catalog = services.catalog().unwrap();
        catalog.upsert_product(ProductInfo::new(product_id, "SKU-1")).unwrap();
        catalog.upsert_warehouse(WarehouseInfo::new(warehouse_id, "WH-1")).unwrap();
        (services, product_id, warehouse_id)
    }

    #[tokio::test]
    async fn slow_write_reports_an_unknown_outcome() {
        let (services, product_id, warehouse_id) = services(Duration::from_millis(20));

        let err = services
            .run_write(move |ledger| {
                std::thread::sleep(Duration::from_millis(100));
                ledger.process_movement(MovementRequest::new(
                    product_id,
                    warehouse_id,
                    MovementType::Purchase,
                    dec!(10),
                ))
            })
            .await
            .map(|_| ())
            .unwrap_err();
        assert!(matches!(err, CallError::OutcomeUnknown(_)));

        // The write was not cancelled; it lands after the caller gave up.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let available = services
            .run(move |ledger| ledger.available_stock(product_id, warehouse_id))
            .await
            .unwrap();
        assert_eq!(available, dec!(10));
    }

    #[tokio::test]
    async fn slow_read_times_out_as_retryable() {
        let (services, product_id, warehouse_id) = services(Duration::from_millis(20));

        let err = services
            .run(move |ledger| {
                std::thread::sleep(Duration::from_millis(100));
                ledger.available_stock(product_id, warehouse_id)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CallError::Timeout(_)));
    }

    #[tokio::test]
    async fn committed_movements_reach_subscribers() {
        let (services, product_id, warehouse_id) = services(Duration::from_secs(5));
        let subscription = services.subscribe_events();

        services
            .run_write(move |ledger| {
                ledger.process_movement(MovementRequest::new(
                    product_id,
                    warehouse_id,
                    MovementType::In,
                    dec!(3),
                ))
            })
            .await
            .unwrap();

        let envelope = subscription.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(envelope.event_type(), "inventory.stock.movement_recorded");
    }
}
