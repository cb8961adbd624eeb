//! Infrastructure layer: stock storage, master data lookups, configuration
//! and the ledger service that ties them together.

pub mod config;
pub mod ledger;
pub mod master_data;
pub mod store;


pub use config::{ConfigError, LedgerConfig};
pub use ledger::{InventoryLedger, LedgerError, StockSnapshot};
pub use master_data::{InMemoryMasterData, MasterData, PostgresMasterData, ProductInfo, WarehouseInfo};
pub use store::{
    InMemoryStockStore, MovementFilter, MovementPage, Pagination, PostgresStockStore, StockCommit,
    StockCondition, StockFilter, StockStore, StoreError,
};
