//! Stock and movement persistence boundary.
//!
//! A store owns two things: the current `StockRecord` per (product, warehouse)
//! and the append-only movement log. `commit` writes both in one atomic step,
//! so a movement row exists if and only if its stock change was applied.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;
pub use query::{MovementFilter, MovementPage, Pagination, StockCondition, StockFilter};
pub use r#trait::{StockCommit, StockStore, StoreError};
