//! Postgres-backed stock store.
//!
//! Stock records live in `inventory_stock` (one row per product/warehouse),
//! the movement log in `stock_movements`, and the per-day numbering counter in
//! `movement_sequences`. `commit` runs in a single transaction that locks the
//! stock row with `SELECT ... FOR UPDATE` before checking its version.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError | Scenario |
//! |------------|----------------------|------------|----------|
//! | Database (unique violation) on stock insert | `23505` | `Concurrency` | Two writers created the same stock row |
//! | Database (unique violation) on movement insert | `23505` | `DuplicateMovement` | Movement number collision |
//! | Database (check constraint violation) | `23514` | `InvalidWrite` | Negative or inconsistent quantities |
//! | Any other | N/A | `Backend` | Network errors, pool closed, decode failures |
//!
//! ## Runtime
//!
//! `StockStore` is synchronous. The trait impl drives the async queries with
//! `block_in_place` + `Handle::block_on`, which needs a multi-threaded tokio
//! runtime in scope.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use stockledger_core::{MovementId, ProductId, Versioned, WarehouseId};
use stockledger_inventory::{
    MovementNumber, MovementRecord, MovementType, RestoreStock, StockKey, StockRecord,
    StockThresholds,
};

use super::query::{MovementFilter, MovementPage, Pagination, StockCondition, StockFilter};
use super::r#trait::{StockCommit, StockStore, StoreError};

/// DDL for the tables this store reads and writes. Idempotent.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS inventory_stock (
    product_id          UUID        NOT NULL,
    warehouse_id        UUID        NOT NULL,
    quantity_on_hand    NUMERIC     NOT NULL CHECK (quantity_on_hand >= 0),
    quantity_reserved   NUMERIC     NOT NULL CHECK (quantity_reserved >= 0),
    quantity_available  NUMERIC     NOT NULL,
    minimum_stock       NUMERIC     NOT NULL DEFAULT 0,
    maximum_stock       NUMERIC,
    location            VARCHAR(100),
    version             BIGINT      NOT NULL CHECK (version > 0),
    created_at          TIMESTAMPTZ NOT NULL,
    updated_at          TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (product_id, warehouse_id),
    CHECK (quantity_reserved <= quantity_on_hand),
    CHECK (quantity_available = quantity_on_hand - quantity_reserved)
);

CREATE TABLE IF NOT EXISTS stock_movements (
    ledger_seq          BIGSERIAL    PRIMARY KEY,
    id                  UUID         NOT NULL UNIQUE,
    movement_number     VARCHAR(64)  NOT NULL UNIQUE,
    product_id          UUID         NOT NULL,
    warehouse_id        UUID         NOT NULL,
    movement_type       VARCHAR(20)  NOT NULL,
    quantity            NUMERIC      NOT NULL,
    unit_cost           NUMERIC      NOT NULL DEFAULT 0,
    total_cost          NUMERIC      NOT NULL DEFAULT 0,
    quantity_before     NUMERIC      NOT NULL,
    quantity_after      NUMERIC      NOT NULL,
    movement_date       TIMESTAMPTZ  NOT NULL,
    notes               VARCHAR(1000),
    reference_type      VARCHAR(100),
    reference_id        BIGINT,
    reference_number    VARCHAR(100)
);

CREATE INDEX IF NOT EXISTS idx_stock_movements_stock
    ON stock_movements (product_id, warehouse_id, movement_date DESC);

CREATE INDEX IF NOT EXISTS idx_stock_movements_reference
    ON stock_movements (reference_type, reference_id);

CREATE TABLE IF NOT EXISTS movement_sequences (
    day         DATE   PRIMARY KEY,
    last_value  BIGINT NOT NULL
);
"#;

const STOCK_COLUMNS: &str = "product_id, warehouse_id, quantity_on_hand, quantity_reserved, \
     minimum_stock, maximum_stock, location, version, created_at, updated_at";

const MOVEMENT_COLUMNS: &str = "id, movement_number, product_id, warehouse_id, movement_type, \
     quantity, unit_cost, total_cost, quantity_before, quantity_after, movement_date, notes, \
     reference_type, reference_id, reference_number";

/// Postgres-backed stock store.
///
/// Uses SQLx connection pool which is thread-safe (Arc + Send + Sync).
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: Arc<PgPool>,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(stock = %key), err)]
    pub async fn fetch_stock(&self, key: StockKey) -> Result<Option<StockRecord>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {STOCK_COLUMNS} FROM inventory_stock WHERE product_id = $1 AND warehouse_id = $2"
        ))
        .bind(key.product_id.as_uuid())
        .bind(key.warehouse_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("fetch_stock", e))?;

        row.map(|r| decode::<StockRow>(&r).map(StockRecord::from))
            .transpose()
    }

    /// Write the record and its movement in one transaction.
    #[instrument(
        skip(self, commit),
        fields(
            stock = %commit.key(),
            expected_version = ?commit.expected,
            with_movement = commit.movement.is_some()
        ),
        err
    )]
    pub async fn commit_stock(&self, commit: StockCommit) -> Result<(), StoreError> {
        commit.validate()?;
        let key = commit.key();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let current = lock_stock_version(&mut tx, key).await?;
        if !commit.expected.matches(current) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(StoreError::Concurrency(format!(
                "stock {key}: expected {:?}, found {current:?}",
                commit.expected
            )));
        }

        match current {
            None => insert_stock(&mut tx, &commit.record).await?,
            Some(version) => update_stock(&mut tx, &commit.record, version).await?,
        }

        if let Some(movement) = &commit.movement {
            insert_movement(&mut tx, movement).await?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }

    pub async fn allocate_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
        let value: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO movement_sequences (day, last_value)
            VALUES ($1, 1)
            ON CONFLICT (day) DO UPDATE SET last_value = movement_sequences.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(day)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("allocate_sequence", e))?;

        Ok(value as u64)
    }

    pub async fn fetch_stock_list(&self, filter: &StockFilter) -> Result<Vec<StockRecord>, StoreError> {
        let condition = filter.condition.map(|c| match c {
            StockCondition::LowStock => "low_stock",
            StockCondition::OutOfStock => "out_of_stock",
        });

        let rows = sqlx::query(&format!(
            r#"
            SELECT {STOCK_COLUMNS}
            FROM inventory_stock
            WHERE ($1::uuid IS NULL OR product_id = $1)
                AND ($2::uuid IS NULL OR warehouse_id = $2)
                AND ($3::text IS NULL
                    OR ($3 = 'low_stock' AND quantity_on_hand <= minimum_stock)
                    OR ($3 = 'out_of_stock' AND quantity_on_hand = 0))
            ORDER BY product_id, warehouse_id
            "#
        ))
        .bind(filter.product_id.map(|id| *id.as_uuid()))
        .bind(filter.warehouse_id.map(|id| *id.as_uuid()))
        .bind(condition)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_stock", e))?;

        rows.iter()
            .map(|r| decode::<StockRow>(r).map(StockRecord::from))
            .collect()
    }

    pub async fn fetch_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        const WHERE: &str = r#"
            WHERE ($1::uuid IS NULL OR product_id = $1)
                AND ($2::uuid IS NULL OR warehouse_id = $2)
                AND ($3::text IS NULL OR movement_type = $3)
                AND ($4::text IS NULL OR reference_type = $4)
                AND ($5::bigint IS NULL OR reference_id = $5)
                AND ($6::timestamptz IS NULL OR movement_date >= $6)
                AND ($7::timestamptz IS NULL OR movement_date <= $7)
        "#;

        let product = filter.product_id.map(|id| *id.as_uuid());
        let warehouse = filter.warehouse_id.map(|id| *id.as_uuid());
        let movement_type = filter.movement_type.map(MovementType::as_str);

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM stock_movements {WHERE}"))
            .bind(product)
            .bind(warehouse)
            .bind(movement_type)
            .bind(filter.reference_type.as_deref())
            .bind(filter.reference_id)
            .bind(filter.occurred_after)
            .bind(filter.occurred_before)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("count_movements", e))?;

        let rows = sqlx::query(&format!(
            "SELECT {MOVEMENT_COLUMNS} FROM stock_movements {WHERE} \
             ORDER BY movement_date DESC, ledger_seq DESC LIMIT $8 OFFSET $9"
        ))
        .bind(product)
        .bind(warehouse)
        .bind(movement_type)
        .bind(filter.reference_type.as_deref())
        .bind(filter.reference_id)
        .bind(filter.occurred_after)
        .bind(filter.occurred_before)
        .bind(i64::from(pagination.limit))
        .bind(i64::from(pagination.offset))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("query_movements", e))?;

        let movements = rows
            .iter()
            .map(|r| decode::<MovementRow>(r).and_then(MovementRecord::try_from))
            .collect::<Result<Vec<_>, _>>()?;

        let total = total as u64;
        Ok(MovementPage {
            movements,
            total,
            pagination,
            has_more: pagination.has_more(total),
        })
    }

    fn block_on<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, StoreError> {
        let handle = tokio::runtime::Handle::try_current().map_err(|_| {
            StoreError::Backend(
                "PostgresStockStore requires a tokio runtime in the calling context".to_string(),
            )
        })?;
        tokio::task::block_in_place(|| handle.block_on(fut))
    }
}

async fn lock_stock_version(
    tx: &mut Transaction<'_, Postgres>,
    key: StockKey,
) -> Result<Option<u64>, StoreError> {
    let version: Option<i64> = sqlx::query_scalar(
        "SELECT version FROM inventory_stock WHERE product_id = $1 AND warehouse_id = $2 FOR UPDATE",
    )
    .bind(key.product_id.as_uuid())
    .bind(key.warehouse_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("lock_stock", e))?;

    Ok(version.map(|v| v as u64))
}

async fn insert_stock(
    tx: &mut Transaction<'_, Postgres>,
    record: &StockRecord,
) -> Result<(), StoreError> {
    let thresholds = record.thresholds();
    sqlx::query(
        r#"
        INSERT INTO inventory_stock (
            product_id, warehouse_id, quantity_on_hand, quantity_reserved, quantity_available,
            minimum_stock, maximum_stock, location, version, created_at, updated_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        "#,
    )
    .bind(record.product_id().as_uuid())
    .bind(record.warehouse_id().as_uuid())
    .bind(record.quantity_on_hand())
    .bind(record.quantity_reserved())
    .bind(record.quantity_available())
    .bind(thresholds.minimum_stock)
    .bind(thresholds.maximum_stock)
    .bind(record.location())
    .bind(record.version() as i64)
    .bind(record.created_at())
    .bind(record.updated_at())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        // Lost the race to create the row.
        if is_unique_violation(&e) {
            StoreError::Concurrency(format!("stock {} was created concurrently", record.key()))
        } else {
            map_sqlx_error("insert_stock", e)
        }
    })?;
    Ok(())
}

async fn update_stock(
    tx: &mut Transaction<'_, Postgres>,
    record: &StockRecord,
    read_version: u64,
) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_stock
        SET quantity_on_hand = $3,
            quantity_reserved = $4,
            quantity_available = $5,
            location = $6,
            version = $7,
            updated_at = $8
        WHERE product_id = $1 AND warehouse_id = $2 AND version = $9
        "#,
    )
    .bind(record.product_id().as_uuid())
    .bind(record.warehouse_id().as_uuid())
    .bind(record.quantity_on_hand())
    .bind(record.quantity_reserved())
    .bind(record.quantity_available())
    .bind(record.location())
    .bind(record.version() as i64)
    .bind(record.updated_at())
    .bind(read_version as i64)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("update_stock", e))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Concurrency(format!(
            "stock {} changed after it was locked",
            record.key()
        )));
    }
    Ok(())
}

async fn insert_movement(
    tx: &mut Transaction<'_, Postgres>,
    movement: &MovementRecord,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO stock_movements (
            id, movement_number, product_id, warehouse_id, movement_type, quantity,
            unit_cost, total_cost, quantity_before, quantity_after, movement_date, notes,
            reference_type, reference_id, reference_number
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
        "#,
    )
    .bind(movement.id.as_uuid())
    .bind(movement.movement_number.as_str())
    .bind(movement.product_id.as_uuid())
    .bind(movement.warehouse_id.as_uuid())
    .bind(movement.movement_type.as_str())
    .bind(movement.quantity)
    .bind(movement.unit_cost)
    .bind(movement.total_cost)
    .bind(movement.quantity_before)
    .bind(movement.quantity_after)
    .bind(movement.movement_date)
    .bind(movement.notes.as_deref())
    .bind(movement.reference_type.as_deref())
    .bind(movement.reference_id)
    .bind(movement.reference_number.as_deref())
    .execute(&mut **tx)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            StoreError::DuplicateMovement(movement.movement_number.to_string())
        } else {
            map_sqlx_error("insert_movement", e)
        }
    })?;
    Ok(())
}

fn decode<'r, T>(row: &'r PgRow) -> Result<T, StoreError>
where
    T: FromRow<'r, PgRow>,
{
    T::from_row(row).map_err(|e| StoreError::Backend(format!("failed to decode row: {e}")))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {operation}: {}", db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::Concurrency(msg),
                Some("23514") => StoreError::InvalidWrite(msg),
                _ => StoreError::Backend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Backend(format!("connection pool closed in {operation}"))
        }
        _ => StoreError::Backend(format!("sqlx error in {operation}: {err}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

// SQLx row types

#[derive(Debug)]
struct StockRow {
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity_on_hand: Decimal,
    quantity_reserved: Decimal,
    minimum_stock: Decimal,
    maximum_stock: Option<Decimal>,
    location: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for StockRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(StockRow {
            product_id: row.try_get("product_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            quantity_on_hand: row.try_get("quantity_on_hand")?,
            quantity_reserved: row.try_get("quantity_reserved")?,
            minimum_stock: row.try_get("minimum_stock")?,
            maximum_stock: row.try_get("maximum_stock")?,
            location: row.try_get("location")?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

impl From<StockRow> for StockRecord {
    fn from(row: StockRow) -> Self {
        StockRecord::restore(RestoreStock {
            key: StockKey::new(
                ProductId::from_uuid(row.product_id),
                WarehouseId::from_uuid(row.warehouse_id),
            ),
            quantity_on_hand: row.quantity_on_hand,
            quantity_reserved: row.quantity_reserved,
            thresholds: StockThresholds {
                minimum_stock: row.minimum_stock,
                maximum_stock: row.maximum_stock,
            },
            location: row.location,
            version: row.version as u64,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug)]
struct MovementRow {
    id: Uuid,
    movement_number: String,
    product_id: Uuid,
    warehouse_id: Uuid,
    movement_type: String,
    quantity: Decimal,
    unit_cost: Decimal,
    total_cost: Decimal,
    quantity_before: Decimal,
    quantity_after: Decimal,
    movement_date: DateTime<Utc>,
    notes: Option<String>,
    reference_type: Option<String>,
    reference_id: Option<i64>,
    reference_number: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for MovementRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(MovementRow {
            id: row.try_get("id")?,
            movement_number: row.try_get("movement_number")?,
            product_id: row.try_get("product_id")?,
            warehouse_id: row.try_get("warehouse_id")?,
            movement_type: row.try_get("movement_type")?,
            quantity: row.try_get("quantity")?,
            unit_cost: row.try_get("unit_cost")?,
            total_cost: row.try_get("total_cost")?,
            quantity_before: row.try_get("quantity_before")?,
            quantity_after: row.try_get("quantity_after")?,
            movement_date: row.try_get("movement_date")?,
            notes: row.try_get("notes")?,
            reference_type: row.try_get("reference_type")?,
            reference_id: row.try_get("reference_id")?,
            reference_number: row.try_get("reference_number")?,
        })
    }
}

impl TryFrom<MovementRow> for MovementRecord {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = row
            .movement_type
            .parse::<MovementType>()
            .map_err(|e| StoreError::Backend(format!("stored movement_type: {e}")))?;
        let movement_number = MovementNumber::parse(&row.movement_number)
            .map_err(|e| StoreError::Backend(format!("stored movement_number: {e}")))?;

        Ok(MovementRecord {
            id: MovementId::from_uuid(row.id),
            movement_number,
            product_id: ProductId::from_uuid(row.product_id),
            warehouse_id: WarehouseId::from_uuid(row.warehouse_id),
            movement_type,
            quantity: row.quantity,
            unit_cost: row.unit_cost,
            total_cost: row.total_cost,
            quantity_before: row.quantity_before,
            quantity_after: row.quantity_after,
            movement_date: row.movement_date,
            notes: row.notes,
            reference_type: row.reference_type,
            reference_id: row.reference_id,
            reference_number: row.reference_number,
        })
    }
}

impl StockStore for PostgresStockStore {
    fn load_stock(&self, key: StockKey) -> Result<Option<StockRecord>, StoreError> {
        self.block_on(self.fetch_stock(key))
    }

    fn commit(&self, commit: StockCommit) -> Result<(), StoreError> {
        self.block_on(self.commit_stock(commit))
    }

    fn next_movement_sequence(&self, day: NaiveDate) -> Result<u64, StoreError> {
        self.block_on(self.allocate_sequence(day))
    }

    fn list_stock(&self, filter: &StockFilter) -> Result<Vec<StockRecord>, StoreError> {
        self.block_on(self.fetch_stock_list(filter))
    }

    fn query_movements(
        &self,
        filter: &MovementFilter,
        pagination: Pagination,
    ) -> Result<MovementPage, StoreError> {
        self.block_on(self.fetch_movements(filter, pagination))
    }
}
