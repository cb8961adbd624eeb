use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{MovementId, ProductId, WarehouseId};

use crate::error::StockError;
use crate::number::MovementNumber;
use crate::stock::QuantityChange;

/// Longest accepted `notes` text, in characters.
pub const MAX_NOTES_LEN: usize = 1000;

/// Longest accepted `reference_type` / `reference_number`, in characters.
pub const MAX_REFERENCE_LEN: usize = 100;

/// Kind of stock movement.
///
/// Serialized in upper case; deserialization goes through `FromStr`, so any
/// case is accepted and unknown names fail as `InvalidMovement`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MovementType {
    In,
    Out,
    Adjustment,
    Transfer,
    Sale,
    Purchase,
    Return,
    Production,
}

/// Effect of a movement on on-hand quantity.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Direction {
    Increase,
    Decrease,
}

impl MovementType {
    pub const ALL: [MovementType; 8] = [
        MovementType::In,
        MovementType::Out,
        MovementType::Adjustment,
        MovementType::Transfer,
        MovementType::Sale,
        MovementType::Purchase,
        MovementType::Return,
        MovementType::Production,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MovementType::In => "IN",
            MovementType::Out => "OUT",
            MovementType::Adjustment => "ADJUSTMENT",
            MovementType::Transfer => "TRANSFER",
            MovementType::Sale => "SALE",
            MovementType::Purchase => "PURCHASE",
            MovementType::Return => "RETURN",
            MovementType::Production => "PRODUCTION",
        }
    }

    /// Direction for a caller-supplied quantity.
    ///
    /// Only ADJUSTMENT looks at the sign: a negative adjustment reduces stock.
    pub fn direction(self, quantity: Decimal) -> Direction {
        match self {
            MovementType::In
            | MovementType::Purchase
            | MovementType::Return
            | MovementType::Production => Direction::Increase,
            MovementType::Out | MovementType::Sale | MovementType::Transfer => Direction::Decrease,
            MovementType::Adjustment if quantity.is_sign_negative() => Direction::Decrease,
            MovementType::Adjustment => Direction::Increase,
        }
    }

    /// Signed change to on-hand for `quantity` of this type.
    pub fn signed_delta(self, quantity: Decimal) -> Decimal {
        match self.direction(quantity) {
            Direction::Increase => quantity.abs(),
            Direction::Decrease => -quantity.abs(),
        }
    }
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementType {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        MovementType::ALL
            .into_iter()
            .find(|t| t.as_str() == upper)
            .ok_or_else(|| StockError::InvalidMovement(format!("unknown movement type '{s}'")))
    }
}

impl<'de> Deserialize<'de> for MovementType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A requested stock movement, before it is applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRequest {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement_type: MovementType,
    /// Positive magnitude, or a signed value for ADJUSTMENT.
    pub quantity: Decimal,
    #[serde(default)]
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub reference_type: Option<String>,
    #[serde(default)]
    pub reference_id: Option<i64>,
    #[serde(default)]
    pub reference_number: Option<String>,
}

impl MovementRequest {
    pub fn new(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        movement_type: MovementType,
        quantity: Decimal,
    ) -> Self {
        Self {
            product_id,
            warehouse_id,
            movement_type,
            quantity,
            unit_cost: None,
            notes: None,
            reference_type: None,
            reference_id: None,
            reference_number: None,
        }
    }

    pub fn with_unit_cost(mut self, unit_cost: Decimal) -> Self {
        self.unit_cost = Some(unit_cost);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_reference(
        mut self,
        reference_type: impl Into<String>,
        reference_id: i64,
        reference_number: impl Into<String>,
    ) -> Self {
        self.reference_type = Some(reference_type.into());
        self.reference_id = Some(reference_id);
        self.reference_number = Some(reference_number.into());
        self
    }

    pub fn direction(&self) -> Direction {
        self.movement_type.direction(self.quantity)
    }

    /// Absolute number of units moved.
    pub fn magnitude(&self) -> Decimal {
        self.quantity.abs()
    }

    /// `|quantity| × unit_cost`, or an error when it leaves the decimal range.
    pub fn total_cost(&self) -> Result<Decimal, StockError> {
        let unit_cost = self.unit_cost.unwrap_or(Decimal::ZERO);
        self.magnitude().checked_mul(unit_cost).ok_or_else(|| {
            StockError::InvalidMovement(format!(
                "total cost of {} at {unit_cost} is out of range",
                self.magnitude()
            ))
        })
    }

    /// Shape checks that do not depend on current stock.
    pub fn validate(&self) -> Result<(), StockError> {
        if self.quantity.is_zero() {
            return Err(StockError::InvalidMovement("quantity cannot be zero".to_string()));
        }
        if self.quantity.is_sign_negative() && self.movement_type != MovementType::Adjustment {
            return Err(StockError::InvalidMovement(format!(
                "{} quantity must be positive",
                self.movement_type
            )));
        }
        if let Some(cost) = self.unit_cost {
            if cost.is_sign_negative() && !cost.is_zero() {
                return Err(StockError::InvalidMovement(
                    "unit_cost cannot be negative".to_string(),
                ));
            }
        }
        self.total_cost()?;
        check_len("notes", self.notes.as_deref(), MAX_NOTES_LEN)?;
        check_len("reference_type", self.reference_type.as_deref(), MAX_REFERENCE_LEN)?;
        check_len("reference_number", self.reference_number.as_deref(), MAX_REFERENCE_LEN)?;
        Ok(())
    }
}

fn check_len(field: &str, value: Option<&str>, max: usize) -> Result<(), StockError> {
    match value {
        Some(v) if v.chars().count() > max => Err(StockError::InvalidMovement(format!(
            "{field} exceeds {max} characters"
        ))),
        _ => Ok(()),
    }
}

/// Immutable ledger entry for one applied movement.
///
/// `quantity_before` / `quantity_after` snapshot on-hand around the change and
/// always reconcile with `movement_type` + `quantity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovementRecord {
    pub id: MovementId,
    pub movement_number: MovementNumber,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub movement_type: MovementType,
    pub quantity: Decimal,
    pub unit_cost: Decimal,
    pub total_cost: Decimal,
    pub quantity_before: Decimal,
    pub quantity_after: Decimal,
    pub movement_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub reference_type: Option<String>,
    pub reference_id: Option<i64>,
    pub reference_number: Option<String>,
}

impl MovementRecord {
    /// Build the ledger entry for a request that was just applied.
    pub fn from_applied(
        id: MovementId,
        movement_number: MovementNumber,
        request: &MovementRequest,
        change: &QuantityChange,
        movement_date: DateTime<Utc>,
    ) -> Result<Self, StockError> {
        let quantity = match request.movement_type {
            MovementType::Adjustment => request.quantity,
            _ => request.magnitude(),
        };
        let unit_cost = request.unit_cost.unwrap_or(Decimal::ZERO);
        let total_cost = request.total_cost()?;

        Ok(Self {
            id,
            movement_number,
            product_id: request.product_id,
            warehouse_id: request.warehouse_id,
            movement_type: request.movement_type,
            quantity,
            unit_cost,
            total_cost,
            quantity_before: change.before,
            quantity_after: change.after,
            movement_date,
            notes: request.notes.clone(),
            reference_type: request.reference_type.clone(),
            reference_id: request.reference_id,
            reference_number: request.reference_number.clone(),
        })
    }

    pub fn signed_delta(&self) -> Decimal {
        self.movement_type.signed_delta(self.quantity)
    }

    /// Audit check: after == before + signed delta.
    pub fn reconciles(&self) -> bool {
        self.quantity_after == self.quantity_before + self.signed_delta()
    }
}
