use rust_decimal::Decimal;
use thiserror::Error;

/// Stock rule violations.
///
/// These are deterministic business failures; callers decide whether to
/// resubmit with an adjusted quantity. Product/warehouse context is attached
/// by the service layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StockError {
    /// Zero or malformed quantity, unknown type, or an oversized text field.
    #[error("invalid movement: {0}")]
    InvalidMovement(String),

    /// Reservation quantities must be strictly positive.
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    /// A decrease would drive on-hand negative (or below outstanding reservations).
    #[error("insufficient stock: requested {requested}, on hand {on_hand}, available {available}")]
    InsufficientStock {
        requested: Decimal,
        on_hand: Decimal,
        available: Decimal,
    },

    /// A reservation asks for more than is currently available.
    #[error("insufficient available stock: requested {requested}, available {available}")]
    InsufficientAvailableStock {
        requested: Decimal,
        available: Decimal,
    },
}
