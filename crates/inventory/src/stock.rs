use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, Versioned, WarehouseId};

use crate::error::StockError;
use crate::movement::{Direction, MovementRequest};

/// Unique key of a stock record.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
}

impl StockKey {
    pub fn new(product_id: ProductId, warehouse_id: WarehouseId) -> Self {
        Self {
            product_id,
            warehouse_id,
        }
    }
}

impl core::fmt::Display for StockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.product_id, self.warehouse_id)
    }
}

/// Classification thresholds copied from the product master at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StockThresholds {
    pub minimum_stock: Decimal,
    pub maximum_stock: Option<Decimal>,
}

/// How decrease movements treat outstanding reservations.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecreasePolicy {
    /// A decrease may not eat into reserved units (`available ≥ quantity`).
    #[default]
    RespectReservations,
    /// Only on-hand is checked; reservations above the new on-hand are trimmed
    /// and the ledger announces the trimmed units as a release.
    OnHandOnly,
}

impl core::str::FromStr for DecreasePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "respect_reservations" => Ok(DecreasePolicy::RespectReservations),
            "on_hand_only" => Ok(DecreasePolicy::OnHandOnly),
            other => Err(format!(
                "unknown decrease policy '{other}' (expected respect_reservations or on_hand_only)"
            )),
        }
    }
}

/// On-hand snapshot around an applied movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantityChange {
    pub before: Decimal,
    pub after: Decimal,
    /// Reserved units dropped because on-hand fell below them (`OnHandOnly` only).
    pub reserved_trimmed: Decimal,
}

/// Result of releasing a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    pub released: Decimal,
    pub available: Decimal,
    /// The request asked for more than was reserved and was floored at zero.
    pub clamped: bool,
}

/// Persisted state used to rebuild a record from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreStock {
    pub key: StockKey,
    pub quantity_on_hand: Decimal,
    pub quantity_reserved: Decimal,
    pub thresholds: StockThresholds,
    pub location: Option<String>,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stock held for one product in one warehouse.
///
/// `quantity_available` is rewritten by every mutation and is never set
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockRecord {
    product_id: ProductId,
    warehouse_id: WarehouseId,
    quantity_on_hand: Decimal,
    quantity_reserved: Decimal,
    quantity_available: Decimal,
    minimum_stock: Decimal,
    maximum_stock: Option<Decimal>,
    location: Option<String>,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl StockRecord {
    /// A never-persisted record with all quantities at zero.
    pub fn open(key: StockKey, thresholds: StockThresholds, now: DateTime<Utc>) -> Self {
        Self {
            product_id: key.product_id,
            warehouse_id: key.warehouse_id,
            quantity_on_hand: Decimal::ZERO,
            quantity_reserved: Decimal::ZERO,
            quantity_available: Decimal::ZERO,
            minimum_stock: thresholds.minimum_stock,
            maximum_stock: thresholds.maximum_stock,
            location: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn restore(state: RestoreStock) -> Self {
        let mut record = Self {
            product_id: state.key.product_id,
            warehouse_id: state.key.warehouse_id,
            quantity_on_hand: state.quantity_on_hand,
            quantity_reserved: state.quantity_reserved,
            quantity_available: Decimal::ZERO,
            minimum_stock: state.thresholds.minimum_stock,
            maximum_stock: state.thresholds.maximum_stock,
            location: state.location,
            version: state.version,
            created_at: state.created_at,
            updated_at: state.updated_at,
        };
        record.recompute_available();
        record
    }

    pub fn key(&self) -> StockKey {
        StockKey::new(self.product_id, self.warehouse_id)
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn warehouse_id(&self) -> WarehouseId {
        self.warehouse_id
    }

    pub fn quantity_on_hand(&self) -> Decimal {
        self.quantity_on_hand
    }

    pub fn quantity_reserved(&self) -> Decimal {
        self.quantity_reserved
    }

    pub fn quantity_available(&self) -> Decimal {
        self.quantity_available
    }

    pub fn thresholds(&self) -> StockThresholds {
        StockThresholds {
            minimum_stock: self.minimum_stock,
            maximum_stock: self.maximum_stock,
        }
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_persisted(&self) -> bool {
        self.version > 0
    }

    pub fn is_low_stock(&self) -> bool {
        self.quantity_on_hand <= self.minimum_stock
    }

    pub fn is_out_of_stock(&self) -> bool {
        self.quantity_on_hand.is_zero()
    }

    /// Apply a validated movement to on-hand.
    ///
    /// On error the record is left untouched.
    pub fn apply_movement(
        &mut self,
        request: &MovementRequest,
        policy: DecreasePolicy,
        now: DateTime<Utc>,
    ) -> Result<QuantityChange, StockError> {
        request.validate()?;

        let before = self.quantity_on_hand;
        let magnitude = request.magnitude();
        let mut reserved_trimmed = Decimal::ZERO;

        match request.direction() {
            Direction::Increase => {
                self.quantity_on_hand =
                    self.quantity_on_hand.checked_add(magnitude).ok_or_else(|| {
                        StockError::InvalidMovement(format!(
                            "adding {magnitude} to on-hand {} is out of range",
                            self.quantity_on_hand
                        ))
                    })?;
            }
            Direction::Decrease => {
                let blocked = match policy {
                    DecreasePolicy::RespectReservations => self.quantity_available < magnitude,
                    DecreasePolicy::OnHandOnly => self.quantity_on_hand < magnitude,
                };
                if self.quantity_on_hand < magnitude || blocked {
                    return Err(StockError::InsufficientStock {
                        requested: magnitude,
                        on_hand: self.quantity_on_hand,
                        available: self.quantity_available,
                    });
                }
                self.quantity_on_hand -= magnitude;
                if self.quantity_reserved > self.quantity_on_hand {
                    reserved_trimmed = self.quantity_reserved - self.quantity_on_hand;
                    self.quantity_reserved = self.quantity_on_hand;
                }
            }
        }

        self.touch(now);
        Ok(QuantityChange {
            before,
            after: self.quantity_on_hand,
            reserved_trimmed,
        })
    }

    /// Hold back `quantity` from available. Returns the new available quantity.
    pub fn reserve(&mut self, quantity: Decimal, now: DateTime<Utc>) -> Result<Decimal, StockError> {
        ensure_positive(quantity)?;
        if self.quantity_available < quantity {
            return Err(StockError::InsufficientAvailableStock {
                requested: quantity,
                available: self.quantity_available,
            });
        }
        self.quantity_reserved += quantity;
        self.touch(now);
        Ok(self.quantity_available)
    }

    /// Give back up to `quantity` reserved units, flooring at zero.
    pub fn release(
        &mut self,
        quantity: Decimal,
        now: DateTime<Utc>,
    ) -> Result<ReleaseOutcome, StockError> {
        ensure_positive(quantity)?;
        let clamped = quantity > self.quantity_reserved;
        let released = quantity.min(self.quantity_reserved);
        self.quantity_reserved -= released;
        self.touch(now);
        Ok(ReleaseOutcome {
            released,
            available: self.quantity_available,
            clamped,
        })
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.recompute_available();
        self.version += 1;
        self.updated_at = now;
    }

    fn recompute_available(&mut self) {
        self.quantity_available = self.quantity_on_hand - self.quantity_reserved;
    }
}

impl Versioned for StockRecord {
    fn version(&self) -> u64 {
        self.version
    }
}

fn ensure_positive(quantity: Decimal) -> Result<(), StockError> {
    if quantity <= Decimal::ZERO {
        return Err(StockError::InvalidQuantity(format!(
            "quantity must be positive, got {quantity}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MovementType;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn key() -> StockKey {
        StockKey::new(ProductId::new(), WarehouseId::new())
    }

    fn open(min: Decimal) -> StockRecord {
        StockRecord::open(
            key(),
            StockThresholds {
                minimum_stock: min,
                maximum_stock: None,
            },
            Utc::now(),
        )
    }

    fn movement(rec: &StockRecord, t: MovementType, q: Decimal) -> MovementRequest {
        MovementRequest::new(rec.product_id(), rec.warehouse_id(), t, q)
    }

    fn apply(rec: &mut StockRecord, t: MovementType, q: Decimal) -> Result<QuantityChange, StockError> {
        let req = movement(rec, t, q);
        rec.apply_movement(&req, DecreasePolicy::RespectReservations, Utc::now())
    }

    #[test]
    fn purchase_increases_on_hand_and_available() {
        let mut rec = open(Decimal::ZERO);
        let change = apply(&mut rec, MovementType::Purchase, dec!(100)).unwrap();

        assert_eq!(change.before, Decimal::ZERO);
        assert_eq!(change.after, dec!(100));
        assert_eq!(rec.quantity_available(), dec!(100));
        assert_eq!(rec.version(), 1);
    }

    #[test]
    fn sale_beyond_on_hand_fails_and_leaves_record_unchanged() {
        let mut rec = open(Decimal::ZERO);
        apply(&mut rec, MovementType::In, dec!(5)).unwrap();
        let before = rec.clone();

        let err = apply(&mut rec, MovementType::Sale, dec!(6)).unwrap_err();

        assert!(matches!(err, StockError::InsufficientStock { requested, .. } if requested == dec!(6)));
        assert_eq!(rec, before);
    }

    #[test]
    fn negative_adjustment_reduces_stock() {
        let mut rec = open(Decimal::ZERO);
        apply(&mut rec, MovementType::In, dec!(10)).unwrap();
        let change = apply(&mut rec, MovementType::Adjustment, dec!(-4)).unwrap();

        assert_eq!(change.after, dec!(6));
        assert!(apply(&mut rec, MovementType::Adjustment, dec!(-7)).is_err());
    }

    // Decision for decreases against reserved stock: the default policy refuses
    // to sell reserved units, so available never goes negative.
    #[test]
    fn default_policy_refuses_to_sell_reserved_units() {
        let mut rec = open(Decimal::ZERO);
        apply(&mut rec, MovementType::Purchase, dec!(100)).unwrap();
        apply(&mut rec, MovementType::Sale, dec!(30)).unwrap();
        assert_eq!(rec.reserve(dec!(20), Utc::now()).unwrap(), dec!(50));

        let err = apply(&mut rec, MovementType::Sale, dec!(60)).unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientStock {
                requested: dec!(60),
                on_hand: dec!(70),
                available: dec!(50),
            }
        );
        assert_eq!(rec.quantity_on_hand(), dec!(70));
        assert_eq!(rec.quantity_reserved(), dec!(20));
    }

    #[test]
    fn on_hand_only_policy_trims_reservations_instead_of_going_negative() {
        let mut rec = open(Decimal::ZERO);
        apply(&mut rec, MovementType::Purchase, dec!(70)).unwrap();
        rec.reserve(dec!(20), Utc::now()).unwrap();

        let req = movement(&rec, MovementType::Sale, dec!(60));
        let change = rec
            .apply_movement(&req, DecreasePolicy::OnHandOnly, Utc::now())
            .unwrap();

        assert_eq!(change.after, dec!(10));
        assert_eq!(change.reserved_trimmed, dec!(10));
        assert_eq!(rec.quantity_reserved(), dec!(10));
        assert_eq!(rec.quantity_available(), Decimal::ZERO);
    }

    #[test]
    fn increase_beyond_decimal_range_is_rejected_and_leaves_record() {
        let mut rec = open(Decimal::ZERO);
        let half = Decimal::MAX / dec!(2) + Decimal::ONE;
        apply(&mut rec, MovementType::Purchase, half).unwrap();

        let err = apply(&mut rec, MovementType::Purchase, half).unwrap_err();

        assert!(matches!(err, StockError::InvalidMovement(_)));
        assert_eq!(rec.quantity_on_hand(), half);
        assert_eq!(rec.version(), 1);
    }

    #[test]
    fn reserve_requires_available_stock() {
        let mut rec = open(Decimal::ZERO);
        apply(&mut rec, MovementType::In, dec!(3)).unwrap();

        let err = rec.reserve(dec!(4), Utc::now()).unwrap_err();
        assert_eq!(
            err,
            StockError::InsufficientAvailableStock {
                requested: dec!(4),
                available: dec!(3),
            }
        );
        assert!(matches!(
            rec.reserve(Decimal::ZERO, Utc::now()),
            Err(StockError::InvalidQuantity(_))
        ));
    }

    #[test]
    fn over_release_clamps_to_zero() {
        let mut rec = open(Decimal::ZERO);
        apply(&mut rec, MovementType::In, dec!(50)).unwrap();
        rec.reserve(dec!(20), Utc::now()).unwrap();

        let out = rec.release(dec!(50), Utc::now()).unwrap();

        assert!(out.clamped);
        assert_eq!(out.released, dec!(20));
        assert_eq!(rec.quantity_reserved(), Decimal::ZERO);
        assert_eq!(out.available, dec!(50));
    }

    #[test]
    fn low_and_out_of_stock_classification() {
        let mut rec = open(dec!(5));
        assert!(rec.is_out_of_stock());
        assert!(rec.is_low_stock());

        apply(&mut rec, MovementType::In, dec!(5)).unwrap();
        assert!(!rec.is_out_of_stock());
        assert!(rec.is_low_stock());

        apply(&mut rec, MovementType::In, dec!(0.5)).unwrap();
        assert!(!rec.is_low_stock());
    }

    #[test]
    fn restore_recomputes_available() {
        let now = Utc::now();
        let rec = StockRecord::restore(RestoreStock {
            key: key(),
            quantity_on_hand: dec!(12),
            quantity_reserved: dec!(5),
            thresholds: StockThresholds::default(),
            location: Some("A-01".to_string()),
            version: 9,
            created_at: now,
            updated_at: now,
        });
        assert_eq!(rec.quantity_available(), dec!(7));
        assert_eq!(rec.version(), 9);
        assert_eq!(rec.location(), Some("A-01"));
    }

    #[test]
    fn decrease_policy_parses_config_values() {
        assert_eq!(
            "on_hand_only".parse::<DecreasePolicy>().unwrap(),
            DecreasePolicy::OnHandOnly
        );
        assert_eq!(
            "Respect_Reservations".parse::<DecreasePolicy>().unwrap(),
            DecreasePolicy::RespectReservations
        );
        assert!("strict".parse::<DecreasePolicy>().is_err());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Move(MovementType, i64),
        Reserve(i64),
        Release(i64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        let move_op = (0usize..MovementType::ALL.len(), -50i64..200i64)
            .prop_map(|(i, q)| Op::Move(MovementType::ALL[i], q));
        prop_oneof![
            3 => move_op,
            1 => (1i64..80i64).prop_map(Op::Reserve),
            1 => (1i64..80i64).prop_map(Op::Release),
        ]
    }

    fn policy_strategy() -> impl Strategy<Value = DecreasePolicy> {
        prop_oneof![
            Just(DecreasePolicy::RespectReservations),
            Just(DecreasePolicy::OnHandOnly)
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of operations the quantity invariants hold,
        /// and every successful movement reconciles before/after.
        #[test]
        fn quantities_stay_consistent(
            ops in prop::collection::vec(op_strategy(), 1..60),
            policy in policy_strategy(),
        ) {
            let mut rec = open(dec!(10));

            for op in ops {
                let snapshot = rec.clone();
                let outcome = match op {
                    Op::Move(t, q) => {
                        let req = movement(&rec, t, Decimal::from(q));
                        let delta = t.signed_delta(req.quantity);
                        rec.apply_movement(&req, policy, Utc::now()).map(|c| Some((c, delta)))
                    }
                    Op::Reserve(q) => rec.reserve(Decimal::from(q), Utc::now()).map(|_| None),
                    Op::Release(q) => rec.release(Decimal::from(q), Utc::now()).map(|_| None),
                };

                match outcome {
                    Ok(Some((change, delta))) => prop_assert_eq!(change.after, change.before + delta),
                    Ok(None) => {}
                    Err(_) => prop_assert_eq!(&rec, &snapshot),
                }

                prop_assert_eq!(rec.quantity_available(), rec.quantity_on_hand() - rec.quantity_reserved());
                prop_assert!(rec.quantity_on_hand() >= Decimal::ZERO);
                prop_assert!(rec.quantity_reserved() >= Decimal::ZERO);
                prop_assert!(rec.quantity_reserved() <= rec.quantity_on_hand());
            }
        }
    }
}
