use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use stockledger_core::{DomainError, ValueObject};

/// Human-readable ledger number: `{PREFIX}-{YYYYMMDD}-{NNNNNN}`.
///
/// The sequence part comes from a per-day counter owned by the store, so two
/// concurrent movements never share a number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MovementNumber(String);

impl ValueObject for MovementNumber {}

impl MovementNumber {
    pub const DEFAULT_PREFIX: &'static str = "MOV";

    pub fn new(prefix: &str, day: NaiveDate, sequence: u64) -> Self {
        Self(format!("{prefix}-{}-{sequence:06}", day.format("%Y%m%d")))
    }

    /// Accept a stored number, checking its shape.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let mut parts = raw.rsplitn(3, '-');
        let seq = parts.next().unwrap_or_default();
        let day = parts.next().unwrap_or_default();
        let prefix = parts.next().unwrap_or_default();

        if prefix.is_empty() {
            return Err(DomainError::validation(format!("movement number '{raw}' has no prefix")));
        }
        if NaiveDate::parse_from_str(day, "%Y%m%d").is_err() {
            return Err(DomainError::validation(format!(
                "movement number '{raw}' has an invalid date part"
            )));
        }
        if seq.is_empty() || !seq.chars().all(|c| c.is_ascii_digit()) {
            return Err(DomainError::validation(format!(
                "movement number '{raw}' has an invalid sequence part"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for MovementNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_prefix_date_and_padded_sequence() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let n = MovementNumber::new("MOV", day, 42);
        assert_eq!(n.as_str(), "MOV-20260309-000042");
    }

    #[test]
    fn sequence_wider_than_padding_is_kept() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        let n = MovementNumber::new("MOV", day, 1_234_567);
        assert_eq!(n.as_str(), "MOV-20260309-1234567");
    }

    #[test]
    fn parse_accepts_generated_numbers() {
        let day = NaiveDate::from_ymd_opt(2026, 12, 31).unwrap();
        let n = MovementNumber::new("WH-A", day, 7);
        assert_eq!(MovementNumber::parse(n.as_str()).unwrap(), n);
    }

    #[test]
    fn parse_rejects_malformed_numbers() {
        assert!(MovementNumber::parse("MOV-2026-01").is_err());
        assert!(MovementNumber::parse("20260101-000001").is_err());
        assert!(MovementNumber::parse("MOV-20260101-00x001").is_err());
    }
}
