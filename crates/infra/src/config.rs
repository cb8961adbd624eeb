//! Ledger configuration loaded from the environment.

use thiserror::Error;

use stockledger_inventory::{DecreasePolicy, MovementNumber};

/// Tunables for `InventoryLedger`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Attempts per write before a version conflict is reported to the caller.
    pub max_write_attempts: u32,
    pub decrease_policy: DecreasePolicy,
    /// Prefix of generated movement numbers.
    pub movement_prefix: String,
}

impl LedgerConfig {
    pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 5;
    pub const MAX_WRITE_ATTEMPTS_RANGE: std::ops::RangeInclusive<u32> = 1..=20;

    /// Read `STOCKLEDGER_MAX_WRITE_ATTEMPTS`, `STOCKLEDGER_DECREASE_POLICY` and
    /// `STOCKLEDGER_MOVEMENT_PREFIX`, falling back to defaults when unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("STOCKLEDGER_MAX_WRITE_ATTEMPTS") {
            let attempts: u32 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "STOCKLEDGER_MAX_WRITE_ATTEMPTS",
                reason: format!("'{raw}' is not a number"),
            })?;
            if !Self::MAX_WRITE_ATTEMPTS_RANGE.contains(&attempts) {
                return Err(ConfigError::Invalid {
                    key: "STOCKLEDGER_MAX_WRITE_ATTEMPTS",
                    reason: format!("{attempts} is outside 1..=20"),
                });
            }
            config.max_write_attempts = attempts;
        }

        if let Some(raw) = lookup("STOCKLEDGER_DECREASE_POLICY") {
            config.decrease_policy = raw.parse().map_err(|reason| ConfigError::Invalid {
                key: "STOCKLEDGER_DECREASE_POLICY",
                reason,
            })?;
        }

        if let Some(raw) = lookup("STOCKLEDGER_MOVEMENT_PREFIX") {
            let prefix = raw.trim();
            if prefix.is_empty() || prefix.len() > 16 {
                return Err(ConfigError::Invalid {
                    key: "STOCKLEDGER_MOVEMENT_PREFIX",
                    reason: "must be 1 to 16 characters".to_string(),
                });
            }
            config.movement_prefix = prefix.to_string();
        }

        Ok(config)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_write_attempts: Self::DEFAULT_MAX_WRITE_ATTEMPTS,
            decrease_policy: DecreasePolicy::default(),
            movement_prefix: MovementNumber::DEFAULT_PREFIX.to_string(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.max_write_attempts, 5);
        assert_eq!(config.movement_prefix, "MOV");
    }

    #[test]
    fn overrides_are_parsed() {
        let config = LedgerConfig::from_lookup(lookup(&[
            ("STOCKLEDGER_MAX_WRITE_ATTEMPTS", "8"),
            ("STOCKLEDGER_DECREASE_POLICY", "on_hand_only"),
            ("STOCKLEDGER_MOVEMENT_PREFIX", "WH1"),
        ]))
        .unwrap();

        assert_eq!(config.max_write_attempts, 8);
        assert_eq!(config.decrease_policy, DecreasePolicy::OnHandOnly);
        assert_eq!(config.movement_prefix, "WH1");
    }

    #[test]
    fn out_of_range_attempts_are_rejected() {
        let err = LedgerConfig::from_lookup(lookup(&[("STOCKLEDGER_MAX_WRITE_ATTEMPTS", "0")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "STOCKLEDGER_MAX_WRITE_ATTEMPTS", .. }));
        assert!(
            LedgerConfig::from_lookup(lookup(&[("STOCKLEDGER_MAX_WRITE_ATTEMPTS", "21")])).is_err()
        );
    }
}
