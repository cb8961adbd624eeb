//! Server configuration loaded from the environment.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use stockledger_infra::{ConfigError as LedgerConfigError, LedgerConfig};

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    /// Use Postgres for stock and master data instead of in-memory stores.
    pub use_persistent: bool,
    pub database_url: Option<String>,
    /// Upper bound on a single ledger call made by a handler.
    pub request_timeout: Duration,
    pub ledger: LedgerConfig,
}

impl ApiConfig {
    pub const DEFAULT_BIND_ADDR: &'static str = "0.0.0.0:8080";
    pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;

    pub fn from_env() -> Result<Self, ApiConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ApiConfigError> {
        let ledger = LedgerConfig::from_lookup(&lookup)?;

        let raw_addr =
            lookup("STOCKLEDGER_BIND_ADDR").unwrap_or_else(|| Self::DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw_addr.trim().parse().map_err(|_| ApiConfigError::Invalid {
            key: "STOCKLEDGER_BIND_ADDR",
            reason: format!("'{raw_addr}' is not a socket address"),
        })?;

        let use_persistent = lookup("USE_PERSISTENT_STORES")
            .unwrap_or_else(|| "false".to_string())
            .trim()
            .parse::<bool>()
            .unwrap_or(false);

        let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
        if use_persistent && database_url.is_none() {
            return Err(ApiConfigError::Invalid {
                key: "DATABASE_URL",
                reason: "must be set when USE_PERSISTENT_STORES=true".to_string(),
            });
        }

        let request_timeout = match lookup("STOCKLEDGER_REQUEST_TIMEOUT_MS") {
            None => Duration::from_millis(Self::DEFAULT_REQUEST_TIMEOUT_MS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ApiConfigError::Invalid {
                        key: "STOCKLEDGER_REQUEST_TIMEOUT_MS",
                        reason: format!("'{raw}' is not a positive number of milliseconds"),
                    });
                }
            },
        };

        Ok(Self {
            bind_addr,
            use_persistent,
            database_url,
            request_timeout,
            ledger,
        })
    }

    /// In-memory configuration on an ephemeral local port, for tests.
    pub fn in_memory() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            use_persistent: false,
            database_url: None,
            request_timeout: Duration::from_millis(Self::DEFAULT_REQUEST_TIMEOUT_MS),
            ledger: LedgerConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiConfigError {
    #[error(transparent)]
    Ledger(#[from] LedgerConfigError),

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
    fn defaults_to_in_memory_on_port_8080() {
        let config = ApiConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr.to_string(), "0.0.0.0:8080");
        assert!(!config.use_persistent);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.ledger, LedgerConfig::default());
    }

    #[test]
    fn persistent_mode_requires_database_url() {
        let err = ApiConfig::from_lookup(lookup(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(matches!(err, ApiConfigError::Invalid { key: "DATABASE_URL", .. }));

        let config = ApiConfig::from_lookup(lookup(&[
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/stock"),
        ]))
        .unwrap();
        assert!(config.use_persistent);
    }

    #[test]
    fn ledger_errors_surface() {
        let err = ApiConfig::from_lookup(lookup(&[("STOCKLEDGER_MAX_WRITE_ATTEMPTS", "x")]))
            .unwrap_err();
        assert!(matches!(err, ApiConfigError::Ledger(_)));
    }

    #[test]
    fn timeout_and_address_are_parsed() {
        let config = ApiConfig::from_lookup(lookup(&[
            ("STOCKLEDGER_BIND_ADDR", "127.0.0.1:9000"),
            ("STOCKLEDGER_REQUEST_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.request_timeout, Duration::from_millis(250));

        assert!(
            ApiConfig::from_lookup(lookup(&[("STOCKLEDGER_REQUEST_TIMEOUT_MS", "0")])).is_err()
        );
    }
}
