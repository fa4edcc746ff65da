//! Engine configuration, read from the environment.

use std::time::Duration;

use thiserror::Error;

use shopfloor_core::WarehouseId;

pub const DEFAULT_MAX_WAIT_MS: u64 = 2_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} is not a valid {expected}: {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("{0} must not be empty")]
    Empty(&'static str),
}

/// Bounds around one engine transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    /// Longest wait to obtain the transaction before giving up.
    pub max_wait: Duration,
    /// Longest the unit of work may run before it is rolled back.
    pub timeout: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_wait: Duration::from_millis(DEFAULT_MAX_WAIT_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// GL accounts the production cost flow moves value through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingAccounts {
    pub raw_materials: String,
    pub work_in_process: String,
    pub finished_goods: String,
}

impl Default for PostingAccounts {
    fn default() -> Self {
        Self {
            raw_materials: "1310".to_string(),
            work_in_process: "1320".to_string(),
            finished_goods: "1300".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Site default for production reports that name no warehouse.
    pub default_warehouse: Option<WarehouseId>,
    pub transaction: TransactionOptions,
    pub accounts: PostingAccounts,
}

impl EngineConfig {
    /// Load from process environment variables.
    ///
    /// - `SHOPFLOOR_DEFAULT_WAREHOUSE_ID` (UUID, optional)
    /// - `SHOPFLOOR_TX_MAX_WAIT_MS`, `SHOPFLOOR_TX_TIMEOUT_MS`
    /// - `SHOPFLOOR_ACCOUNT_RAW_MATERIALS`, `SHOPFLOOR_ACCOUNT_WIP`,
    ///   `SHOPFLOOR_ACCOUNT_FINISHED_GOODS`
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (used by tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let default_warehouse = match non_blank(&lookup, "SHOPFLOOR_DEFAULT_WAREHOUSE_ID") {
            Some(v) => Some(v.parse::<WarehouseId>().map_err(|_| ConfigError::Invalid {
                var: "SHOPFLOOR_DEFAULT_WAREHOUSE_ID",
                expected: "UUID",
                value: v.clone(),
            })?),
            None => None,
        };

        let transaction = TransactionOptions {
            max_wait: millis(&lookup, "SHOPFLOOR_TX_MAX_WAIT_MS", DEFAULT_MAX_WAIT_MS)?,
            timeout: millis(&lookup, "SHOPFLOOR_TX_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?,
        };

        let defaults = PostingAccounts::default();
        let accounts = PostingAccounts {
            raw_materials: account(&lookup, "SHOPFLOOR_ACCOUNT_RAW_MATERIALS", defaults.raw_materials)?,
            work_in_process: account(&lookup, "SHOPFLOOR_ACCOUNT_WIP", defaults.work_in_process)?,
            finished_goods: account(&lookup, "SHOPFLOOR_ACCOUNT_FINISHED_GOODS", defaults.finished_goods)?,
        };

        Ok(Self {
            default_warehouse,
            transaction,
            accounts,
        })
    }
}

fn non_blank(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Option<String> {
    lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn millis(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: u64,
) -> Result<Duration, ConfigError> {
    match non_blank(lookup, var) {
        None => Ok(Duration::from_millis(default)),
        Some(v) => match v.parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Duration::from_millis(ms)),
            _ => Err(ConfigError::Invalid {
                var,
                expected: "positive number of milliseconds",
                value: v,
            }),
        },
    }
}

fn account(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: String,
) -> Result<String, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(v) if v.trim().is_empty() => Err(ConfigError::Empty(var)),
        Some(v) => Ok(v.trim().to_string()),
    }
}
