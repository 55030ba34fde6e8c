//! Dialect-agnostic storage contract

use crate::error::{CacheError, Result};
use crate::types::CacheEntry;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Storage contract implemented once per SQL dialect.
///
/// Absence is never an error: a missing key yields `None` from [`select`] and
/// is simply omitted from [`select_multiple`]'s result; deletes are
/// idempotent.
///
/// Every operation follows the same self-healing protocol: run the statement
/// against the existing table; on failure, provisionally treat the error as
/// "table does not exist yet", create the table and its expiry index, and
/// retry the statement exactly once. The retry's error propagates unmodified.
/// Known trade-offs, inherited deliberately: the first failure's diagnostics
/// are discarded even when the real cause was unrelated (bad SQL, lost
/// connection), and two processes racing through first-time bootstrap can
/// both attempt `CREATE TABLE` — the loser's creation error is swallowed and
/// its retried statement decides the outcome.
///
/// [`select`]: CacheAdapter::select
/// [`select_multiple`]: CacheAdapter::select_multiple
#[async_trait]
pub trait CacheAdapter: Send + Sync {
    /// Single-row lookup by primary key.
    async fn select(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Rows whose key is in `keys`; missing keys are omitted, order is
    /// unspecified.
    async fn select_multiple(&self, keys: &[String]) -> Result<Vec<CacheEntry>>;

    /// Insert or overwrite all given keys with the same expiry, as one
    /// batched multi-row statement. Empty input is a no-op.
    async fn upsert(&self, values: &BTreeMap<String, Vec<u8>>, expires: i64) -> Result<()>;

    /// Idempotent single-key delete.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Idempotent bulk delete. Empty input is a no-op.
    async fn delete_multiple(&self, keys: &[String]) -> Result<()>;

    /// Remove all rows.
    async fn truncate(&self) -> Result<()>;

    /// Remove every row with `expires <= now`.
    async fn delete_expired(&self, now: i64) -> Result<()>;
}

/// Table names are interpolated into SQL (identifiers cannot be bound), so
/// they are restricted to `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(CacheError::InvalidTableName(table.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        assert!(validate_table_name("cache").is_ok());
        assert!(validate_table_name("_cache_2").is_ok());
        assert!(validate_table_name("Cache_Table").is_ok());
    }

    #[test]
    fn test_rejects_empty_and_leading_digit() {
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1cache").is_err());
    }

    #[test]
    fn test_rejects_injection_attempts() {
        assert!(validate_table_name("cache; DROP TABLE users").is_err());
        assert!(validate_table_name("cache\"").is_err());
        assert!(validate_table_name("ca che").is_err());
    }
}
