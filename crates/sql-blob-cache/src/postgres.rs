//! Postgres cache adapter

use crate::adapter::{validate_table_name, CacheAdapter};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::statement::{self, Dialect, Params, Statement, Value};
use crate::types::CacheEntry;
use async_trait::async_trait;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Postgres, Row};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Postgres-flavored implementation of the [`CacheAdapter`] contract.
///
/// Holds only a pool and the table name; rows stream straight from the
/// backing store, nothing is cached in process memory.
#[derive(Clone)]
pub struct PostgresCacheAdapter {
    pool: PgPool,
    table: String,
}

impl PostgresCacheAdapter {
    pub fn new(pool: PgPool, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        Ok(Self {
            pool,
            table: table.to_string(),
        })
    }

    /// Build a pool from the configuration and wrap it.
    pub async fn connect(config: &CacheConfig) -> Result<Self> {
        info!(table = %config.table, "Connecting to Postgres cache backend...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        info!("Postgres connection established");
        Self::new(pool, &config.table)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn statement(&self, template: &str, params: &Params) -> Result<Statement> {
        statement::build(template, params, Dialect::Postgres)
    }

    async fn create_table(&self) -> sqlx::Result<()> {
        sqlx::query(&format!(
            "CREATE TABLE {t} (\n  key CHARACTER VARYING NOT NULL PRIMARY KEY,\n  data BYTEA,\n  expires BIGINT\n)",
            t = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX {t}_expires_index ON {t} USING BTREE (expires)",
            t = self.table
        ))
        .execute(&self.pool)
        .await?;

        info!(table = %self.table, "Created cache table and expiry index");
        Ok(())
    }

    async fn try_execute(&self, stmt: &Statement) -> sqlx::Result<()> {
        bind_args(sqlx::query(&stmt.sql), &stmt.args)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn try_fetch(&self, stmt: &Statement) -> sqlx::Result<Vec<PgRow>> {
        bind_args(sqlx::query(&stmt.sql), &stmt.args)
            .fetch_all(&self.pool)
            .await
    }

    /// Run a statement, bootstrapping the table on first failure and
    /// retrying once. The retry's error propagates unmodified.
    async fn execute(&self, stmt: &Statement) -> Result<()> {
        if let Err(first) = self.try_execute(stmt).await {
            self.bootstrap(&first).await;
            self.try_execute(stmt).await?;
        }
        Ok(())
    }

    async fn fetch(&self, stmt: &Statement) -> Result<Vec<CacheEntry>> {
        let rows = match self.try_fetch(stmt).await {
            Ok(rows) => rows,
            Err(first) => {
                self.bootstrap(&first).await;
                self.try_fetch(stmt).await?
            }
        };

        rows.iter().map(entry_from_row).collect()
    }

    async fn bootstrap(&self, cause: &sqlx::Error) {
        debug!(
            table = %self.table,
            error = %cause,
            "Statement failed, treating as missing table and bootstrapping"
        );
        if let Err(err) = self.create_table().await {
            // A racing process may have created the table first; the retried
            // statement decides the outcome either way.
            warn!(table = %self.table, error = %err, "Table bootstrap failed, retrying statement anyway");
        }
    }
}

#[async_trait]
impl CacheAdapter for PostgresCacheAdapter {
    async fn select(&self, key: &str) -> Result<Option<CacheEntry>> {
        let mut params = Params::new();
        params.push("key", Value::Text(key.to_string()));

        let stmt = self.statement(
            &format!("SELECT key, data, expires FROM {t} WHERE key = :key", t = self.table),
            &params,
        )?;

        Ok(self.fetch(&stmt).await?.into_iter().next())
    }

    async fn select_multiple(&self, keys: &[String]) -> Result<Vec<CacheEntry>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut params = Params::new();
        params.push_list(
            "keys",
            keys.iter().map(|k| Value::Text(k.clone())).collect(),
        );

        let stmt = self.statement(
            &format!(
                "SELECT key, data, expires FROM {t} WHERE key IN (:keys)",
                t = self.table
            ),
            &params,
        )?;

        self.fetch(&stmt).await
    }

    async fn upsert(&self, values: &BTreeMap<String, Vec<u8>>, expires: i64) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }

        let (template, params) = upsert_statement(&self.table, values, expires);
        let stmt = self.statement(&template, &params)?;
        self.execute(&stmt).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut params = Params::new();
        params.push("key", Value::Text(key.to_string()));

        let stmt = self.statement(
            &format!("DELETE FROM {t} WHERE key = :key", t = self.table),
            &params,
        )?;

        self.execute(&stmt).await
    }

    async fn delete_multiple(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut params = Params::new();
        params.push_list(
            "keys",
            keys.iter().map(|k| Value::Text(k.clone())).collect(),
        );

        let stmt = self.statement(
            &format!("DELETE FROM {t} WHERE key IN (:keys)", t = self.table),
            &params,
        )?;

        self.execute(&stmt).await
    }

    async fn truncate(&self) -> Result<()> {
        let stmt = self.statement(&format!("TRUNCATE TABLE {t}", t = self.table), &Params::new())?;
        self.execute(&stmt).await
    }

    async fn delete_expired(&self, now: i64) -> Result<()> {
        let mut params = Params::new();
        params.push("now", Value::Int(now));

        let stmt = self.statement(
            &format!("DELETE FROM {t} WHERE :now >= expires", t = self.table),
            &params,
        )?;

        self.execute(&stmt).await
    }
}

/// One multi-row `INSERT ... ON CONFLICT` statement for the whole batch,
/// three synthesized placeholders per row.
fn upsert_statement(
    table: &str,
    values: &BTreeMap<String, Vec<u8>>,
    expires: i64,
) -> (String, Params) {
    let mut rows = Vec::with_capacity(values.len());
    let mut params = Params::new();

    for (index, (key, payload)) in values.iter().enumerate() {
        rows.push(statement::row_placeholders(index));
        params.push(format!("key_{index}"), Value::Text(key.clone()));
        params.push(format!("data_{index}"), Value::Blob(payload.clone()));
        params.push(format!("expires_{index}"), Value::Int(expires));
    }

    let template = format!(
        "INSERT INTO {table} (key, data, expires) VALUES {rows} \
         ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, expires = EXCLUDED.expires",
        rows = rows.join(", ")
    );

    (template, params)
}

fn bind_args<'q>(
    query: Query<'q, Postgres, PgArguments>,
    args: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    let mut query = query;
    for arg in args {
        query = match arg {
            Value::Int(v) => query.bind(*v),
            Value::Bool(v) => query.bind(*v),
            Value::Null => query.bind(Option::<Vec<u8>>::None),
            Value::Text(v) => query.bind(v.as_str()),
            Value::Blob(v) => query.bind(v.as_slice()),
        };
    }
    query
}

fn entry_from_row(row: &PgRow) -> Result<CacheEntry> {
    Ok(CacheEntry {
        key: row.try_get("key").map_err(CacheError::from)?,
        data: row
            .try_get::<Option<Vec<u8>>, _>("data")
            .map_err(CacheError::from)?
            .unwrap_or_default(),
        expires: row.try_get("expires").map_err(CacheError::from)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::{build, Dialect};

    fn sample_values() -> BTreeMap<String, Vec<u8>> {
        let mut values = BTreeMap::new();
        values.insert("alpha".to_string(), vec![1, 2]);
        values.insert("beta".to_string(), vec![3]);
        values
    }

    #[test]
    fn test_upsert_statement_shape() {
        let (template, params) = upsert_statement("cache", &sample_values(), 500);
        let stmt = build(&template, &params, Dialect::Postgres).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO cache (key, data, expires) VALUES ($1, $2, $3), ($4, $5, $6) \
             ON CONFLICT (key) DO UPDATE SET data = EXCLUDED.data, expires = EXCLUDED.expires"
        );
        assert_eq!(stmt.args[0], Value::Text("alpha".to_string()));
        assert_eq!(stmt.args[1], Value::Blob(vec![1, 2]));
        assert_eq!(stmt.args[2], Value::Int(500));
        assert_eq!(stmt.args[3], Value::Text("beta".to_string()));
    }

    #[test]
    fn test_upsert_statement_single_row() {
        let mut values = BTreeMap::new();
        values.insert("only".to_string(), vec![9]);
        let (template, params) = upsert_statement("cache", &values, 1);
        let stmt = build(&template, &params, Dialect::Postgres).unwrap();
        assert!(stmt.sql.contains("VALUES ($1, $2, $3) ON CONFLICT"));
        assert_eq!(stmt.args.len(), 3);
    }
}
