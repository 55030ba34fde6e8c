//! SQL-backed key/value blob cache with TTL expiration
//!
//! Stores opaque byte payloads under string keys in a relational table, each
//! row carrying an absolute expiry timestamp. The storage layer is split into
//! a dialect-agnostic [`CacheAdapter`] contract and one concrete adapter per
//! SQL engine ([`PostgresCacheAdapter`], [`MySqlCacheAdapter`]); on top sits
//! the [`DbCache`] facade, which adds key validation, TTL handling, and typed
//! values via serde.
//!
//! The backing table is created lazily: the first statement that fails against
//! a fresh database triggers table and index creation, then a single retry.

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod mysql;
pub mod postgres;
pub mod statement;
pub mod types;

pub use adapter::CacheAdapter;
pub use cache::DbCache;
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use mysql::MySqlCacheAdapter;
pub use postgres::PostgresCacheAdapter;
pub use types::CacheEntry;
