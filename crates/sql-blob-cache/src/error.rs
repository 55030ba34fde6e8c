//! Error types for the SQL blob cache

use std::fmt;

#[derive(Debug)]
pub enum CacheError {
    Database(Box<sqlx::Error>),
    Statement(String),
    InvalidKey(String),
    InvalidTableName(String),
    Serialization(Box<serde_json::Error>),
    Config(String),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Database(err) => write!(f, "Database error: {}", err),
            CacheError::Statement(msg) => write!(f, "Statement error: {}", msg),
            CacheError::InvalidKey(key) => write!(f, "Invalid cache key: {:?}", key),
            CacheError::InvalidTableName(name) => write!(f, "Invalid table name: {:?}", name),
            CacheError::Serialization(err) => write!(f, "Serialization error: {}", err),
            CacheError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Database(err) => Some(err.as_ref()),
            CacheError::Serialization(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        CacheError::Database(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
