//! Cache entry type

/// One stored cache record: key, opaque payload, absolute expiry.
///
/// `data` is never inspected or transformed by the storage layer; `expires`
/// is compared against a caller-supplied "now" in epoch seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    pub data: Vec<u8>,
    pub expires: i64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, data: Vec<u8>, expires: i64) -> Self {
        Self {
            key: key.into(),
            data,
            expires,
        }
    }

    /// An entry is expired once `now` reaches its expiry instant.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires
    }
}
