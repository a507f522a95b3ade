//! The key-value side of the migration.
//!
//! [`SessionSink`] is the narrow set of hash commands the loader and the
//! verifier need. [`RedisSink`] talks to a real server; [`MemorySink`] keeps
//! everything in process.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SinkError;

mod memory;
mod redis_sink;

pub use self::memory::MemorySink;
pub use self::redis_sink::RedisSink;

/// Prefix of every key written by the migrator.
pub const SESSION_KEY_PREFIX: &str = "session:";
/// Pattern matching every key written by the migrator.
pub const SESSION_KEY_PATTERN: &str = "session:*";

/// Builds the sink key of a session: `session:<session_id>`.
pub fn session_key(session_id: &str) -> String {
    format!("{SESSION_KEY_PREFIX}{session_id}")
}

/// Remaining lifetime of a key, as reported by the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist.
    Missing,
    /// The key exists and never expires.
    Persistent,
    /// The key expires in this many seconds.
    Expires(u64),
}

impl KeyTtl {
    /// Decodes the reply of the Redis `TTL` command.
    pub fn from_reply(reply: i64) -> Self {
        match reply {
            -2 => Self::Missing,
            r if r < 0 => Self::Persistent,
            r => Self::Expires(r as u64),
        }
    }

    /// The reply the Redis `TTL` command would give.
    pub fn as_reply(&self) -> i64 {
        match self {
            Self::Missing => -2,
            Self::Persistent => -1,
            Self::Expires(secs) => i64::try_from(*secs).unwrap_or(i64::MAX),
        }
    }

    /// Seconds left before expiry, for keys that have an expiration.
    pub fn seconds(&self) -> Option<u64> {
        match self {
            Self::Expires(secs) => Some(*secs),
            _ => None,
        }
    }
}

/// Hash storage the migrated sessions are written into.
///
/// Implementations must be usable from several in-flight loads at once.
#[async_trait]
pub trait SessionSink: Send + Sync {
    /// Atomically replaces the hash at `key` with exactly `fields`.
    ///
    /// Fields left over from an earlier write are removed and any expiration on
    /// the key is cleared.
    async fn replace_hash(&self, key: &str, fields: &BTreeMap<String, String>)
        -> Result<(), SinkError>;

    /// Sets the key to expire after `seconds`.
    async fn expire(&self, key: &str, seconds: u64) -> Result<(), SinkError>;

    /// Lists keys matching a glob-style pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SinkError>;

    /// Reads every field of the hash at `key`. Missing keys yield an empty map.
    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, SinkError>;

    /// Reports the remaining lifetime of `key`.
    ///
    /// # Returns
    ///
    /// * `Ok(KeyTtl::Missing)` - The key does not exist.
    /// * `Ok(KeyTtl::Persistent)` - The key exists without expiration.
    /// * `Ok(KeyTtl::Expires(secs))` - The key expires in `secs` seconds.
    async fn ttl(&self, key: &str) -> Result<KeyTtl, SinkError>;

    /// Releases the underlying connection.
    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[async_trait]
impl<T: SessionSink + ?Sized> SessionSink for Arc<T> {
    async fn replace_hash(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        (**self).replace_hash(key, fields).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), SinkError> {
        (**self).expire(key, seconds).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SinkError> {
        (**self).keys(pattern).await
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, SinkError> {
        (**self).hash_fields(key).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, SinkError> {
        (**self).ttl(key).await
    }

    async fn close(&self) -> Result<(), SinkError> {
        (**self).close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_format() {
        assert_eq!(session_key("abc123"), "session:abc123");
        assert_eq!(session_key(""), "session:");
    }

    #[test]
    fn test_ttl_reply_mapping() {
        assert_eq!(KeyTtl::from_reply(-2), KeyTtl::Missing);
        assert_eq!(KeyTtl::from_reply(-1), KeyTtl::Persistent);
        assert_eq!(KeyTtl::from_reply(0), KeyTtl::Expires(0));
        assert_eq!(KeyTtl::from_reply(3600), KeyTtl::Expires(3600));
        assert_eq!(KeyTtl::Expires(42).as_reply(), 42);
        assert_eq!(KeyTtl::Persistent.seconds(), None);
    }
}
