use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::debug;

use super::{KeyTtl, SessionSink};
use crate::error::SinkError;

/// A [`SessionSink`] backed by a Redis server.
///
/// Holds one multiplexed connection; cloning the sink shares it.
///
/// # Usage
///
/// ```no_run
/// use session_cache_migrator::RedisSink;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = RedisSink::connect("redis://localhost:6379/0").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisSink {
    conn: MultiplexedConnection,
}

impl std::fmt::Debug for RedisSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisSink").finish_non_exhaustive()
    }
}

impl RedisSink {
    /// Opens a connection and checks it with `PING`.
    pub async fn connect(url: &str) -> Result<Self, SinkError> {
        let client = redis::Client::open(url)?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(reply = %pong, "redis connection established");
        Ok(Self { conn })
    }

    /// Wraps a connection opened elsewhere. No `PING` is sent.
    ///
    /// # Parameters
    ///
    /// * `conn` - A multiplexed connection, e.g. from
    ///   [`redis::Client::get_multiplexed_async_connection`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use session_cache_migrator::RedisSink;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let client = redis::Client::open("redis://localhost:6379/0")?;
    /// let sink = RedisSink::from_connection(client.get_multiplexed_async_connection().await?);
    /// # Ok(())
    /// # }
    /// ```
    pub fn from_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SessionSink for RedisSink {
    async fn replace_hash(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        let items: Vec<(&str, &str)> = fields
            .iter()
            .map(|(field, value)| (field.as_str(), value.as_str()))
            .collect();

        let mut pipe = redis::pipe();
        pipe.atomic().del(key).ignore();
        if !items.is_empty() {
            pipe.hset_multiple(key, items.as_slice()).ignore();
        }

        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), SinkError> {
        let mut conn = self.conn.clone();
        let applied: bool = conn
            .expire(key, i64::try_from(seconds).unwrap_or(i64::MAX))
            .await?;
        if !applied {
            return Err(SinkError::Backend(format!("cannot expire missing key {key}")));
        }
        Ok(())
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SinkError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, SinkError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(key).await?;
        Ok(fields)
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, SinkError> {
        let mut conn = self.conn.clone();
        let reply: i64 = conn.ttl(key).await?;
        Ok(KeyTtl::from_reply(reply))
    }
}
