use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use globset::Glob;

use super::{KeyTtl, SessionSink};
use crate::error::SinkError;

#[derive(Debug, Clone)]
struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// An in-process [`SessionSink`].
///
/// Mirrors Redis hash semantics closely enough to rehearse a migration without
/// a server: keys expire lazily, and `keys` accepts the same glob patterns.
#[derive(Debug, Default)]
pub struct MemorySink {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes a key, returning whether it existed.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Writes a single field, creating the hash when needed.
    ///
    /// Unlike [`SessionSink::replace_hash`] this keeps the other fields.
    pub fn set_field(&self, key: &str, field: &str, value: &str) {
        self.lock()
            .entry(key.to_string())
            .or_insert_with(|| Entry {
                fields: HashMap::new(),
                expires_at: None,
            })
            .fields
            .insert(field.to_string(), value.to_string());
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock().values().filter(|e| e.is_live(now)).count()
    }

    /// Whether no live key is left.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave a half-written entry.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
    ) -> Option<&'a mut Entry> {
        let now = Instant::now();
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }
}

#[async_trait]
impl SessionSink for MemorySink {
    async fn replace_hash(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        let mut entries = self.lock();
        if fields.is_empty() {
            entries.remove(key);
            return Ok(());
        }
        entries.insert(
            key.to_string(),
            Entry {
                fields: fields.clone().into_iter().collect(),
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), SinkError> {
        let mut entries = self.lock();
        match Self::live_entry(&mut entries, key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + Duration::from_secs(seconds));
                Ok(())
            }
            None => Err(SinkError::Backend(format!("cannot expire missing key {key}"))),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SinkError> {
        let matcher = Glob::new(pattern)
            .map_err(|source| SinkError::Pattern {
                pattern: pattern.to_string(),
                source,
            })?
            .compile_matcher();

        let now = Instant::now();
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(key, entry)| entry.is_live(now) && matcher.is_match(key.as_str()))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, SinkError> {
        let mut entries = self.lock();
        Ok(Self::live_entry(&mut entries, key)
            .map(|entry| entry.fields.clone())
            .unwrap_or_default())
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, SinkError> {
        let mut entries = self.lock();
        let ttl = match Self::live_entry(&mut entries, key) {
            None => KeyTtl::Missing,
            Some(Entry {
                expires_at: None, ..
            }) => KeyTtl::Persistent,
            Some(Entry {
                expires_at: Some(at),
                ..
            }) => KeyTtl::Expires(at.saturating_duration_since(Instant::now()).as_secs()),
        };
        Ok(ttl)
    }
}
