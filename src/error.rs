//! Error types for every stage of the migration.
//!
//! Run-level errors ([`MigrationError`]) stop the migration. Record-level
//! errors ([`RecordError`]) are attached to a single session and the run moves
//! on to the next one.

use sea_orm::DbErr;
use thiserror::Error;

/// Failure talking to the key-value sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// The key pattern could not be compiled into a matcher.
    #[error("invalid key pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    /// Any other backend failure, for sinks that do not speak Redis.
    #[error("sink backend error: {0}")]
    Backend(String),
}

/// Failure reading from the relational source.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("failed to query sessions: {0}")]
    Sessions(#[source] DbErr),

    #[error("failed to query attributes of session {session_id}: {source}")]
    Attributes {
        session_id: String,
        #[source]
        source: DbErr,
    },
}

/// Failure turning one session into a flat record.
#[derive(Debug, Error)]
pub enum TransformError {
    /// An attribute key cannot be turned into a hash field name.
    #[error("invalid attribute key {key:?}: {reason}")]
    InvalidAttributeKey { key: String, reason: &'static str },

    #[error("failed to serialize session attributes: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure writing one flat record into the sink.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to write {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: SinkError,
    },

    #[error("failed to set ttl of {ttl}s on {key}: {source}")]
    Expire {
        key: String,
        ttl: u64,
        #[source]
        source: SinkError,
    },
}

/// Why a single session could not be migrated.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Why verification did not pass.
///
/// Verification failures never undo writes; they only mark the run as failed.
#[derive(Debug, Error)]
pub enum VerificationFailure {
    #[error("count mismatch: expected {expected} session keys, found {found}")]
    Mismatch { expected: usize, found: usize },

    #[error("failed to list session keys: {0}")]
    KeyListing(#[source] SinkError),
}

/// Errors that stop a migration run.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to connect to source database: {0}")]
    SourceConnection(#[source] DbErr),

    #[error("failed to connect to sink: {0}")]
    SinkConnection(#[source] SinkError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}
