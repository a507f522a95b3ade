//! Database entity models for session-cache-migrator.
//!
//! This module contains the Sea-ORM entity definitions for the relational
//! session schema the migrator reads from. The entities only describe the
//! tables; they declare no relations, so building a table from them never emits
//! foreign-key constraints. Joins are assembled at query time by the extractor.

/// Registered user accounts (`users`).
pub mod user;

/// Per-user display and notification preferences (`user_preferences`).
pub mod user_preferences;

/// Authenticated client sessions (`user_sessions`).
///
/// This is the driving table of the migration: every row that joins to a user
/// becomes one hash in the key-value sink.
pub mod user_session;

/// Free-form key/value attributes attached to a session (`session_data`).
pub mod session_data;
