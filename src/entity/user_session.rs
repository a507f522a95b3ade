//! Session entity model for Sea-ORM database interaction.
//!
//! This module defines the database schema representation of the
//! `user_sessions` table, the table that drives the migration.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model representing one authenticated session.
///
/// # Database Schema
///
/// | Column           | Type               | Description                          |
/// |------------------|--------------------|--------------------------------------|
/// | session_id       | TEXT (Primary Key) | Session ID, becomes the sink key     |
/// | user_id          | BIGINT             | Owning user                          |
/// | ip_address       | TEXT NULL          | Client address at login              |
/// | user_agent       | TEXT NULL          | Client user agent at login           |
/// | created_at       | DATETIME NULL      | Session creation time                |
/// | expires_at       | DATETIME NULL      | Absolute expiration, drives the TTL  |
/// | last_activity_at | DATETIME NULL      | Last observed activity               |
///
/// Timestamps are stored without a timezone and are interpreted as UTC.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_sessions")]
pub struct Model {
    /// The unique session identifier.
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub session_id: String,

    /// Identifier of the owning row in `users`.
    ///
    /// Sessions whose user no longer exists are skipped by the extractor.
    pub user_id: i64,

    pub ip_address: Option<String>,

    pub user_agent: Option<String>,

    pub created_at: Option<DateTime>,

    /// The session expiration timestamp.
    ///
    /// The migrator converts this into a remaining time-to-live on the sink key.
    /// A missing or already elapsed value leaves the key without expiration.
    pub expires_at: Option<DateTime>,

    pub last_activity_at: Option<DateTime>,
}

/// Required enum for Sea-ORM entity relations.
///
/// Joins to `users` and `user_preferences` are built at query time, so no
/// relations are declared here.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
