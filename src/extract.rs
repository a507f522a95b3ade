//! Reads denormalized sessions out of the relational source.

use std::collections::BTreeMap;

use sea_orm::prelude::DateTime;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, FromQueryResult, JoinType, QueryFilter,
    QueryOrder, QuerySelect, RelationDef,
};
use tracing::{debug, info};

use crate::entity::{session_data, user, user_preferences, user_session};
use crate::error::ExtractionError;

/// Theme used when the user has no preference row or the column is NULL.
pub const DEFAULT_THEME: &str = "light";
/// Language used when the user has no preference row or the column is NULL.
pub const DEFAULT_LANGUAGE: &str = "en";
/// Notification setting used when the user has no preference row or the column is NULL.
pub const DEFAULT_NOTIFICATIONS_ENABLED: bool = true;

/// Attribute key to value, with unique keys.
pub type AttributeMap = BTreeMap<String, Option<String>>;

/// A session joined to its owning user and, when present, the user's preferences.
///
/// Preference columns have already been defaulted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: i64,
    // `user_sessions` columns
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_created_at: Option<DateTime>,
    pub expires_at: Option<DateTime>,
    pub last_activity_at: Option<DateTime>,
    // `users` columns
    pub username: Option<String>,
    pub email: Option<String>,
    pub user_created_at: Option<DateTime>,
    pub last_login_at: Option<DateTime>,
    // `user_preferences` columns
    pub theme: String,
    pub language: String,
    pub notifications_enabled: bool,
    /// `None` when the user has no preference row.
    pub preferences_updated_at: Option<DateTime>,
}

/// One row of `session_data`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeRecord {
    pub session_id: String,
    pub key: String,
    pub value: Option<String>,
    /// Rows are ordered by this, then by row ID.
    pub created_at: Option<DateTime>,
}

/// A session together with its attributes, both folded and raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedSession {
    pub record: SessionRecord,
    /// Attributes folded into a map, later rows overriding earlier ones.
    pub attributes: AttributeMap,
    /// Attribute rows in source order, kept for auditing.
    pub raw_attributes: Vec<AttributeRecord>,
}

/// Raw result row of the session join, before preference defaults.
#[derive(Debug, FromQueryResult)]
struct SessionRow {
    session_id: String,
    user_id: i64,
    ip_address: Option<String>,
    user_agent: Option<String>,
    session_created_at: Option<DateTime>,
    expires_at: Option<DateTime>,
    last_activity_at: Option<DateTime>,
    username: Option<String>,
    email: Option<String>,
    user_created_at: Option<DateTime>,
    last_login_at: Option<DateTime>,
    theme: Option<String>,
    language: Option<String>,
    notifications_enabled: Option<bool>,
    preferences_updated_at: Option<DateTime>,
}

impl From<SessionRow> for SessionRecord {
    fn from(row: SessionRow) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            ip_address: row.ip_address,
            user_agent: row.user_agent,
            session_created_at: row.session_created_at,
            expires_at: row.expires_at,
            last_activity_at: row.last_activity_at,
            username: row.username,
            email: row.email,
            user_created_at: row.user_created_at,
            last_login_at: row.last_login_at,
            theme: non_empty_or(row.theme, DEFAULT_THEME),
            language: non_empty_or(row.language, DEFAULT_LANGUAGE),
            notifications_enabled: row
                .notifications_enabled
                .unwrap_or(DEFAULT_NOTIFICATIONS_ENABLED),
            preferences_updated_at: row.preferences_updated_at,
        }
    }
}

impl From<session_data::Model> for AttributeRecord {
    fn from(model: session_data::Model) -> Self {
        Self {
            session_id: model.session_id,
            key: model.attribute_key,
            value: model.attribute_value,
            created_at: model.created_at,
        }
    }
}

fn non_empty_or(value: Option<String>, default: &str) -> String {
    value
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Folds attribute rows into a map. Later rows win on duplicate keys.
pub fn fold_attributes(rows: &[AttributeRecord]) -> AttributeMap {
    rows.iter()
        .map(|attr| (attr.key.clone(), attr.value.clone()))
        .collect()
}

/// Read-only access to the session tables.
#[derive(Debug, Clone, Copy)]
pub struct SessionExtractor<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> SessionExtractor<'a, C> {
    /// Creates an extractor reading through `conn`.
    ///
    /// # Parameters
    ///
    /// * `conn` - A database connection or transaction. Only `SELECT`s are issued.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use sea_orm::Database;
    /// use session_cache_migrator::SessionExtractor;
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let conn = Database::connect("mysql://root@localhost:3306/user_session_management").await?;
    /// let sessions = SessionExtractor::new(&conn).extract().await?;
    /// println!("{} sessions", sessions.len());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Extracts every session that belongs to an existing user, ordered by session ID.
    ///
    /// Any read error aborts the whole extraction.
    pub async fn extract(&self) -> Result<Vec<ExtractedSession>, ExtractionError> {
        let records = self.sessions().await?;
        info!(count = records.len(), "extracted session records");

        let mut extracted = Vec::with_capacity(records.len());
        for record in records {
            let raw_attributes = self.attributes(&record.session_id).await?;
            let attributes = fold_attributes(&raw_attributes);
            debug!(
                session_id = %record.session_id,
                rows = raw_attributes.len(),
                keys = attributes.len(),
                "fetched session attributes"
            );
            extracted.push(ExtractedSession {
                record,
                attributes,
                raw_attributes,
            });
        }

        Ok(extracted)
    }

    /// Runs the session join: inner join on `users`, left join on `user_preferences`.
    pub async fn sessions(&self) -> Result<Vec<SessionRecord>, ExtractionError> {
        let rows = user_session::Entity::find()
            .select_only()
            .column_as(user_session::Column::SessionId, "session_id")
            .column_as(user_session::Column::UserId, "user_id")
            .column_as(user_session::Column::IpAddress, "ip_address")
            .column_as(user_session::Column::UserAgent, "user_agent")
            .column_as(user_session::Column::CreatedAt, "session_created_at")
            .column_as(user_session::Column::ExpiresAt, "expires_at")
            .column_as(user_session::Column::LastActivityAt, "last_activity_at")
            .column_as(user::Column::Username, "username")
            .column_as(user::Column::Email, "email")
            .column_as(user::Column::CreatedAt, "user_created_at")
            .column_as(user::Column::LastLoginAt, "last_login_at")
            .column_as(user_preferences::Column::Theme, "theme")
            .column_as(user_preferences::Column::Language, "language")
            .column_as(
                user_preferences::Column::NotificationsEnabled,
                "notifications_enabled",
            )
            .column_as(user_preferences::Column::UpdatedAt, "preferences_updated_at")
            .join(JoinType::InnerJoin, session_user())
            .join(JoinType::LeftJoin, session_preferences())
            .order_by_asc(user_session::Column::SessionId)
            .into_model::<SessionRow>()
            .all(self.conn)
            .await
            .map_err(ExtractionError::Sessions)?;

        Ok(rows.into_iter().map(SessionRecord::from).collect())
    }

    /// Fetches the attribute rows of one session, oldest first.
    pub async fn attributes(&self, session_id: &str) -> Result<Vec<AttributeRecord>, ExtractionError> {
        let rows = session_data::Entity::find()
            .filter(session_data::Column::SessionId.eq(session_id))
            .order_by_asc(session_data::Column::CreatedAt)
            .order_by_asc(session_data::Column::Id)
            .all(self.conn)
            .await
            .map_err(|source| ExtractionError::Attributes {
                session_id: session_id.to_string(),
                source,
            })?;

        Ok(rows.into_iter().map(AttributeRecord::from).collect())
    }
}

fn session_user() -> RelationDef {
    user_session::Entity::belongs_to(user::Entity)
        .from(user_session::Column::UserId)
        .to(user::Column::UserId)
        .into()
}

fn session_preferences() -> RelationDef {
    user_session::Entity::belongs_to(user_preferences::Entity)
        .from(user_session::Column::UserId)
        .to(user_preferences::Column::UserId)
        .into()
}
