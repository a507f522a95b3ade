#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait,
    Schema,
};
use session_cache_migrator::entity::{session_data, user, user_preferences, user_session};
use session_cache_migrator::{KeyTtl, MemorySink, SessionSink, SinkError};

/// Opens a single-connection in-memory SQLite database with the session tables.
pub async fn setup_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();

    let backend = db.get_database_backend();
    let schema = Schema::new(backend);
    let statements = [
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(user_preferences::Entity),
        schema.create_table_from_entity(user_session::Entity),
        schema.create_table_from_entity(session_data::Entity),
    ];
    for stmt in statements {
        db.execute(backend.build(&stmt)).await.unwrap();
    }
    db
}

pub fn hours_from_now(hours: i64) -> NaiveDateTime {
    (Utc::now() + Duration::hours(hours)).naive_utc()
}

pub fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
}

pub async fn insert_user(db: &DatabaseConnection, user_id: i64, username: &str) {
    user::Entity::insert(user::ActiveModel {
        user_id: Set(user_id),
        username: Set(Some(username.to_string())),
        email: Set(Some(format!("{username}@example.com"))),
        created_at: Set(Some(at("2023-01-01 00:00:00"))),
        last_login_at: Set(None),
    })
    .exec(db)
    .await
    .unwrap();
}

pub async fn insert_preferences(
    db: &DatabaseConnection,
    user_id: i64,
    theme: Option<&str>,
    language: Option<&str>,
    notifications_enabled: Option<bool>,
) {
    user_preferences::Entity::insert(user_preferences::ActiveModel {
        user_id: Set(user_id),
        theme: Set(theme.map(str::to_string)),
        language: Set(language.map(str::to_string)),
        notifications_enabled: Set(notifications_enabled),
        updated_at: Set(Some(at("2024-02-01 10:00:00"))),
    })
    .exec(db)
    .await
    .unwrap();
}

pub async fn insert_session(
    db: &DatabaseConnection,
    session_id: &str,
    user_id: i64,
    expires_at: Option<NaiveDateTime>,
) {
    user_session::Entity::insert(user_session::ActiveModel {
        session_id: Set(session_id.to_string()),
        user_id: Set(user_id),
        ip_address: Set(Some("10.0.0.1".to_string())),
        user_agent: Set(None),
        created_at: Set(Some(at("2024-03-01 09:00:00"))),
        expires_at: Set(expires_at),
        last_activity_at: Set(None),
    })
    .exec(db)
    .await
    .unwrap();
}

pub async fn insert_attribute(
    db: &DatabaseConnection,
    session_id: &str,
    key: &str,
    value: Option<&str>,
    created_at: NaiveDateTime,
) {
    session_data::Entity::insert(session_data::ActiveModel {
        session_id: Set(session_id.to_string()),
        attribute_key: Set(key.to_string()),
        attribute_value: Set(value.map(str::to_string)),
        created_at: Set(Some(created_at)),
        ..Default::default()
    })
    .exec(db)
    .await
    .unwrap();
}

/// A sink that refuses to write one particular key.
pub struct FailingSink {
    pub inner: Arc<MemorySink>,
    pub fail_key: String,
}

#[async_trait]
impl SessionSink for FailingSink {
    async fn replace_hash(
        &self,
        key: &str,
        fields: &BTreeMap<String, String>,
    ) -> Result<(), SinkError> {
        if key == self.fail_key {
            return Err(SinkError::Backend("connection reset".to_string()));
        }
        self.inner.replace_hash(key, fields).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<(), SinkError> {
        self.inner.expire(key, seconds).await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SinkError> {
        self.inner.keys(pattern).await
    }

    async fn hash_fields(&self, key: &str) -> Result<HashMap<String, String>, SinkError> {
        self.inner.hash_fields(key).await
    }

    async fn ttl(&self, key: &str) -> Result<KeyTtl, SinkError> {
        self.inner.ttl(key).await
    }
}
