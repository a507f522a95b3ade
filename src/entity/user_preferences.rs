//! User preference entity model.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model for the `user_preferences` table.
///
/// Keyed by `user_id`, so a user has at most one preference row. Every column
/// besides the key may be NULL; the extractor substitutes defaults per column.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "user_preferences")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    pub theme: Option<String>,
    pub language: Option<String>,
    pub notifications_enabled: Option<bool>,
    pub updated_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
