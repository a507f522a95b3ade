//! Session attribute entity model.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model for the `session_data` table.
///
/// | Column          | Type                 | Description                        |
/// |-----------------|----------------------|------------------------------------|
/// | id              | BIGINT (Primary Key) | Row ID, orders same-instant writes |
/// | session_id      | TEXT                 | Owning session                     |
/// | attribute_key   | TEXT                 | Attribute name                     |
/// | attribute_value | TEXT NULL            | Attribute value                    |
/// | created_at      | DATETIME NULL        | When the attribute was written     |
///
/// A session may carry the same `attribute_key` more than once; the most
/// recently created row wins when attributes are folded into a map.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "session_data")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    #[sea_orm(column_type = "Text")]
    pub session_id: String,
    pub attribute_key: String,
    pub attribute_value: Option<String>,
    pub created_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
