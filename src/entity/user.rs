//! User entity model.

use sea_orm::entity::prelude::*;

/// Sea-ORM entity model for the `users` table.
///
/// | Column        | Type                 | Description               |
/// |---------------|----------------------|---------------------------|
/// | user_id       | BIGINT (Primary Key) | User ID                   |
/// | username      | TEXT NULL            | Login name                |
/// | email         | TEXT NULL            | Contact address           |
/// | created_at    | DATETIME NULL        | Account creation time     |
/// | last_login_at | DATETIME NULL        | Most recent login         |
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: i64,
    pub username: Option<String>,
    pub email: Option<String>,
    pub created_at: Option<DateTime>,
    pub last_login_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
