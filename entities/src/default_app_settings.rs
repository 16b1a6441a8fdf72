//! Singleton defaults consulted only when provisioning new Apps.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "default_app_settings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub default_max_rps: i32,

    pub default_daily_requests_limit: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
