//! A tenant credential unit: owns an API key, a chain binding, and quotas.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "apps")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    pub owner_user_id: i64,

    pub name: String,

    pub description: Option<String>,

    /// UUIDv4, globally unique, immutable after creation.
    #[sea_orm(unique)]
    pub api_key: Uuid,

    pub chain_name: String,

    pub chain_id: String,

    /// Max sustained requests per second (token-bucket capacity and rate).
    pub max_rps: i32,

    pub daily_requests_limit: i64,

    pub total_requests: i64,

    pub daily_requests: i64,

    pub last_reset_date: Date,

    pub active: bool,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
