//! A named blockchain network and its configured upstream node URLs.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chains")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Unique, case-insensitive display name (e.g. "sepolia").
    #[sea_orm(unique)]
    pub name: String,

    /// Unique chain id string (e.g. "11155111").
    #[sea_orm(unique)]
    pub chain_id: String,

    pub enabled: bool,

    pub admin_notes: Option<String>,

    /// Comma-separated execution (JSON-RPC) upstream URLs.
    pub execution_urls: String,

    /// Comma-separated consensus (REST) upstream URLs.
    pub consensus_urls: String,

    /// Comma-separated Prometheus exporter URLs.
    pub prometheus_urls: String,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
