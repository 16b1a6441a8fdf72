//! Utilities for logging errors for admins and displaying errors to callers.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use derive_more::{Display, Error, From};
use sea_orm::DbErr;
use serde_json::json;
use std::time::Duration;
use tracing::{error, warn};

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The gateway's error taxonomy, matching spec.md §7: Input (400), AuthZ
/// (403), NotFound (404), Quota (429), UpstreamTransport (502), Internal
/// (500).
#[derive(Debug, Display, Error, From)]
pub enum GatewayError {
    #[display(fmt = "missing API key in URL path")]
    #[from(ignore)]
    MissingApiKey,

    #[display(fmt = "invalid or inactive API key")]
    #[from(ignore)]
    InvalidOrInactiveApiKey,

    #[display(fmt = "API key is not valid for chain '{}'", expected_chain)]
    #[from(ignore)]
    ChainMismatch { expected_chain: String },

    #[display(fmt = "configuration for chain '{}' not found", _0)]
    #[from(ignore)]
    #[error(ignore)]
    UnknownChain(String),

    #[display(fmt = "{} URL not configured for chain {}", section, chain)]
    #[from(ignore)]
    SectionNotConfigured { chain: String, section: String },

    #[display(fmt = "daily request limit exceeded")]
    #[from(ignore)]
    DailyLimitExceeded,

    #[display(fmt = "rate limit exceeded")]
    #[from(ignore)]
    RateLimited {
        limit: u32,
        remaining: u32,
        retry_after: Duration,
    },

    #[display(fmt = "failed to connect to the {} {} node", chain, section)]
    #[from(ignore)]
    BadGateway { chain: String, section: String },

    #[display(fmt = "database error")]
    Database(DbErr),

    #[display(fmt = "internal error")]
    #[from(ignore)]
    Internal(anyhow::Error),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Self::MissingApiKey => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Missing API key in URL path" }),
            ),
            Self::InvalidOrInactiveApiKey => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Invalid or inactive API key" }),
            ),
            Self::ChainMismatch { expected_chain } => (
                StatusCode::FORBIDDEN,
                json!({
                    "error": format!("API key is not valid for chain '{}'", expected_chain),
                    "expectedChain": expected_chain,
                }),
            ),
            Self::UnknownChain(chain) => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("Configuration for chain '{}' not found.", chain) }),
            ),
            Self::SectionNotConfigured { chain, section } => (
                StatusCode::NOT_FOUND,
                json!({ "error": format!("{} URL not configured for chain {}", section, chain) }),
            ),
            Self::DailyLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({ "error": "Daily request limit exceeded" }),
            ),
            Self::RateLimited {
                limit,
                remaining,
                retry_after,
            } => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({
                    "error": "Rate limit exceeded",
                    "limit": limit,
                    "remaining": remaining,
                    "retryAfter": retry_after.as_secs().max(1),
                }),
            ),
            Self::BadGateway { chain, section } => (
                StatusCode::BAD_GATEWAY,
                json!({
                    "error": "Bad Gateway",
                    "message": format!("Failed to connect to the {} {} node", chain, section),
                    "endpointType": format!("{}-{}", chain, section),
                }),
            ),
            Self::Database(err) => {
                error!(?err, "database error on gateway hot path");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
            Self::Internal(err) => {
                warn!(?err, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "internal server error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
