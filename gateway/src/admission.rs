//! C3: admission middleware. Extracts `{chain, section, key}` from the
//! path, calls the Store, enforces `active`/daily-quota/chain-match, and
//! attaches the resolved App to the request as an explicit typed context
//! value (spec.md §9) for C4/C5/C6 to read downstream.

use crate::app::GatewayState;
use crate::errors::GatewayError;
use axum::extract::{FromRequestParts, Path, State};
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;
use entities::app;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::store::AdmitOutcome;

/// The path section of a proxied request: execution (JSON-RPC) or
/// consensus (REST).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Section {
    Execution,
    Consensus,
}

impl Section {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "exec" => Some(Self::Execution),
            "cons" => Some(Self::Consensus),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Consensus => "consensus",
        }
    }
}

/// Everything downstream handlers need about a request that has passed
/// admission: the resolved App plus the already-parsed route shape.
#[derive(Clone)]
pub struct RequestContext {
    pub app: Arc<app::Model>,
    pub chain: String,
    pub section: Section,
}

/// Axum middleware wired via `route_layer` onto the proxy routes only.
/// Mirrors spec.md §4.3 steps 1-6.
#[instrument(skip_all, fields(chain, section))]
pub async fn admission_middleware<B: Send + 'static>(
    State(state): State<Arc<GatewayState>>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let (mut parts, body) = req.into_parts();

    let params = match Path::<HashMap<String, String>>::from_request_parts(&mut parts, &state).await
    {
        Ok(Path(params)) => params,
        Err(_) => return GatewayError::MissingApiKey.into_response_axum(),
    };

    let chain = params.get("chain").cloned().unwrap_or_default();
    let section_raw = params.get("section").cloned().unwrap_or_default();
    let key_raw = params.get("key").cloned().unwrap_or_default();

    tracing::Span::current().record("chain", tracing::field::display(&chain));
    tracing::Span::current().record("section", tracing::field::display(&section_raw));

    if key_raw.is_empty() {
        return GatewayError::MissingApiKey.into_response_axum();
    }

    let section = match Section::parse(&section_raw) {
        Some(s) => s,
        None => return GatewayError::MissingApiKey.into_response_axum(),
    };

    let api_key = match Uuid::parse_str(&key_raw) {
        Ok(k) => k,
        Err(_) => return GatewayError::InvalidOrInactiveApiKey.into_response_axum(),
    };

    // `find_and_increment_by_api_key` fuses the daily rollover into the
    // same atomic statement as the increment (spec.md §4.2/§4.3, §8
    // scenario 5), so no separate reset call is needed -- and none should
    // be added here: a reset issued after the increment would wipe out the
    // request this call just counted on a day boundary.
    let app = match state.store.find_and_increment_by_api_key(api_key).await {
        Ok(AdmitOutcome::Admitted(app)) => app,
        Ok(AdmitOutcome::InvalidOrInactive) => {
            return GatewayError::InvalidOrInactiveApiKey.into_response_axum();
        }
        Err(err) => {
            warn!(error = %err, key_suffix = %redact(&key_raw), "store error during admission");
            return err.into_response_axum();
        }
    };

    crate::metrics::record_daily_requests(app.owner_user_id, &key_raw, app.daily_requests);

    // The counter has already moved by this point (spec.md §4.3 step 4 /
    // §7): a burst that crosses the limit records an over-limit value.
    // This is the documented policy, not a bug.
    if app.daily_requests > app.daily_requests_limit {
        return GatewayError::DailyLimitExceeded.into_response_axum();
    }

    if !app.chain_name.eq_ignore_ascii_case(&chain) {
        return GatewayError::ChainMismatch {
            expected_chain: app.chain_name.clone(),
        }
        .into_response_axum();
    }

    let context = RequestContext {
        app: Arc::new(app),
        chain,
        section,
    };

    parts.extensions.insert(context);

    let req = Request::from_parts(parts, body);
    next.run(req).await
}

/// Redact all but the last 6 characters of an API key for logs (spec.md
/// §7: persistence errors are logged with the key redacted).
pub fn redact(key: &str) -> String {
    if key.len() <= 6 {
        "*".repeat(key.len())
    } else {
        format!("{}{}", "*".repeat(key.len() - 6), &key[key.len() - 6..])
    }
}

impl GatewayError {
    /// `IntoResponse` is implemented for `GatewayError` itself, but
    /// middleware functions return a plain `Response`; this just saves a
    /// `.into_response()` at every call site above.
    fn into_response_axum(self) -> Response {
        use axum::response::IntoResponse;
        self.into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_parses_known_values_only() {
        assert_eq!(Section::parse("exec"), Some(Section::Execution));
        assert_eq!(Section::parse("cons"), Some(Section::Consensus));
        assert_eq!(Section::parse("other"), None);
    }

    #[test]
    fn redact_keeps_only_the_last_six_characters() {
        assert_eq!(redact("12345678-1234-1234-1234-123456789abc"), "*******************************789abc");
        assert_eq!(redact("abc"), "***");
    }
}
