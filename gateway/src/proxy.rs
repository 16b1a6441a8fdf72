//! C5: the reverse proxy engine. Parses `/{chain}/{section}/{key}/<tail>`
//! (the admission middleware has already validated `chain`/`section`/`key`
//! and attached the `RequestContext`), picks an upstream from C1, strips
//! the prefix deterministically (no regex -- spec.md §9), and forwards the
//! request verbatim.

use crate::admission::{RequestContext, Section};
use crate::app::GatewayState;
use crate::errors::GatewayError;
use axum::body::Bytes;
use axum::extract::{Extension, OriginalUri, Path, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{instrument, warn};

/// Headers the teacher-style reqwest client shouldn't forward verbatim:
/// `Host` gets rewritten to the upstream's authority, and hop-by-hop /
/// connection-management headers don't make sense across the proxy hop.
const STRIPPED_REQUEST_HEADERS: &[&str] = &["host", "content-length", "connection"];

#[instrument(skip_all, fields(chain, section))]
pub async fn proxy_handler(
    State(state): State<Arc<GatewayState>>,
    Extension(context): Extension<RequestContext>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Path(params): Path<HashMap<String, String>>,
    body: Bytes,
) -> Response {
    tracing::Span::current().record("chain", tracing::field::display(&context.chain));
    tracing::Span::current().record("section", context.section.as_str());

    let base_url = match context.section {
        Section::Execution => state.chain_registry.pick_execution(&context.chain),
        Section::Consensus => state.chain_registry.pick_consensus(&context.chain),
    };

    let base_url = match base_url {
        Some(url) => url,
        None => {
            return GatewayError::SectionNotConfigured {
                chain: context.chain.clone(),
                section: context.section.as_str().to_string(),
            }
            .into_response();
        }
    };

    let tail = params.get("tail").map(String::as_str).unwrap_or("");
    let target = build_target_url(&base_url, tail, uri.query());

    let mut outgoing = state.http_client.request(method, &target).body(body.clone());

    for (name, value) in headers.iter() {
        if STRIPPED_REQUEST_HEADERS.contains(&name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        outgoing = outgoing.header(name, value);
    }
    if let Some(host) = url::Url::parse(&target).ok().and_then(|u| u.host_str().map(str::to_owned)) {
        if let Ok(value) = HeaderValue::from_str(&host) {
            outgoing = outgoing.header("Host", value);
        }
    }

    let rpc_method = extract_rpc_method(&body);
    let endpoint_type = format!("{}-{}", context.chain, context.section.as_str());

    let started = Instant::now();
    let outcome = outgoing.send().await;
    let duration = started.elapsed();

    let response = match outcome {
        Ok(upstream_response) => {
            let status = upstream_response.status();
            let mut response_headers = upstream_response.headers().clone();
            let upstream_body = match upstream_response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(error = %err, "failed reading upstream response body");
                    return bad_gateway(&context);
                }
            };

            response_headers.remove("content-length");
            response_headers.remove("transfer-encoding");

            let mut response = (
                StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY),
                upstream_body,
            )
                .into_response();
            *response.headers_mut() = response_headers;
            response
        }
        Err(err) => {
            warn!(error = %err, upstream = %target, "upstream transport error");
            bad_gateway(&context)
        }
    };

    let status_code = response.status().as_u16();
    let response = response_with_headers(response, &context, duration);

    crate::metrics::record_proxy_request(crate::metrics::ProxyObservation {
        owner_user_id: context.app.owner_user_id,
        api_key: &context.app.api_key.to_string(),
        path: uri.path(),
        rpc_method: &rpc_method,
        endpoint_type: &endpoint_type,
        status_code,
        duration,
    });

    response
}

fn bad_gateway(context: &RequestContext) -> Response {
    GatewayError::BadGateway {
        chain: context.chain.clone(),
        section: context.section.as_str().to_string(),
    }
    .into_response()
}

fn build_target_url(base_url: &str, tail: &str, query: Option<&str>) -> String {
    let base = base_url.trim_end_matches('/');
    let tail = tail.trim_start_matches('/');

    let mut url = if tail.is_empty() {
        base.to_string()
    } else {
        format!("{base}/{tail}")
    };

    if let Some(query) = query {
        if !query.is_empty() {
            url.push('?');
            url.push_str(query);
        }
    }

    url
}

/// Extract the JSON-RPC `method` for metrics labeling only; the raw body
/// is always forwarded bit-exact regardless of what's found here (spec.md
/// §4.5 step 8-9).
fn extract_rpc_method(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(obj)) => obj
            .get("method")
            .and_then(|m| m.as_str())
            .map(str::to_owned)
            .unwrap_or_else(|| "unknown".to_string()),
        Ok(serde_json::Value::Array(_)) => "batch".to_string(),
        _ => "unknown".to_string(),
    }
}

fn response_with_headers(mut response: Response, context: &RequestContext, duration: std::time::Duration) -> Response {
    let headers = response.headers_mut();
    headers.insert("X-RPC-Gateway", HeaderValue::from_static("NodeBridge"));
    let endpoint_type = format!("{}-{}", context.chain, context.section.as_str());
    if let Ok(value) = HeaderValue::from_str(&endpoint_type) {
        headers.insert("X-Endpoint-Type", value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{:.6}s", duration.as_secs_f64())) {
        headers.insert("X-Response-Time", value);
    }
    response
}
