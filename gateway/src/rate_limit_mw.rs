//! C4 integration: wraps `rate_limiter::TokenBucketLimiter` as axum
//! middleware, setting `X-RateLimit-*` on both the allow and deny paths
//! and turning a deny into the 429 envelope spec.md §4.4 specifies.

use crate::admission::RequestContext;
use crate::app::GatewayState;
use crate::errors::GatewayError;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

pub async fn rate_limit_middleware<B: Send + 'static>(
    State(state): State<Arc<GatewayState>>,
    req: Request<B>,
    next: Next<B>,
) -> Response {
    let context = match req.extensions().get::<RequestContext>() {
        Some(ctx) => ctx.clone(),
        None => {
            // The admission middleware must run first; reaching here
            // without a context means the routes were wired wrong.
            return GatewayError::Internal(anyhow::anyhow!("missing request context")).into_response();
        }
    };

    let decision = state
        .limiter
        .check(context.app.api_key, context.app.max_rps.max(0) as u32);

    let mut response = if decision.allowed {
        next.run(req).await
    } else {
        crate::metrics::record_rate_limit_hit(context.app.owner_user_id, &context.app.api_key.to_string());
        GatewayError::RateLimited {
            limit: decision.limit,
            remaining: decision.remaining,
            retry_after: decision.retry_after,
        }
        .into_response()
    };

    let headers = response.headers_mut();
    headers.insert(
        "X-RateLimit-Limit",
        HeaderValue::from_str(&decision.limit.to_string()).unwrap(),
    );
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from_str(&decision.remaining.to_string()).unwrap(),
    );
    if let Ok(value) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
        headers.insert("X-RateLimit-Reset", value);
    }

    response
}
