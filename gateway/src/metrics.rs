//! C6: usage observability. `prometheus`-registered counters/histograms/
//! gauges, grounded on the corpus's habit of a single `lazy_static`
//! registry plus a plain exposition handler (see the teacher's
//! `redis_rate_limiter`/`latency` crates for the same "one struct, one
//! registry" shape).

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramVec, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use std::time::Duration;

const GATEWAY_DURATION_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0];
const RPC_DURATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0];

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::opts!(
            "rpc_gateway_requests_total",
            "Total proxied requests, labeled by tenant/key/path/method/status"
        ),
        &["user_id", "api_key", "path", "method", "status_code"],
    )
    .unwrap();

    pub static ref REQUEST_DURATION: HistogramVec = HistogramVec::new(
        prometheus::histogram_opts!(
            "rpc_gateway_request_duration_seconds",
            "Gateway-observed request duration",
            GATEWAY_DURATION_BUCKETS.to_vec()
        ),
        &["user_id", "api_key", "path", "method"],
    )
    .unwrap();

    pub static ref ACTIVE_CONNECTIONS: IntGauge = IntGauge::new(
        "rpc_gateway_active_connections",
        "In-flight proxied requests"
    )
    .unwrap();

    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::opts!(
            "rpc_requests_total",
            "Total RPC calls forwarded, labeled by rpc method and endpoint type"
        ),
        &["user_id", "api_key", "rpc_method", "endpoint_type"],
    )
    .unwrap();

    pub static ref RPC_REQUEST_DURATION: HistogramVec = HistogramVec::new(
        prometheus::histogram_opts!(
            "rpc_request_duration_seconds",
            "Upstream RPC call duration",
            RPC_DURATION_BUCKETS.to_vec()
        ),
        &["user_id", "api_key", "rpc_method", "endpoint_type"],
    )
    .unwrap();

    pub static ref RATE_LIMIT_HITS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::opts!(
            "rpc_gateway_rate_limit_hits_total",
            "Requests rejected by the token-bucket limiter"
        ),
        &["user_id", "api_key"],
    )
    .unwrap();

    pub static ref USER_DAILY_REQUESTS: prometheus::IntGaugeVec = prometheus::IntGaugeVec::new(
        prometheus::opts!(
            "rpc_gateway_user_daily_requests",
            "Most recently observed daily request count per key"
        ),
        &["user_id", "api_key"],
    )
    .unwrap();
}

/// Register every collector with the process registry. Idempotent to call
/// at most once; call from the supervisor at boot.
pub fn init() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS_TOTAL.clone()),
        Box::new(REQUEST_DURATION.clone()),
        Box::new(ACTIVE_CONNECTIONS.clone()),
        Box::new(RPC_REQUESTS_TOTAL.clone()),
        Box::new(RPC_REQUEST_DURATION.clone()),
        Box::new(RATE_LIMIT_HITS_TOTAL.clone()),
        Box::new(USER_DAILY_REQUESTS.clone()),
    ];

    for collector in collectors {
        // A second call to `init()` (e.g. in tests that build more than one
        // app instance in the same process) would otherwise panic.
        let _ = REGISTRY.register(collector);
    }

    #[cfg(target_os = "linux")]
    if let Ok(pc) = prometheus::process_collector::ProcessCollector::for_self() {
        let _ = REGISTRY.register(Box::new(pc));
    }
}

/// Record a completed proxy forward: C5 calls this once per request,
/// success or upstream failure alike (spec.md §4.5 step 6-9).
pub struct ProxyObservation<'a> {
    pub owner_user_id: i64,
    pub api_key: &'a str,
    pub path: &'a str,
    pub rpc_method: &'a str,
    pub endpoint_type: &'a str,
    pub status_code: u16,
    pub duration: Duration,
}

pub fn record_proxy_request(obs: ProxyObservation<'_>) {
    let user_id = obs.owner_user_id.to_string();
    let status = obs.status_code.to_string();

    REQUESTS_TOTAL
        .with_label_values(&[&user_id, obs.api_key, obs.path, obs.rpc_method, &status])
        .inc();

    REQUEST_DURATION
        .with_label_values(&[&user_id, obs.api_key, obs.path, obs.rpc_method])
        .observe(obs.duration.as_secs_f64());

    RPC_REQUESTS_TOTAL
        .with_label_values(&[&user_id, obs.api_key, obs.rpc_method, obs.endpoint_type])
        .inc();

    RPC_REQUEST_DURATION
        .with_label_values(&[&user_id, obs.api_key, obs.rpc_method, obs.endpoint_type])
        .observe(obs.duration.as_secs_f64());
}

pub fn record_rate_limit_hit(owner_user_id: i64, api_key: &str) {
    RATE_LIMIT_HITS_TOTAL
        .with_label_values(&[&owner_user_id.to_string(), api_key])
        .inc();
}

pub fn record_daily_requests(owner_user_id: i64, api_key: &str, daily_requests: i64) {
    USER_DAILY_REQUESTS
        .with_label_values(&[&owner_user_id.to_string(), api_key])
        .set(daily_requests);
}

/// `GET /metrics`: unauthenticated text-format exposition.
pub async fn metrics_handler() -> impl axum::response::IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(?err, "failed to encode prometheus metrics");
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "failed to encode metrics".to_string(),
        );
    }

    match String::from_utf8(buffer) {
        Ok(body) => (axum::http::StatusCode::OK, body),
        Err(err) => {
            tracing::error!(?err, "prometheus output was not valid utf8");
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "failed to encode metrics".to_string(),
            )
        }
    }
}
