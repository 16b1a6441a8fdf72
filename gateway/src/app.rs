//! C8: the supervisor. Wires C1-C7 together, builds the axum `Router` in
//! the middleware order spec.md §4.8 specifies, and owns process
//! lifecycle: binds the listener, starts the C4 sweeper and C7 sampler,
//! and drains in-flight requests on shutdown. Mirrors the shape of the
//! teacher's `Web3ProxyApp::spawn` (build a shared `Arc<State>`, spawn
//! background tasks, hand back a future the binary awaits).

use crate::admission::admission_middleware;
use crate::chain_registry::ChainRegistry;
use crate::config::AppConfig;
use crate::health::{health_handler, start_sampler, HealthSnapshot};
use crate::metrics::metrics_handler;
use crate::proxy::proxy_handler;
use crate::rate_limit_mw::rate_limit_middleware;
use crate::store::Store;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get};
use axum::Router;
use dashmap::DashMap;
use rate_limiter::{start_sweeper, SweeperHandle, TokenBucketLimiter};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

static APP_USER_AGENT: &str = concat!("nodebridge/", env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

pub struct GatewayState {
    pub store: Arc<dyn Store>,
    pub chain_registry: ChainRegistry,
    pub limiter: Arc<TokenBucketLimiter>,
    pub http_client: reqwest::Client,
    pub health_cache: DashMap<String, HealthSnapshot>,
    pub config: AppConfig,
}

impl GatewayState {
    pub async fn build(config: AppConfig, store: Arc<dyn Store>) -> anyhow::Result<Arc<Self>> {
        let store_chains = store.find_chains().await?;
        let chain_registry = ChainRegistry::from_sources(&config, &store_chains);

        let http_client = reqwest::ClientBuilder::new()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .user_agent(APP_USER_AGENT)
            .build()?;

        Ok(Arc::new(Self {
            store,
            chain_registry,
            limiter: Arc::new(TokenBucketLimiter::new()),
            http_client,
            health_cache: DashMap::new(),
            config,
        }))
    }
}

/// Bundle of background tasks the binary must stop on shutdown.
pub struct Background {
    pub sweeper: SweeperHandle,
    pub sampler: JoinHandle<()>,
}

/// Start the C4 sweeper and the C7 periodic sampler. Returns handles so
/// the caller can stop both deterministically (spec.md §4.4, §4.8).
pub fn start_background_tasks(state: Arc<GatewayState>) -> Background {
    let sweeper = start_sweeper(state.limiter.clone(), None);
    let sample_interval = state.config.health_sample_interval;
    let sampler = start_sampler(state, sample_interval);

    Background { sweeper, sampler }
}

/// In-flight request gauge, tracked as its own tiny middleware so it wraps
/// every route (including `/health` and `/metrics`), not just the proxy.
async fn track_active_connections<B: Send + 'static>(req: Request<B>, next: Next<B>) -> Response {
    crate::metrics::ACTIVE_CONNECTIONS.inc();
    let response = next.run(req).await;
    crate::metrics::ACTIVE_CONNECTIONS.dec();
    response
}

/// Build the router in the order spec.md §4.8 names: security headers,
/// CORS, body parsing (axum extractors handle this per-route), metrics
/// middleware, then the admission-scoped routes wrapping the reverse
/// proxy. `/health` and `/metrics` sit outside admission -- neither is a
/// tenant-scoped route.
pub fn router(state: Arc<GatewayState>) -> Router {
    let proxy_routes = Router::new()
        .route("/:chain/:section/:key/*tail", any(proxy_handler))
        .route("/:chain/:section/:key", any(proxy_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware))
        .route_layer(middleware::from_fn_with_state(state.clone(), admission_middleware));

    Router::new()
        .merge(proxy_routes)
        .route("/health/:chain", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(track_active_connections))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(SetResponseHeaderLayer::if_not_present(
            axum::http::header::HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .with_state(state)
}

/// Run the listener until a shutdown signal arrives, then stop the
/// background tasks and drop the Store's connection pool (the caller owns
/// `state`, so dropping the last `Arc` happens when this returns).
pub async fn serve(state: Arc<GatewayState>) -> anyhow::Result<()> {
    let port = state.config.port;
    let background = start_background_tasks(state.clone());
    let app = router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "gateway listening");

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down background tasks");
    background.sweeper.stop();
    background.sampler.abort();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            signal.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received, draining in-flight requests");
}
