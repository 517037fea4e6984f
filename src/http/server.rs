//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (correlation ID, tracing, security headers, limits, metrics,
//!   problem enrichment, bulkheads)
//! - Serve on a plain TCP listener or TLS
//! - Apply hot-reloaded cache policies
//! - Shut breakers down once the listener has drained

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    extract::State,
    http::{header, HeaderValue},
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};
use tower::ServiceBuilder;
use tower_http::{
    limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer, timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::admin;
use crate::cache::{CacheBackend, CacheClient};
use crate::config::schema::{CachePolicies, GatewayConfig};
use crate::error::GatewayError;
use crate::http::middleware::bulkhead_middleware;
use crate::http::request::{make_request_span, propagate_correlation_layer, set_correlation_layer};
use crate::http::response::enrich_problem;
use crate::http::{news, saved};
use crate::net::tls;
use crate::observability::metrics;
use crate::resilience::{BreakerRegistry, Bulkhead, CircuitState, Dependency};
use crate::saved::SavedStore;
use crate::upstream::{NytClient, UpstreamError};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    /// Hot-reloadable caching policies.
    pub policies: Arc<ArcSwap<CachePolicies>>,
    pub cache: CacheClient,
    pub breakers: Arc<BreakerRegistry>,
    pub bulkhead: Arc<Bulkhead>,
    pub upstream: NytClient,
    pub saved: SavedStore,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(config: GatewayConfig, backend: Arc<dyn CacheBackend>) -> Result<Self, UpstreamError> {
        let breakers = Arc::new(BreakerRegistry::init(&config.resilience));
        let mut cache = CacheClient::new(backend, &config.cache);
        if let Ok(breaker) = breakers.breaker(Dependency::Cache) {
            cache = cache.with_breaker(breaker.clone());
        }

        Ok(Self {
            policies: Arc::new(ArcSwap::from_pointee(config.cache.policies.clone())),
            cache,
            breakers,
            bulkhead: Arc::new(Bulkhead::new(&config.bulkheads)),
            upstream: NytClient::new(&config.upstream)?,
            saved: SavedStore::new(),
            started_at: Instant::now(),
            config: Arc::new(config),
        })
    }

    /// Swap in the hot-reloadable parts of `new`.
    pub fn apply_reload(&self, new: &GatewayConfig) {
        if **self.policies.load() != new.cache.policies {
            self.policies.store(Arc::new(new.cache.policies.clone()));
            tracing::info!("Cache policies reloaded");
        }
        tracing::info!("Configuration reloaded; sections other than cache policies apply on restart");
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    state: AppState,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration and cache backend.
    pub fn new(config: GatewayConfig, backend: Arc<dyn CacheBackend>) -> Result<Self, UpstreamError> {
        let state = AppState::new(config, backend)?;
        let router = Self::build_router(state.clone());
        Ok(Self { router, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(state: AppState) -> Router {
        let config = state.config.clone();

        let api = Router::new()
            .route("/api/articles/search", get(news::article_search))
            .route("/api/top-stories/{section}", get(news::top_stories))
            .route("/api/archive/{year}/{month}", get(news::archive))
            .route("/api/books/{list}", get(news::books))
            .route("/api/most-popular/{kind}/{period}", get(news::most_popular))
            .route("/api/saved", get(saved::list).post(saved::create))
            .route(
                "/api/saved/{id}",
                get(saved::get_one).patch(saved::update).delete(saved::remove),
            )
            .route_layer(middleware::from_fn_with_state(
                state.bulkhead.clone(),
                bulkhead_middleware,
            ));

        let mut app = Router::new().route("/health", get(health)).merge(api);
        if config.admin.enabled {
            app = app.merge(admin::router(state.clone()));
        }

        // Outermost first.
        let layers = ServiceBuilder::new()
            .layer(set_correlation_layer())
            .layer(propagate_correlation_layer())
            .layer(TraceLayer::new_for_http().make_span_with(make_request_span))
            .layer(SetResponseHeaderLayer::if_not_present(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(middleware::from_fn(enrich_problem))
            .layer(middleware::from_fn(metrics::track_metrics))
            // Innermost: it rewraps the body as `Limited<Body>`, which the
            // `from_fn` layers above cannot accept.
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size));

        app.fallback(not_found).with_state(state).layer(layers)
    }

    /// Run the server on `listener` until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let reload = spawn_reload(self.state.clone(), config_updates);

        axum::serve(
            listener,
            self.router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
            tracing::info!("Shutdown signal received, draining connections");
        })
        .await?;

        reload.abort();
        self.state.breakers.shutdown();
        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS on `addr` until `shutdown` fires.
    pub async fn run_tls(
        self,
        addr: SocketAddr,
        cert_path: &str,
        key_path: &str,
        config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let tls_config = tls::load_tls_config(Path::new(cert_path), Path::new(key_path)).await?;
        let grace = Duration::from_secs(self.state.config.timeouts.shutdown_grace_secs);
        let reload = spawn_reload(self.state.clone(), config_updates);

        tls::serve_tls(self.router, addr, tls_config, shutdown, grace).await?;

        reload.abort();
        self.state.breakers.shutdown();
        tracing::info!("HTTPS server stopped");
        Ok(())
    }
}

fn spawn_reload(
    state: AppState,
    mut config_updates: mpsc::UnboundedReceiver<GatewayConfig>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(new_config) = config_updates.recv().await {
            state.apply_reload(&new_config);
        }
    })
}

/// Liveness probe. Always 200; reports `degraded` while any breaker is open.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let statuses = state.breakers.all_status();
    let degraded = statuses.values().any(|s| s.state == CircuitState::Open);
    let breakers: serde_json::Map<String, serde_json::Value> = statuses
        .into_iter()
        .map(|(dep, status)| (dep.to_string(), json!(status.state)))
        .collect();

    Json(json!({
        "status": if degraded { "degraded" } else { "ok" },
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSecs": state.started_at.elapsed().as_secs(),
        "cacheBackend": state.cache.backend_name(),
        "breakers": breakers,
    }))
}

async fn not_found() -> GatewayError {
    GatewayError::NotFound("no route matches this path".to_string())
}
