//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router for the proxied, audit and health surfaces
//! - Wire up middleware (tracing, request timeout, audit auth)
//! - Serve on a listener until shutdown is signalled
//! - Drain in-flight capture tasks before returning

use axum::{
    middleware,
    routing::{any, delete, get},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_util::task::TaskTracker;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::capture::CapturePipeline;
use crate::config::{AppConfig, AuditConfig};
use crate::forward::ForwardingEngine;
use crate::http::{audit, auth, health, proxy};
use crate::store::AuditStore;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<CapturePipeline>,
    pub store: Arc<dyn AuditStore>,
    pub audit: AuditConfig,
    pub max_body_size: usize,
    /// Capture tasks spawned by the proxy handler.
    pub tasks: TaskTracker,
}

/// HTTP server for the honeypot proxy.
pub struct HttpServer {
    router: Router,
    config: AppConfig,
    tasks: TaskTracker,
}

impl HttpServer {
    /// Create a server around an opened store and a ready forwarding engine.
    pub fn new(config: AppConfig, store: Arc<dyn AuditStore>, engine: ForwardingEngine) -> Self {
        let pipeline = Arc::new(CapturePipeline::new(store.clone(), engine));
        let tasks = TaskTracker::new();
        let state = AppState {
            pipeline,
            store,
            audit: config.audit.clone(),
            max_body_size: config.listener.max_body_size,
            tasks: tasks.clone(),
        };

        let router = Self::build_router(&config, state);
        Self {
            router,
            config,
            tasks,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &AppConfig, state: AppState) -> Router {
        let audit_routes = Router::new()
            .route("/audit/requests", get(audit::list_requests))
            .route("/audit/requests/{id}", delete(audit::delete_request))
            .route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth::audit_auth_middleware,
            ));

        Router::new()
            .route(proxy::PROXY_PREFIX, any(proxy::proxy_handler))
            .route("/api/{*endpoint}", any(proxy::proxy_handler))
            .route("/health", get(health::health_handler))
            .merge(audit_routes)
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(TimeoutLayer::new(Duration::from_secs(
                        config.timeouts.request_secs,
                    ))),
            )
    }

    /// The router, for serving or for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections until `shutdown` fires, then
    /// wait up to `timeouts.drain_secs` for in-flight captures to be recorded.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.base_url,
            "HTTP server starting"
        );

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        self.tasks.close();
        let drain = Duration::from_secs(self.config.timeouts.drain_secs);
        if !self.tasks.is_empty() {
            tracing::info!(pending = self.tasks.len(), "Draining in-flight captures");
        }
        if tokio::time::timeout(drain, self.tasks.wait()).await.is_err() {
            tracing::warn!(
                pending = self.tasks.len(),
                drain_secs = self.config.timeouts.drain_secs,
                "Drain timed out, abandoning in-flight captures"
            );
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
