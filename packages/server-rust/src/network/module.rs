//! Network module with deferred startup lifecycle.
//!
//! Implements the deferred startup pattern: `new()` creates resources,
//! `start()` binds the TCP listener, and `serve()` starts accepting
//! connections.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::config::{NetworkConfig, TlsConfig};
use super::handlers::{
    child_handler, health_handler, list_handler, liveness_handler, perform_handler,
    readiness_handler, AppState,
};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::render::{AcceptHeaderNegotiator, ContentNegotiator};
use crate::service::DomainDirectory;

/// How long `serve()` waits for in-flight operations after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Assembles the axum router with all routes and middleware.
///
/// Routes:
/// - `GET /health` -- detailed health JSON
/// - `GET /health/live` -- liveness probe
/// - `GET /health/ready` -- readiness probe
/// - `GET|POST {directory}` and `{directory}/` -- listing and operations
/// - `GET {directory}/{segment}` -- static child or live domain
pub fn build_router(state: AppState) -> Router {
    let layers = build_http_layers(&state.config);
    let body_limit = DefaultBodyLimit::max(state.config.max_body_bytes);
    let dir = state.config.directory_route();

    let directory = get(list_handler).post(perform_handler);
    let mut router = Router::new()
        .route("/health", get(health_handler))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler));

    if dir.is_empty() {
        router = router
            .route("/", directory)
            .route("/{segment}", get(child_handler));
    } else {
        router = router
            .route(&dir, directory.clone())
            .route(&format!("{dir}/"), directory)
            .route(&format!("{dir}/{{segment}}"), get(child_handler));
    }

    router.layer(body_limit).layer(layers).with_state(state)
}

/// Manages the HTTP server lifecycle for one domain directory.
///
/// Follows the deferred startup pattern:
/// 1. `new()` -- allocates shared state (shutdown controller)
/// 2. `start()` -- binds TCP listener to the configured address
/// 3. `serve()` -- begins accepting connections until shutdown is signalled
pub struct NetworkModule {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    directory: Arc<DomainDirectory>,
    negotiator: Arc<dyn ContentNegotiator>,
    shutdown: Arc<ShutdownController>,
}

impl NetworkModule {
    /// Creates a new network module without binding any port. Responses are
    /// negotiated with [`AcceptHeaderNegotiator`] unless replaced.
    #[must_use]
    pub fn new(config: NetworkConfig, directory: Arc<DomainDirectory>) -> Self {
        Self {
            config,
            listener: None,
            directory,
            negotiator: Arc::new(AcceptHeaderNegotiator),
            shutdown: Arc::new(ShutdownController::new()),
        }
    }

    #[must_use]
    pub fn with_negotiator(mut self, negotiator: Arc<dyn ContentNegotiator>) -> Self {
        self.negotiator = negotiator;
        self
    }

    /// Returns a shared reference to the shutdown controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// The router this module serves, for in-process use without a listener.
    pub fn build_router(&self) -> Router {
        build_router(self.state())
    }

    fn state(&self) -> AppState {
        AppState {
            directory: Arc::clone(&self.directory),
            negotiator: Arc::clone(&self.negotiator),
            shutdown: Arc::clone(&self.shutdown),
            config: Arc::new(self.config.clone()),
            start_time: Instant::now(),
        }
    }

    /// Binds the TCP listener to the configured host and port.
    ///
    /// Returns the actual bound port, which may differ from the configured
    /// port when port 0 is used (OS-assigned ephemeral port).
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound (e.g., port in use).
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        let port = listener.local_addr()?.port();

        info!(host = %self.config.host, port, "TCP listener bound");

        self.listener = Some(listener);
        Ok(port)
    }

    /// Serves connections until the shutdown signal fires.
    ///
    /// After the shutdown signal:
    /// 1. Health state transitions to Draining and new operations get 503
    /// 2. Waits up to 30 seconds for in-flight operations to complete
    /// 3. Stops the restore pool, cancelling restores still queued
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first, if TLS material
    /// cannot be loaded, or on a fatal I/O error.
    pub async fn serve(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let router = self.build_router();
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let shutdown_ctrl = self.shutdown;

        shutdown_ctrl.set_ready();

        let served = if let Some(ref tls_config) = self.config.tls {
            serve_tls(listener, router, tls_config, Arc::clone(&shutdown_ctrl), shutdown).await
        } else {
            serve_plain(listener, router, Arc::clone(&shutdown_ctrl), shutdown).await
        };

        drain(&shutdown_ctrl).await;
        self.directory.shutdown().await;
        info!("domain directory stopped");
        served
    }
}

/// Serves plain HTTP using axum's built-in server.
async fn serve_plain(
    listener: TcpListener,
    router: Router,
    shutdown_ctrl: Arc<ShutdownController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("serving plain HTTP");

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown.await;
            shutdown_ctrl.trigger_shutdown();
        })
        .await?;
    Ok(())
}

/// Serves TLS connections using `axum-server` with rustls.
///
/// Reuses the pre-bound TCP listener by converting it to a `std::net::TcpListener`.
async fn serve_tls(
    listener: TcpListener,
    router: Router,
    tls_config: &TlsConfig,
    shutdown_ctrl: Arc<ShutdownController>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    use axum_server::tls_rustls::RustlsConfig;

    let rustls_config = RustlsConfig::from_pem_file(&tls_config.cert_path, &tls_config.key_path)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to load TLS certificates: {e}"))?;

    let addr = listener.local_addr()?;
    let std_listener = listener.into_std()?;
    let handle = axum_server::Handle::new();
    let shutdown_handle = handle.clone();

    tokio::spawn(async move {
        shutdown.await;
        shutdown_ctrl.trigger_shutdown();
        shutdown_handle.graceful_shutdown(Some(DRAIN_TIMEOUT));
    });

    info!(%addr, "serving TLS");

    axum_server::from_tcp_rustls(std_listener, rustls_config)
        .handle(handle)
        .serve(router.into_make_service())
        .await?;
    Ok(())
}

/// Waits for in-flight operations, then reports the outcome.
async fn drain(shutdown_ctrl: &ShutdownController) {
    shutdown_ctrl.trigger_shutdown();

    let in_flight = shutdown_ctrl.in_flight_count();
    if in_flight > 0 {
        info!(in_flight, "draining in-flight operations");
    }
    if shutdown_ctrl.wait_for_drain(DRAIN_TIMEOUT).await {
        info!("all operations drained");
    } else {
        warn!("drain timeout expired with operations still in flight");
    }
}
