use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::FromRef;
use axum::routing::{get, post};
use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use echomind_engine::{ChatOrchestrator, RateLimiter};

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;
use crate::handlers;

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<ChatOrchestrator>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub environment: Arc<str>,
    /// When the server started.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<ChatOrchestrator>,
        verifier: Arc<dyn TokenVerifier>,
        environment: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            orchestrator,
            verifier,
            environment: environment.into(),
            start_time: Instant::now(),
        }
    }
}

impl FromRef<AppState> for Arc<dyn TokenVerifier> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.verifier)
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/chat", post(handlers::chat))
        .route("/models", get(handlers::models))
        .route("/usage", get(handlers::usage))
        .route("/users", post(handlers::provision))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

/// Bind, serve and start background maintenance. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    orchestrator: Arc<ChatOrchestrator>,
    verifier: Arc<dyn TokenVerifier>,
) -> Result<ServerHandle, std::io::Error> {
    let prune = start_prune_task(orchestrator.rate_limiter().clone(), config.prune_interval);

    let state = AppState::new(orchestrator, verifier, config.environment.as_str());
    let router = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(
        addr = %local_addr,
        environment = %config.environment,
        "echomind gateway started"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
        if let Err(e) = result {
            tracing::error!(error = %e, "server exited with error");
        }
    });

    Ok(ServerHandle {
        addr: local_addr,
        shutdown_tx: Some(shutdown_tx),
        server,
        prune,
    })
}

/// Periodically forget principals whose rate window has fully elapsed.
fn start_prune_task(limiter: RateLimiter, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            let _ = ticker.tick().await;
            let pruned = limiter.prune_idle();
            if pruned > 0 {
                tracing::debug!(pruned, "pruned idle rate windows");
            }
        }
    })
}

/// Handle returned by `start()`: keeps background tasks alive.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
    prune: JoinHandle<()>,
}

impl ServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Stop accepting connections, drain in-flight requests and stop maintenance.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.server).await {
            tracing::warn!(error = %e, "server task ended abnormally");
        }
        self.prune.abort();
        tracing::info!("echomind gateway stopped");
    }
}
